//! Relay server for point-to-point text chat and file transfer.
//!
//! Clients connect over TCP, authenticate with a username and password, and
//! exchange length-prefixed `|`-delimited text frames. File payloads are
//! streamed through the server between two live connections without being
//! stored.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod context;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod router;
pub mod server;
pub mod session;
pub mod utils;
