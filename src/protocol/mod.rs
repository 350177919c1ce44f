//! Wire protocol: `|`-delimited UTF-8 command frames.
//!
//! Frame boundaries are handled by [`codec::FrameCodec`]; this module only
//! deals with the payload of one complete frame.

pub mod codec;

use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

/// Field delimiter inside a frame payload.
pub const FIELD_DELIMITER: char = '|';

pub const REPLY_SUCCESS: &str = "SUCCESS";
pub const REPLY_ALREADY: &str = "ALREADY";
pub const REPLY_INVALID: &str = "INVALID";
pub const REPLY_UNKNOWN: &str = "Unknown command.";
pub const REPLY_SHUTDOWN: &str = "Server is shutting down.";

pub const HELP_TEXT: &str = "Available commands:\n\
/LOG - Save the server log of this session\n\
/CLOSE - Shutdown server\n\
/TIME - Get server time\n\
/STATISTIC - Get server statistic\n\
/HELP - Show available commands";

/// One parsed client -> server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login {
        username: String,
        password: Zeroizing<String>,
    },
    Logout,
    Message {
        receiver: String,
        text: String,
    },
    File {
        receiver: String,
        file_name: String,
        file_size: u64,
    },
    Log,
    Close,
    Time,
    Statistic,
    Help,
}

impl Command {
    /// Short name for logs; never includes secrets.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Login { .. } => "LOGIN",
            Command::Logout => "LOGOUT",
            Command::Message { .. } => "MESSAGE",
            Command::File { .. } => "FILE",
            Command::Log => "/LOG",
            Command::Close => "/CLOSE",
            Command::Time => "/TIME",
            Command::Statistic => "/STATISTIC",
            Command::Help => "/HELP",
        }
    }
}

/// Non-fatal protocol problems. Each maps to a reply frame; the connection
/// stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Unknown command.")]
    UnknownCommand,
    #[error("Not logged in.")]
    NotAuthenticated,
    #[error("Already logged in as {0}.")]
    AlreadyAuthenticated(String),
}

impl ProtocolError {
    pub fn reply(&self) -> String {
        self.to_string()
    }
}

/// Parse one complete frame payload.
///
/// The command keyword is case-insensitive. Administrative commands ignore
/// any extra fields; the others require an exact field count.
pub fn parse_command(frame: &str) -> Result<Command, ProtocolError> {
    let parts: Vec<&str> = frame.split(FIELD_DELIMITER).collect();
    let keyword = parts[0].trim().to_ascii_uppercase();

    match (keyword.as_str(), parts.len()) {
        ("LOGIN", 3) => Ok(Command::Login {
            username: parts[1].to_string(),
            password: Zeroizing::new(parts[2].to_string()),
        }),
        ("LOGOUT", 1) => Ok(Command::Logout),
        ("MESSAGE", 3) => Ok(Command::Message {
            receiver: parts[1].to_string(),
            text: parts[2].to_string(),
        }),
        ("FILE", 4) => {
            let file_size = parts[3]
                .trim()
                .parse::<u64>()
                .map_err(|_| ProtocolError::UnknownCommand)?;
            Ok(Command::File {
                receiver: parts[1].to_string(),
                file_name: parts[2].to_string(),
                file_size,
            })
        }
        ("/LOG", _) => Ok(Command::Log),
        ("/CLOSE", _) => Ok(Command::Close),
        ("/TIME", _) => Ok(Command::Time),
        ("/STATISTIC", _) => Ok(Command::Statistic),
        ("/HELP", _) => Ok(Command::Help),
        _ => Err(ProtocolError::UnknownCommand),
    }
}

/// Structured server -> client frames. Plain text replies are sent as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Inbound file header; exactly `file_size` raw bytes follow.
    FileHeader {
        sender: String,
        file_name: String,
        file_size: u64,
    },
    FileSent {
        receiver: String,
        file_name: String,
    },
    FileError {
        reason: String,
    },
    /// The sender vanished mid-transfer. The preceding body was zero-padded
    /// up to the declared size; only `relayed` bytes are genuine.
    FileAbort {
        sender: String,
        file_name: String,
        relayed: u64,
    },
}

impl fmt::Display for ServerFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerFrame::FileHeader {
                sender,
                file_name,
                file_size,
            } => write!(f, "FILE|{sender}|{file_name}|{file_size}"),
            ServerFrame::FileSent {
                receiver,
                file_name,
            } => write!(f, "FILESENT|{receiver}|{file_name}"),
            ServerFrame::FileError { reason } => write!(f, "FILEERROR|{reason}"),
            ServerFrame::FileAbort {
                sender,
                file_name,
                relayed,
            } => write!(f, "FILEABORT|{sender}|{file_name}|{relayed}"),
        }
    }
}

/// Routed chat line as seen by the receiver.
pub fn chat_line(timestamp: &str, sender: &str, text: &str) -> String {
    format!("[{timestamp}] [{sender}]: {text}")
}

pub fn receiver_offline(receiver: &str) -> String {
    format!("Receiver [{receiver}] is not online.")
}

pub fn receiver_busy(receiver: &str) -> String {
    format!("Receiver [{receiver}] is busy, try again later.")
}
