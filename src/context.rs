use crate::auth::{ConfigCredentialStore, CredentialStore};
use crate::config::types::AppConfig;
use crate::logging::LogBuffer;
use crate::metrics::MetricsRegistry;
use crate::registry::SessionRegistry;
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shared application context, replacing scattered Arc parameters
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub credentials: Arc<dyn CredentialStore>,
    pub registry: Arc<SessionRegistry>,
    pub metrics: Arc<MetricsRegistry>,
    pub log_buffer: Arc<LogBuffer>,
    /// Cancelled once, by `/CLOSE` or a signal. Every session token is a child.
    pub shutdown: CancellationToken,
    pub start_time: Instant,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Result<Self> {
        let log_buffer = Arc::new(LogBuffer::new(config.logging.buffer_max_lines));
        Self::with_log_buffer(config, log_buffer)
    }

    /// Build the context around an existing log buffer (the one the tracing
    /// layer already writes into).
    pub fn with_log_buffer(config: AppConfig, log_buffer: Arc<LogBuffer>) -> Result<Self> {
        let credentials = ConfigCredentialStore::from_config(&config.users)?;
        Ok(Self {
            config: Arc::new(config),
            credentials: Arc::new(credentials),
            registry: Arc::new(SessionRegistry::new()),
            metrics: Arc::new(MetricsRegistry::new()),
            log_buffer,
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
        })
    }
}
