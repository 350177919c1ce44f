//! Environment variable overrides.
//!
//! Applied on top of a parsed config file so container deployments can
//! adjust addresses and logging without editing the file:
//!
//! | Variable | Field |
//! |---|---|
//! | `CHATRELAY_LISTEN` | `server.listen` |
//! | `CHATRELAY_MAX_CONNECTIONS` | `server.max_connections` |
//! | `CHATRELAY_LOG_LEVEL` | `logging.level` |
//! | `CHATRELAY_LOG_FORMAT` | `logging.format` |
//! | `CHATRELAY_EXPORT_DIR` | `logging.export_dir` |
//! | `CHATRELAY_METRICS_LISTEN` | `metrics.listen` (also enables metrics) |

use crate::config::types::*;
use std::path::PathBuf;

/// Apply `CHATRELAY_*` overrides from the process environment.
pub fn apply_env_overrides(config: &mut AppConfig) -> anyhow::Result<()> {
    apply_overrides_from(config, |key| std::env::var(key).ok())
}

/// Apply overrides using an arbitrary lookup (tests pass a map here).
pub fn apply_overrides_from<F>(config: &mut AppConfig, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(listen) = get("CHATRELAY_LISTEN") {
        config.server.listen = listen;
    }
    if let Some(max) = get("CHATRELAY_MAX_CONNECTIONS") {
        config.server.max_connections = max
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid CHATRELAY_MAX_CONNECTIONS: {e}"))?;
    }
    if let Some(level) = get("CHATRELAY_LOG_LEVEL") {
        config.logging.level = level
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid CHATRELAY_LOG_LEVEL: {e}"))?;
    }
    if let Some(format) = get("CHATRELAY_LOG_FORMAT") {
        config.logging.format = format
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid CHATRELAY_LOG_FORMAT: {e}"))?;
    }
    if let Some(dir) = get("CHATRELAY_EXPORT_DIR") {
        config.logging.export_dir = PathBuf::from(dir);
    }
    if let Some(listen) = get("CHATRELAY_METRICS_LISTEN") {
        config.metrics.enabled = true;
        config.metrics.listen = listen;
    }
    Ok(())
}
