pub mod env;
pub mod redact;
pub mod types;

use anyhow::{Context, Result};
use std::path::Path;
use types::AppConfig;

/// Maximum config file size (1 MB)
const MAX_CONFIG_SIZE: u64 = 1_048_576;

/// Smallest allowed `server.max_frame_length`.
const MIN_FRAME_LENGTH: usize = 1024;

/// Load and validate configuration from a TOML file, then apply
/// `CHATRELAY_*` environment overrides.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("reading config metadata: {}", path.display()))?;
    if metadata.len() > MAX_CONFIG_SIZE {
        anyhow::bail!(
            "config file too large: {} bytes (max {} bytes)",
            metadata.len(),
            MAX_CONFIG_SIZE
        );
    }

    check_config_file_permissions(path);

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    let mut config: AppConfig = toml::from_str(&content).context("parsing TOML configuration")?;
    env::apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

/// On Unix, warn if the config file is readable by group or others,
/// since it may contain plaintext passwords.
#[cfg(unix)]
fn check_config_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) => {
            let mode = meta.permissions().mode();
            if mode & 0o077 != 0 {
                tracing::warn!(
                    path = %path.display(),
                    mode = format!("{:04o}", mode & 0o7777),
                    "Config file is readable by group/others. \
                     Consider restricting permissions to 0600."
                );
            }
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not check config file permissions"
            );
        }
    }
}

#[cfg(not(unix))]
fn check_config_file_permissions(_path: &Path) {}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(content).context("parsing TOML configuration")?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate an already-constructed AppConfig (e.g. built by quick-start).
pub fn parse_config_validate(config: &AppConfig) -> Result<()> {
    validate_config(config)
}

fn validate_config(config: &AppConfig) -> Result<()> {
    validate_server(config)?;
    validate_relay(config)?;
    validate_users(config)?;
    Ok(())
}

fn validate_server(config: &AppConfig) -> Result<()> {
    if config.server.listen.trim().is_empty() {
        anyhow::bail!("server.listen must not be empty");
    }
    if config.server.max_frame_length < MIN_FRAME_LENGTH {
        anyhow::bail!(
            "server.max_frame_length must be >= {} (got {})",
            MIN_FRAME_LENGTH,
            config.server.max_frame_length
        );
    }
    if config.server.outbound_queue == 0 {
        anyhow::bail!("server.outbound_queue must be > 0");
    }
    if config.metrics.enabled && config.metrics.listen.trim().is_empty() {
        anyhow::bail!("metrics.listen must not be empty when metrics are enabled");
    }
    Ok(())
}

fn validate_relay(config: &AppConfig) -> Result<()> {
    if config.relay.chunk_size == 0 {
        anyhow::bail!("relay.chunk_size must be > 0");
    }
    if config.relay.body_queue == 0 {
        anyhow::bail!("relay.body_queue must be > 0");
    }
    if config.relay.body_timeout == 0 {
        anyhow::bail!("relay.body_timeout must be > 0");
    }
    Ok(())
}

fn validate_users(config: &AppConfig) -> Result<()> {
    if config.users.is_empty() {
        anyhow::bail!("at least one user is required");
    }

    let mut seen = std::collections::HashSet::new();
    for user in &config.users {
        if user.username.is_empty() {
            anyhow::bail!("user entry has empty username");
        }
        // '|' is the field delimiter on the wire
        if user.username.contains('|') {
            anyhow::bail!("username '{}' must not contain '|'", user.username);
        }
        match (&user.password, &user.password_hash) {
            (Some(_), Some(_)) => anyhow::bail!(
                "user '{}' must set only one of password or password_hash",
                user.username
            ),
            (None, None) => anyhow::bail!(
                "user '{}' must have a password or password_hash",
                user.username
            ),
            _ => {}
        }
        if !seen.insert(&user.username) {
            anyhow::bail!("duplicate username: {}", user.username);
        }
    }

    if config.users.iter().any(|u| u.password.is_some()) {
        tracing::warn!(
            "Plaintext passwords configured. \
             Consider `chatrelay hash-password` and password_hash instead."
        );
    }

    Ok(())
}
