use crate::config::types::AppConfig;

/// Redact user secrets in a config for safe display.
pub fn redact_config(cfg: &AppConfig) -> AppConfig {
    let mut redacted = cfg.clone();

    for user in &mut redacted.users {
        if user.password.is_some() {
            user.password = Some("***".to_string());
        }
        if user.password_hash.is_some() {
            user.password_hash = Some("***".to_string());
        }
    }

    redacted
}
