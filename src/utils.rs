use chrono::Local;

/// Timestamp layout used in chat lines, `/TIME` and exported logs.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Generate a compact correlation ID (8 hex characters) from the first 4 bytes of a UUID v4.
///
/// This provides a short, human-readable identifier suitable for log messages
/// while still offering ~4 billion unique values to avoid collisions in practice.
pub fn generate_correlation_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    format!(
        "{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}

/// Current local time as `YYYY-MM-DD HH:MM:SS`.
pub fn local_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Format a duration in seconds as a human-readable string.
///
/// - `< 60s`: shows seconds (e.g., "30s")
/// - `< 1h`: shows minutes + seconds (e.g., "1m 30s"), omits trailing zero
/// - `>= 1h`: shows hours + minutes (e.g., "1h 1m"), omits trailing zero
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        let (m, s) = (secs / 60, secs % 60);
        if s > 0 {
            format!("{}m {}s", m, s)
        } else {
            format!("{}m", m)
        }
    } else {
        let (h, m) = (secs / 3600, (secs % 3600) / 60);
        if m > 0 {
            format!("{}h {}m", h, m)
        } else {
            format!("{}h", h)
        }
    }
}
