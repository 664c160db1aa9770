//! Human-readable durations such as `500ms`, `30s`, `1m` or `2h 30m`.

use std::time::Duration;

use crate::{ConfigError, ConfigResult};

/// Parse a duration string. A bare number is taken as seconds.
pub fn parse_duration(field: &str, text: &str) -> ConfigResult<Duration> {
    let text = text.trim();
    let duration = match text.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(text).map_err(|e| {
            ConfigError::invalid(field, format!("invalid duration {:?}: {}", text, e))
        })?,
    };

    if duration.is_zero() {
        return Err(ConfigError::invalid(field, "duration must be positive"));
    }
    Ok(duration)
}
