//! Parsing helpers for command line and environment settings.

use std::time::Duration;

/// Split a comma-separated domain list, trimming entries and dropping empty ones.
pub fn parse_ignore_domains(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|domain| !domain.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a refresh interval such as `30m` or `1h`. A bare `0` means disabled.
pub fn parse_interval(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if value == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(value).map_err(|e| format!("invalid duration '{}': {}", value, e))
}

/// Parse a request timeout. Unlike intervals, zero is rejected.
pub fn parse_timeout(value: &str) -> Result<Duration, String> {
    let timeout = parse_interval(value)?;
    if timeout.is_zero() {
        return Err(format!("timeout must be greater than zero, got '{}'", value.trim()));
    }
    Ok(timeout)
}
