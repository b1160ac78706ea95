//! Environment-variable helpers shared by the per-crate config structs.
//!
//! Missing optional variables fall back to their defaults; present but
//! unparsable values are rejected instead of silently defaulting.

use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// Read `key` and parse it, returning `default` when unset or blank.
pub fn env_or<T: FromStr>(key: &str, default: T) -> CoreResult<T> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(key, raw.trim()),
        _ => Ok(default),
    }
}

/// Read a required variable.
pub fn env_required(key: &str) -> CoreResult<String> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => Ok(raw.trim().to_string()),
        _ => Err(CoreError::Validation(format!(
            "{key} environment variable is required"
        ))),
    }
}

/// Read a boolean flag (`1`/`true`/`yes` or `0`/`false`/`no`).
pub fn env_flag(key: &str, default: bool) -> CoreResult<bool> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => parse_flag(key, raw.trim()),
        _ => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> CoreResult<T> {
    raw.parse()
        .map_err(|_| CoreError::Validation(format!("{key} has an invalid value '{raw}'")))
}

fn parse_flag(key: &str, raw: &str) -> CoreResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(CoreError::Validation(format!(
            "{key} must be a boolean, got '{raw}'"
        ))),
    }
}
