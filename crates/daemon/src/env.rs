// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::time::Duration;

use crate::config::ConfigError;

/// A required string variable.
pub fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing { name }),
    }
}

/// An optional string variable with a default.
pub fn string_or(name: &str, default: &str) -> String {
    std::env::var(name).ok().filter(|s| !s.is_empty()).unwrap_or_else(|| default.to_string())
}

/// An optional parsed variable with a default. Set-but-unparsable values
/// are configuration errors, not silent fallbacks.
pub fn parsed_or<T: std::str::FromStr>(
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) if raw.is_empty() => Ok(default),
        Ok(raw) => raw.parse::<T>().map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

/// An optional parsed variable with no default.
pub fn parsed_opt<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) if raw.is_empty() => Ok(None),
        Ok(raw) => {
            raw.parse::<T>().map(Some).map_err(|_| ConfigError::Invalid { name, value: raw })
        }
    }
}

/// A millisecond duration variable with a default.
pub fn millis_or(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(parsed_or(name, default.as_millis() as u64)?))
}

/// Log filter, e.g. `info` or `vigil_engine=debug,info`.
pub fn log_filter() -> String {
    string_or("VIGIL_LOG", "info")
}

/// Optional directory for a rolling daemon log file.
pub fn log_dir() -> Option<String> {
    std::env::var("VIGIL_LOG_DIR").ok().filter(|s| !s.is_empty())
}
