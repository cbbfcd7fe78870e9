// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Diagnostics for the pipeline itself, not the records it ships.

use tracing_subscriber::EnvFilter;

use crate::config::LOG_LEVEL_KEY;
use crate::error::ConfigError;

/// Filter directives for `level`, keeping librdkafka's chatter at warn.
pub fn env_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_new(format!("rdkafka=warn,{level}")).map_err(|e| ConfigError::InvalidValue {
        key: LOG_LEVEL_KEY,
        value: level.to_string(),
        reason: e.to_string(),
    })
}

/// Installs the global subscriber and bridges `log` records (librdkafka's
/// diagnostics) into it. Fails if either is already set.
pub fn init(level: &str) -> Result<(), ConfigError> {
    tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(level)?)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| ConfigError::InvalidValue {
            key: LOG_LEVEL_KEY,
            value: level.to_string(),
            reason: e.to_string(),
        })?;
    tracing::debug!("Logging subsystem enabled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(env_filter(level).is_ok(), "{level} should be accepted");
        }
    }

    #[test]
    fn test_env_filter_rejects_garbage() {
        assert!(env_filter("app=loudest").is_err());
    }
}
