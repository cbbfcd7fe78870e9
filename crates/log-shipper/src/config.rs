// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::formatter::FormatterKind;
use crate::record::Level;

pub const ROTATION_INTERVAL_KEY: &str = "rotation-interval-secs";
pub const RETENTION_DAYS_KEY: &str = "retention-days";
pub const CONSOLE_KEY: &str = "console";
pub const FILE_PATH_KEY: &str = "file-path";
pub const FORMATTER_TYPE_KEY: &str = "formatter-type";
pub const LOG_LEVEL_KEY: &str = "log-level";
pub const KAFKA_ENABLED_KEY: &str = "hook-kafka-enabled";
pub const KAFKA_ID_KEY: &str = "hook-kafka-id";
pub const KAFKA_DEFAULT_TOPICS_KEY: &str = "hook-kafka-default-topics";
pub const KAFKA_BROKERS_KEY: &str = "hook-kafka-brokers";
pub const KAFKA_LEVELS_KEY: &str = "hook-kafka-levels";
pub const KAFKA_FLUSH_MS_KEY: &str = "hook-kafka-flush-ms";
pub const ARCHIVE_BUCKET_KEY: &str = "archive-bucket";
pub const ARCHIVE_REGION_KEY: &str = "archive-region";
pub const ARCHIVE_ENDPOINT_KEY: &str = "archive-endpoint";
pub const ARCHIVE_LOCAL_PATH_KEY: &str = "archive-local-path";

const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(3600);
const DEFAULT_RETENTION_DAYS: u32 = 2;
const DEFAULT_FILE_PATH: &str = "app.log";
const DEFAULT_HOOK_ID: &str = "kafka-hook";
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_REGION: &str = "us-east-1";
const ENV_PREFIX: &str = "LOG_SHIPPER_";

/// Key/value lookup over whatever holds the configuration.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory source, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapSource(HashMap<String, String>);

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }
}

impl ConfigSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// Reads `file-path` from `LOG_SHIPPER_FILE_PATH`, and so on.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl EnvSource {
    pub fn var_name(key: &str) -> String {
        format!("{ENV_PREFIX}{}", key.replace('-', "_").to_uppercase())
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(Self::var_name(key)).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Console,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveTarget {
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
    },
    Local {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub id: String,
    pub brokers: Vec<String>,
    pub default_topics: Vec<String>,
    /// Record levels forwarded to the broker.
    pub levels: Vec<Level>,
    /// How often the producer flushes outbound batches.
    pub flush_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            id: DEFAULT_HOOK_ID.to_string(),
            brokers: Vec::new(),
            default_topics: Vec::new(),
            levels: vec![Level::Error, Level::Info],
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub rotation_interval: Duration,
    /// Age in days after which rotated files are archived. 0 disables it.
    pub retention_days: u32,
    pub output: Output,
    pub formatter: FormatterKind,
    /// Level of the pipeline's own diagnostics.
    pub log_level: String,
    /// `None` keeps the broker hook disabled.
    pub broker: Option<BrokerConfig>,
    /// `None` disables archival regardless of retention.
    pub archive: Option<ArchiveTarget>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rotation_interval: DEFAULT_ROTATION_INTERVAL,
            retention_days: DEFAULT_RETENTION_DAYS,
            output: Output::File(PathBuf::from(DEFAULT_FILE_PATH)),
            formatter: FormatterKind::Text,
            log_level: "info".to_string(),
            broker: None,
            archive: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&EnvSource)
    }

    pub fn from_source(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let rotation_interval = parse::<u64>(source, ROTATION_INTERVAL_KEY)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.rotation_interval);
        let retention_days =
            parse::<u32>(source, RETENTION_DAYS_KEY)?.unwrap_or(defaults.retention_days);

        let output = if parse_bool(source, CONSOLE_KEY)?.unwrap_or(false) {
            Output::Console
        } else {
            Output::File(
                non_empty(source, FILE_PATH_KEY)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_FILE_PATH)),
            )
        };

        let formatter = match non_empty(source, FORMATTER_TYPE_KEY) {
            Some(value) => value.parse()?,
            None => defaults.formatter,
        };

        let log_level = non_empty(source, LOG_LEVEL_KEY)
            .map(|level| level.to_lowercase())
            .unwrap_or(defaults.log_level);

        let broker = if parse_bool(source, KAFKA_ENABLED_KEY)?.unwrap_or(false) {
            let fallback = BrokerConfig::default();
            let levels = match non_empty(source, KAFKA_LEVELS_KEY) {
                Some(value) => split_list(&value)
                    .iter()
                    .map(|level| {
                        level.parse::<Level>().map_err(|e| ConfigError::InvalidValue {
                            key: KAFKA_LEVELS_KEY,
                            value: value.clone(),
                            reason: e.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                None => fallback.levels,
            };
            Some(BrokerConfig {
                id: non_empty(source, KAFKA_ID_KEY).unwrap_or(fallback.id),
                brokers: non_empty(source, KAFKA_BROKERS_KEY)
                    .map(|v| split_list(&v))
                    .unwrap_or_default(),
                default_topics: non_empty(source, KAFKA_DEFAULT_TOPICS_KEY)
                    .map(|v| split_list(&v))
                    .unwrap_or_default(),
                levels,
                flush_interval: parse::<u64>(source, KAFKA_FLUSH_MS_KEY)?
                    .map(Duration::from_millis)
                    .unwrap_or(fallback.flush_interval),
            })
        } else {
            None
        };

        let archive = if let Some(path) = non_empty(source, ARCHIVE_LOCAL_PATH_KEY) {
            Some(ArchiveTarget::Local {
                path: PathBuf::from(path),
            })
        } else {
            non_empty(source, ARCHIVE_BUCKET_KEY).map(|bucket| ArchiveTarget::S3 {
                bucket,
                region: non_empty(source, ARCHIVE_REGION_KEY)
                    .unwrap_or_else(|| DEFAULT_REGION.to_string()),
                endpoint: non_empty(source, ARCHIVE_ENDPOINT_KEY),
            })
        };

        let config = Self {
            rotation_interval,
            retention_days,
            output,
            formatter,
            log_level,
            broker,
            archive,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rotation_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: ROTATION_INTERVAL_KEY,
                value: "0".to_string(),
                reason: "rotation interval must be greater than 0".to_string(),
            });
        }

        if let Output::File(path) = &self.output {
            if path.file_name().is_none() {
                return Err(ConfigError::InvalidValue {
                    key: FILE_PATH_KEY,
                    value: path.display().to_string(),
                    reason: "must name a file".to_string(),
                });
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: LOG_LEVEL_KEY,
                value: self.log_level.clone(),
                reason: "must be one of: trace, debug, info, warn, error".to_string(),
            });
        }

        if let Some(broker) = &self.broker {
            if broker.brokers.is_empty() {
                return Err(ConfigError::Missing(KAFKA_BROKERS_KEY));
            }
            if broker.id.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: KAFKA_ID_KEY,
                    value: broker.id.clone(),
                    reason: "hook id cannot be empty".to_string(),
                });
            }
        }

        if let Some(ArchiveTarget::S3 { bucket, .. }) = &self.archive {
            if bucket.trim().is_empty() {
                return Err(ConfigError::Missing(ARCHIVE_BUCKET_KEY));
            }
        }

        Ok(())
    }
}

fn non_empty(source: &dyn ConfigSource, key: &str) -> Option<String> {
    source
        .get(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse<T: FromStr>(source: &dyn ConfigSource, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    non_empty(source, key)
        .map(|value| {
            value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key,
                value: value.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_bool(source: &dyn ConfigSource, key: &'static str) -> Result<Option<bool>, ConfigError> {
    non_empty(source, key)
        .map(|value| match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key,
                value,
                reason: "expected a boolean".to_string(),
            }),
        })
        .transpose()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
