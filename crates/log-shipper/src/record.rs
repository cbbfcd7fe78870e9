// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Structured log records handed to the pipeline.
//!
//! Two fields are reserved and validated when the record is built rather
//! than when it is shipped: `time`, which feeds the broker partition key,
//! and `topics`, which overrides the hook's default destinations. Every
//! other key travels untouched in [`LogRecord::fields`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::RecordError;

pub const TIME_FIELD: &str = "time";
pub const TOPICS_FIELD: &str = "topics";
pub const LEVEL_FIELD: &str = "level";
pub const MESSAGE_FIELD: &str = "msg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            _ => Err(RecordError::InvalidLevel(s.to_string())),
        }
    }
}

/// A single structured event. Immutable once handed to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub time: Option<DateTime<FixedOffset>>,
    pub level: Level,
    pub message: String,
    /// Explicit destinations. `None` means the hook's default topics.
    pub topics: Option<Vec<String>>,
    pub fields: Map<String, Value>,
}

impl LogRecord {
    /// Creates a record stamped with the current UTC time.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            time: Some(Utc::now().fixed_offset()),
            level,
            message: message.into(),
            topics: None,
            fields: Map::new(),
        }
    }

    #[must_use]
    pub fn with_time(mut self, time: Option<DateTime<FixedOffset>>) -> Self {
        self.time = time;
        self
    }

    #[must_use]
    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = Some(topics.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

impl TryFrom<Map<String, Value>> for LogRecord {
    type Error = RecordError;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        let time = match map.remove(TIME_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(
                DateTime::parse_from_rfc3339(&s).map_err(|_| RecordError::InvalidTime(s))?,
            ),
            Some(other) => return Err(RecordError::InvalidTime(other.to_string())),
        };

        let topics = match map.remove(TOPICS_FIELD) {
            None => None,
            Some(Value::Array(items)) => Some(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(topic) => Ok(topic),
                        _ => Err(RecordError::InvalidTopics),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(_) => return Err(RecordError::InvalidTopics),
        };

        let level = match map.remove(LEVEL_FIELD) {
            None => Level::Info,
            Some(Value::String(s)) => s.parse()?,
            Some(other) => return Err(RecordError::InvalidLevel(other.to_string())),
        };

        let message = match map.remove(MESSAGE_FIELD).or_else(|| map.remove("message")) {
            None => String::new(),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        };

        Ok(Self {
            time,
            level,
            message,
            topics,
            fields: map,
        })
    }
}
