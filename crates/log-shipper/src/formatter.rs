// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record encoders shared by the file sink and the broker hook.

use std::fmt::Write as _;
use std::str::FromStr;

use chrono::SecondsFormat;
use serde_json::{Map, Value};

use crate::error::{ConfigError, FormatError};
use crate::record::{LogRecord, LEVEL_FIELD, MESSAGE_FIELD, TIME_FIELD};

pub trait Formatter: Send + Sync {
    fn format(&self, record: &LogRecord) -> Result<Vec<u8>, FormatError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatterKind {
    #[default]
    Text,
    Json,
}

impl FormatterKind {
    pub fn build(self) -> Box<dyn Formatter> {
        match self {
            FormatterKind::Text => Box::new(TextFormatter),
            FormatterKind::Json => Box::new(JsonFormatter),
        }
    }
}

impl FromStr for FormatterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(FormatterKind::Text),
            "json" => Ok(FormatterKind::Json),
            _ => Err(ConfigError::InvalidValue {
                key: "formatter-type",
                value: s.to_string(),
                reason: "must be one of: text, json".to_string(),
            }),
        }
    }
}

/// `key=value` pairs on a single line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format(&self, record: &LogRecord) -> Result<Vec<u8>, FormatError> {
        let mut line = String::with_capacity(128);
        if let Some(time) = record.time {
            write!(
                line,
                "time={} ",
                quote(&time.to_rfc3339_opts(SecondsFormat::Secs, true))
            )?;
        }
        write!(line, "level={} msg={}", record.level, quote(&record.message))?;

        // serde_json::Map iterates in key order
        for (key, value) in &record.fields {
            let rendered = match value {
                Value::String(s) => quote(s),
                other => quote(&other.to_string()),
            };
            write!(line, " {key}={rendered}")?;
        }
        line.push('\n');
        Ok(line.into_bytes())
    }
}

fn quote(value: &str) -> String {
    let needs_quoting = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '=' || c.is_control());
    if needs_quoting {
        format!("{value:?}")
    } else {
        value.to_string()
    }
}

/// One JSON object per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, record: &LogRecord) -> Result<Vec<u8>, FormatError> {
        let mut object: Map<String, Value> = record.fields.clone();
        if let Some(time) = record.time {
            object.insert(
                TIME_FIELD.to_string(),
                Value::String(time.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            );
        }
        object.insert(LEVEL_FIELD.to_string(), serde_json::to_value(record.level)?);
        object.insert(
            MESSAGE_FIELD.to_string(),
            Value::String(record.message.clone()),
        );

        let mut bytes = serde_json::to_vec(&object)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Level;
    use chrono::DateTime;
    use serde_json::json;

    fn record() -> LogRecord {
        LogRecord::new(Level::Warn, "slow request")
            .with_time(Some(
                DateTime::parse_from_rfc3339("2024-01-02T15:04:05Z").unwrap(),
            ))
            .with_field("path", "/api/v1")
            .with_field("elapsed_ms", 1532)
            .with_field("user", "jane doe")
    }

    #[test]
    fn test_text_format() {
        let out = TextFormatter.format(&record()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "time=2024-01-02T15:04:05Z level=warn msg=\"slow request\" elapsed_ms=1532 path=/api/v1 user=\"jane doe\"\n"
        );
    }

    #[test]
    fn test_text_format_without_time() {
        let record = LogRecord::new(Level::Info, "").with_time(None);
        let out = TextFormatter.format(&record).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "level=info msg=\"\"\n");
    }

    #[test]
    fn test_json_format() {
        let out = JsonFormatter.format(&record()).unwrap();
        assert_eq!(out.last(), Some(&b'\n'));
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(
            value,
            json!({
                "time": "2024-01-02T15:04:05Z",
                "level": "warn",
                "msg": "slow request",
                "path": "/api/v1",
                "elapsed_ms": 1532,
                "user": "jane doe",
            })
        );
    }

    #[test]
    fn test_json_reserved_keys_win() {
        let record = LogRecord::new(Level::Error, "real").with_field("msg", "shadow");
        let value: Value = serde_json::from_slice(&JsonFormatter.format(&record).unwrap()).unwrap();
        assert_eq!(value["msg"], json!("real"));
    }

    #[test]
    fn test_formatter_kind() {
        assert_eq!("JSON".parse::<FormatterKind>().unwrap(), FormatterKind::Json);
        assert_eq!("text".parse::<FormatterKind>().unwrap(), FormatterKind::Text);
        assert!("xml".parse::<FormatterKind>().is_err());
    }
}
