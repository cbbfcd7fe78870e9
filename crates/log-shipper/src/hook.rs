// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fan-out of log records to the message broker.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::error::HookError;
use crate::formatter::Formatter;
use crate::producer::{Producer, ProducerMessage};
use crate::record::{Level, LogRecord};

const TIME_ENCODING_VERSION: u8 = 1;
// Seconds between 0001-01-01T00:00:00Z and the Unix epoch.
const UNIX_TO_ABSOLUTE: i64 = 62_135_596_800;

/// Encodes `time` in the 15-byte fixed-width binary layout: version,
/// seconds since year 1, nanoseconds, zone offset in minutes (`-1` = UTC).
pub fn encode_time(time: &DateTime<FixedOffset>) -> Result<Vec<u8>, HookError> {
    let offset_secs = time.offset().local_minus_utc();
    let offset_min: i16 = if offset_secs == 0 {
        -1
    } else {
        if offset_secs % 60 != 0 {
            return Err(HookError::Marshal(format!(
                "zone offset has fractional minute: {offset_secs}s"
            )));
        }
        let minutes = offset_secs / 60;
        if minutes == -1 {
            return Err(HookError::Marshal("unexpected zone offset".to_string()));
        }
        i16::try_from(minutes)
            .map_err(|_| HookError::Marshal(format!("zone offset out of range: {minutes}m")))?
    };

    let secs = time
        .timestamp()
        .checked_add(UNIX_TO_ABSOLUTE)
        .ok_or_else(|| HookError::Marshal("timestamp out of range".to_string()))?;
    let nanos = time.timestamp_subsec_nanos() as i32;

    let mut buf = Vec::with_capacity(15);
    buf.push(TIME_ENCODING_VERSION);
    buf.extend_from_slice(&secs.to_be_bytes());
    buf.extend_from_slice(&nanos.to_be_bytes());
    buf.extend_from_slice(&offset_min.to_be_bytes());
    Ok(buf)
}

pub struct BrokerHook {
    id: String,
    levels: Vec<Level>,
    formatter: Arc<dyn Formatter>,
    producer: Arc<dyn Producer>,
    default_topics: Vec<String>,
}

impl BrokerHook {
    pub fn new(
        id: impl Into<String>,
        levels: Vec<Level>,
        formatter: Arc<dyn Formatter>,
        producer: Arc<dyn Producer>,
        default_topics: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            levels,
            formatter,
            producer,
            default_topics,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn accepts(&self, level: Level) -> bool {
        self.levels.contains(&level)
    }

    pub fn producer(&self) -> &Arc<dyn Producer> {
        &self.producer
    }

    /// Enqueues one message per resolved topic. Everything that can fail is
    /// checked before the first enqueue, so a record is either sent to all
    /// of its topics or to none.
    pub fn fire(&self, record: &LogRecord) -> Result<(), HookError> {
        let key = match &record.time {
            Some(time) => encode_time(time)?,
            None => Vec::new(),
        };

        let topics = match &record.topics {
            Some(topics) if topics.iter().any(|t| t.is_empty()) => {
                return Err(HookError::InvalidTopics)
            }
            Some(topics) => topics.as_slice(),
            None => self.default_topics.as_slice(),
        };

        let payload = self.formatter.format(record)?;

        for topic in topics {
            self.producer.enqueue(ProducerMessage {
                key: key.clone(),
                topic: topic.clone(),
                payload: payload.clone(),
            });
        }
        Ok(())
    }
}
