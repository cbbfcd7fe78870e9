// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::PathBuf;

/// Errors raised by the rotating sink while rotating or closing its file.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Error closing file {path}: {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error renaming file {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error creating new file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors raised by an archival pass. None of these are fatal: the rotated
/// file stays on disk and is picked up again by the next pass.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Failed to scan {dir} for rotated files: {source}")]
    Scan {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to compress {path}: {reason}")]
    Compress { path: PathBuf, reason: String },

    #[error("Failed to upload {key}: {reason}")]
    Upload { key: String, reason: String },

    #[error("Failed to delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Archive task failed: {0}")]
    Task(String),
}

/// Record serialisation failures.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Failed to encode record as JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to encode record as text: {0}")]
    Text(#[from] std::fmt::Error),
}

/// Validation failures for the reserved fields of a log record.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Field time must be an RFC3339 timestamp, got {0}")]
    InvalidTime(String),

    #[error("Field topics must be an array of strings")]
    InvalidTopics,

    #[error("Unknown log level '{0}'")]
    InvalidLevel(String),
}

/// Per-record failures of the broker hook. The record is dropped; nothing
/// has been enqueued when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Error marshaling binary partition key: {0}")]
    Marshal(String),

    #[error("Field topics must be an array of strings")]
    InvalidTopics,

    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Producer level failures. Delivery failures never show up here, they go
/// through the producer's error channel instead.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to create producer: {0}")]
    Create(String),

    #[error("Failed to flush producer: {0}")]
    Flush(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration key '{0}'")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to create object store: {0}")]
    ObjectStore(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Failed to write record: {0}")]
    Write(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SinkError::Create {
            path: PathBuf::from("/var/log/app.log"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            error.to_string(),
            "Error creating new file /var/log/app.log: denied"
        );

        let error = ConfigError::Missing("hook-kafka-brokers");
        assert_eq!(
            error.to_string(),
            "Missing required configuration key 'hook-kafka-brokers'"
        );
    }

    #[test]
    fn test_pipeline_error_wraps_sources() {
        let error: PipelineError = ConfigError::Missing("file-path").into();
        assert!(matches!(error, PipelineError::Config(_)));

        let error: PipelineError = io::Error::other("disk full").into();
        assert_eq!(error.to_string(), "Failed to write record: disk full");
    }
}
