// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Log Shipper
//!
//! Durable log output with cold-storage archival and Kafka fan-out.
//!
//! ## Architecture
//!
//! - [`sink`]: file sink rotated on a fixed interval to `<base>.<RFC3339>`
//! - [`archiver`]: compresses and uploads rotated files past retention
//! - [`hook`]: publishes records to Kafka topics keyed by their time
//! - [`pipeline`]: wires the above to a formatter and owns their tasks

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

/// Rotated file selection, compression and upload
pub mod archiver;

/// Environment-driven configuration
pub mod config;

pub mod error;

/// Text and JSON record encoders
pub mod formatter;

/// Kafka fan-out of log records
pub mod hook;

pub mod logging;

pub mod pipeline;

/// Async producer and delivery error drain
pub mod producer;

pub mod record;

/// Rotation timer
pub mod scheduler;

pub mod sink;

/// Object storage backends for archives
pub mod store;

pub use config::PipelineConfig;
pub use pipeline::LogPipeline;
pub use record::{Level, LogRecord};
