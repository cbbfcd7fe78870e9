// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::io::{self, BufRead};
use std::sync::Arc;
use std::{process, thread};

use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use log_shipper::{logging, Level, LogPipeline, LogRecord, PipelineConfig};

#[tokio::main]
pub async fn main() {
    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = logging::init(&config.log_level) {
        eprintln!("Unable to initialize logging: {e}");
        process::exit(1);
    }

    let pipeline = match LogPipeline::start(config) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => {
            error!("Unable to start log pipeline: {e}");
            process::exit(1);
        }
    };
    info!("Log shipper started, reading records from stdin");

    // A plain thread so that a blocked read never holds up runtime shutdown.
    let (eof_tx, eof_rx) = oneshot::channel();
    {
        let pipeline = Arc::clone(&pipeline);
        thread::spawn(move || {
            let shipped = ship_lines(io::stdin().lock(), &pipeline);
            let _ = eof_tx.send(shipped);
        });
    }

    tokio::select! {
        shipped = eof_rx => match shipped {
            Ok(shipped) => info!("End of input after {shipped} records"),
            Err(_) => error!("Stdin reader stopped unexpectedly"),
        },
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    if let Err(e) = pipeline.shutdown().await {
        error!("Error during shutdown: {e}");
        process::exit(1);
    }
}

/// A parsed stdin line.
#[derive(Debug)]
enum Line {
    /// Goes to the output and the broker hook.
    Record(LogRecord),
    /// A JSON object whose reserved fields are invalid. Kept verbatim in
    /// the output but never published.
    LocalOnly(LogRecord),
}

/// Logs every line of `input` through `pipeline`, returning how many
/// lines were written.
fn ship_lines(input: impl BufRead, pipeline: &LogPipeline) -> usize {
    let mut shipped = 0;
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Error reading stdin: {e}");
                break;
            }
        };
        let result = match parse_line(&line) {
            Some(Line::Record(record)) => pipeline.log(&record),
            Some(Line::LocalOnly(record)) => pipeline.write(&record),
            None => continue,
        };
        match result {
            Ok(()) => shipped += 1,
            Err(e) => error!("{e}"),
        }
    }
    shipped
}

/// A JSON object becomes a structured record. Anything else is logged
/// verbatim at info level.
fn parse_line(line: &str) -> Option<Line> {
    let line = line.trim_end();
    if line.is_empty() {
        return None;
    }
    let parsed = match serde_json::from_str::<Map<String, Value>>(line) {
        Ok(fields) => match LogRecord::try_from(fields) {
            Ok(record) => Line::Record(record),
            Err(e) => {
                warn!("Record will not be published: {e}");
                Line::LocalOnly(LogRecord::new(Level::Info, line))
            }
        },
        Err(_) => {
            debug!("Shipping non-JSON line as plain text");
            Line::Record(LogRecord::new(Level::Info, line))
        }
    };
    Some(parsed)
}
