// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::sink::RotatingSink;

/// Fixed-interval timer rotating `sink` until `cancel` fires.
///
/// A failed rotation is logged and not retried; writes keep going to
/// whatever file the sink still holds and the next tick tries again.
pub fn spawn_rotation(
    sink: Arc<RotatingSink>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let sink = Arc::clone(&sink);
                    match tokio::task::spawn_blocking(move || sink.rotate()).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => error!("Log rotation failed: {e}"),
                        Err(e) => error!("Log rotation task failed: {e}"),
                    }
                }
            }
        }
        debug!("Rotation timer stopped");
    })
}
