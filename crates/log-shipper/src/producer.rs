// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Asynchronous broker producer and its error drain.
//!
//! Messages are handed to the producer's internal queue and delivered in
//! the background with batching and retries. Delivery failures surface on
//! an unbounded channel once the producer has exhausted its own retries;
//! [`ErrorDrain`] consumes that channel and logs every failure.

use std::thread;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{
    BaseRecord, DeliveryResult, Producer as _, ProducerContext, ThreadedProducer,
};
use rdkafka::ClientContext;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::BrokerConfig;
use crate::error::PublishError;

// How long a caller sleeps before retrying when the local queue is full.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerMessage {
    /// Empty when the record carried no time.
    pub key: Vec<u8>,
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub topic: String,
    pub reason: String,
}

pub type DeliveryErrors = mpsc::UnboundedReceiver<DeliveryFailure>;

pub trait Producer: Send + Sync {
    /// Hands `message` to the producer. May block the calling thread while
    /// the local queue is full; never reports delivery failures.
    fn enqueue(&self, message: ProducerMessage);

    /// Waits for queued messages to be delivered, up to `timeout`.
    fn flush(&self, timeout: Duration) -> Result<(), PublishError>;
}

struct DeliveryReporter {
    errors: mpsc::UnboundedSender<DeliveryFailure>,
}

impl ClientContext for DeliveryReporter {}

impl ProducerContext for DeliveryReporter {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _: Self::DeliveryOpaque) {
        if let Err((err, message)) = result {
            let _ = self.errors.send(DeliveryFailure {
                topic: message.topic().to_string(),
                reason: err.to_string(),
            });
        }
    }
}

/// Kafka producer backed by librdkafka's background polling thread.
pub struct KafkaProducer {
    inner: ThreadedProducer<DeliveryReporter>,
    errors: mpsc::UnboundedSender<DeliveryFailure>,
}

impl KafkaProducer {
    pub fn new(
        id: &str,
        config: &BrokerConfig,
    ) -> Result<(Self, DeliveryErrors), PublishError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner: ThreadedProducer<DeliveryReporter> = client_config(id, config)
            .create_with_context(DeliveryReporter { errors: tx.clone() })
            .map_err(|e| PublishError::Create(e.to_string()))?;
        debug!("Kafka producer created for {}", config.brokers.join(","));
        Ok((Self { inner, errors: tx }, rx))
    }
}

/// Leader-only acks, snappy compression and time-bounded batches.
pub fn client_config(id: &str, config: &BrokerConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", config.brokers.join(","))
        .set("client.id", id)
        .set("acks", "1")
        .set("compression.type", "snappy")
        .set("linger.ms", config.flush_interval.as_millis().to_string());
    client
}

impl Producer for KafkaProducer {
    fn enqueue(&self, message: ProducerMessage) {
        loop {
            let mut record: BaseRecord<'_, [u8], [u8]> =
                BaseRecord::to(&message.topic).payload(&message.payload[..]);
            if !message.key.is_empty() {
                record = record.key(&message.key[..]);
            }
            match self.inner.send(record) {
                Ok(()) => return,
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), _)) => {
                    thread::sleep(QUEUE_FULL_BACKOFF);
                }
                Err((err, _)) => {
                    let _ = self.errors.send(DeliveryFailure {
                        topic: message.topic.clone(),
                        reason: err.to_string(),
                    });
                    return;
                }
            }
        }
    }

    fn flush(&self, timeout: Duration) -> Result<(), PublishError> {
        self.inner
            .flush(timeout)
            .map_err(|e| PublishError::Flush(e.to_string()))
    }
}

/// Background task logging delivery failures for the producer's lifetime.
pub struct ErrorDrain {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ErrorDrain {
    pub fn spawn(errors: DeliveryErrors) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_drain(errors, cancel.clone()));
        Self { cancel, task }
    }

    /// Logs whatever is already queued, then stops the task.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!("Error drain task failed: {e}");
        }
    }
}

async fn run_drain(mut errors: DeliveryErrors, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            failure = errors.recv() => match failure {
                Some(failure) => log_failure(&failure),
                None => break,
            },
            _ = cancel.cancelled() => {
                while let Ok(failure) = errors.try_recv() {
                    log_failure(&failure);
                }
                break;
            }
        }
    }
    debug!("Error drain stopped");
}

fn log_failure(failure: &DeliveryFailure) {
    error!(
        "Error sending message to Kafka topic {}: {}",
        failure.topic, failure.reason
    );
}
