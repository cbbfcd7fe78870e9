// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wiring of formatter, output, broker hook and their background tasks.
//!
//! ```text
//!   log(record) ──> Formatter ──> console | RotatingSink ──(rotation)──> Archiver ──> ArchiveStore
//!               └─> BrokerHook ──> Producer ──(failures)──> ErrorDrain
//! ```

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::archiver::Archiver;
use crate::config::{Output, PipelineConfig};
use crate::error::PipelineError;
use crate::formatter::{Formatter, JsonFormatter};
use crate::hook::BrokerHook;
use crate::producer::{DeliveryErrors, ErrorDrain, KafkaProducer, Producer};
use crate::record::LogRecord;
use crate::scheduler::spawn_rotation;
use crate::sink::RotatingSink;
use crate::store::{create_object_store, ArchiveStore, ObjectStoreArchive};

const PRODUCER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

enum Destination {
    Console,
    File(Arc<RotatingSink>),
}

impl Destination {
    fn write(&self, payload: &[u8]) -> io::Result<()> {
        match self {
            Destination::Console => io::stdout().lock().write_all(payload),
            Destination::File(sink) => sink.write(payload).map(|_| ()),
        }
    }
}

pub struct PipelineBuilder {
    config: PipelineConfig,
    producer: Option<(Arc<dyn Producer>, Option<DeliveryErrors>)>,
    store: Option<Arc<dyn ArchiveStore>>,
}

impl PipelineBuilder {
    /// Uses `producer` instead of connecting to the configured brokers.
    /// Only takes effect when the broker hook is enabled.
    #[must_use]
    pub fn with_producer(
        mut self,
        producer: Arc<dyn Producer>,
        errors: Option<DeliveryErrors>,
    ) -> Self {
        self.producer = Some((producer, errors));
        self
    }

    /// Uses `store` instead of the configured archive target.
    #[must_use]
    pub fn with_archive_store(mut self, store: Arc<dyn ArchiveStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Opens the output and spawns the background tasks. Must be called
    /// from within a tokio runtime.
    pub fn start(self) -> Result<LogPipeline, PipelineError> {
        let config = self.config;
        config.validate()?;

        let cancel = CancellationToken::new();
        let formatter: Arc<dyn Formatter> = Arc::from(config.formatter.build());

        let (destination, archiver, rotation) = match &config.output {
            Output::Console => (Destination::Console, None, None),
            Output::File(path) => {
                let store = match (self.store, &config.archive) {
                    (Some(store), _) => Some(store),
                    (None, Some(target)) => Some(Arc::new(ObjectStoreArchive::new(
                        create_object_store(target)?,
                    )) as Arc<dyn ArchiveStore>),
                    (None, None) => None,
                };
                if store.is_none() && config.retention_days > 0 {
                    warn!("No archive target configured, rotated logs will stay on disk");
                }
                let archiver = store
                    .map(|store| Arc::new(Archiver::new(path, config.retention_days, store)));

                let sink = Arc::new(RotatingSink::open(path.clone(), archiver.clone())?);
                let rotation =
                    spawn_rotation(Arc::clone(&sink), config.rotation_interval, cancel.clone());
                info!(
                    "Writing logs to {} rotating every {}s",
                    path.display(),
                    config.rotation_interval.as_secs()
                );
                (Destination::File(sink), archiver, Some(rotation))
            }
        };

        let (hook, drain) = match &config.broker {
            Some(broker) => {
                let (producer, errors) = match self.producer {
                    Some(injected) => injected,
                    None => {
                        let (producer, errors) = KafkaProducer::new(&broker.id, broker)?;
                        (Arc::new(producer) as Arc<dyn Producer>, Some(errors))
                    }
                };
                let drain = errors.map(ErrorDrain::spawn);
                let hook = BrokerHook::new(
                    broker.id.clone(),
                    broker.levels.clone(),
                    Arc::new(JsonFormatter),
                    producer,
                    broker.default_topics.clone(),
                );
                info!("Broker hook {} enabled", broker.id);
                (Some(hook), drain)
            }
            None => {
                debug!("Broker hook disabled");
                (None, None)
            }
        };

        Ok(LogPipeline {
            formatter,
            destination,
            hook,
            archiver,
            cancel,
            rotation: Mutex::new(rotation),
            drain: Mutex::new(drain),
        })
    }
}

pub struct LogPipeline {
    formatter: Arc<dyn Formatter>,
    destination: Destination,
    hook: Option<BrokerHook>,
    archiver: Option<Arc<Archiver>>,
    cancel: CancellationToken,
    rotation: Mutex<Option<JoinHandle<()>>>,
    drain: Mutex<Option<ErrorDrain>>,
}

impl LogPipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            producer: None,
            store: None,
        }
    }

    pub fn start(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::builder(config).start()
    }

    pub fn sink(&self) -> Option<&Arc<RotatingSink>> {
        match &self.destination {
            Destination::File(sink) => Some(sink),
            Destination::Console => None,
        }
    }

    pub fn hook(&self) -> Option<&BrokerHook> {
        self.hook.as_ref()
    }

    /// Writes `record` to the output and hands it to the broker hook.
    ///
    /// Only output failures are returned. A record the hook rejects is
    /// logged and dropped without affecting the output.
    pub fn log(&self, record: &LogRecord) -> Result<(), PipelineError> {
        let written = self.write(record);

        if let Some(hook) = &self.hook {
            if hook.accepts(record.level) {
                if let Err(e) = hook.fire(record) {
                    warn!("Broker hook {} dropped a record: {e}", hook.id());
                }
            }
        }

        written
    }

    /// Writes `record` to the output only, bypassing the broker hook.
    pub fn write(&self, record: &LogRecord) -> Result<(), PipelineError> {
        let payload = self.formatter.format(record)?;
        self.destination.write(&payload)?;
        Ok(())
    }

    /// Stops the rotation timer, flushes the producer, stops the error
    /// drain, waits for a running archival pass and closes the sink.
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        self.cancel.cancel();

        let rotation = self
            .rotation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(rotation) = rotation {
            if let Err(e) = rotation.await {
                error!("Rotation timer failed: {e}");
            }
        }

        if let Some(hook) = &self.hook {
            let producer = Arc::clone(hook.producer());
            match tokio::task::spawn_blocking(move || producer.flush(PRODUCER_FLUSH_TIMEOUT)).await
            {
                Ok(Ok(())) => debug!("Producer flushed"),
                Ok(Err(e)) => error!("{e}"),
                Err(e) => error!("Producer flush task failed: {e}"),
            }
        }

        let drain = self
            .drain
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(drain) = drain {
            drain.shutdown().await;
        }

        if let Some(archiver) = &self.archiver {
            archiver.wait_idle().await;
        }

        if let Destination::File(sink) = &self.destination {
            sink.close()?;
        }
        info!("Log pipeline stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use crate::error::PublishError;
    use crate::producer::ProducerMessage;
    use crate::record::Level;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingProducer {
        sent: Mutex<Vec<ProducerMessage>>,
        flushed: Mutex<bool>,
    }

    impl Producer for RecordingProducer {
        fn enqueue(&self, message: ProducerMessage) {
            self.sent.lock().unwrap().push(message);
        }

        fn flush(&self, _timeout: Duration) -> Result<(), PublishError> {
            *self.flushed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn file_config(dir: &TempDir) -> PipelineConfig {
        PipelineConfig {
            output: Output::File(dir.path().join("app.log")),
            retention_days: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_log_writes_formatted_record() {
        let dir = TempDir::new().unwrap();
        let pipeline = LogPipeline::start(file_config(&dir)).unwrap();

        pipeline
            .log(&LogRecord::new(Level::Info, "started").with_time(None))
            .unwrap();

        let written = fs::read_to_string(dir.path().join("app.log")).unwrap();
        assert_eq!(written, "level=info msg=started\n");
        assert!(pipeline.hook().is_none());
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_hook_receives_accepted_levels_only() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(RecordingProducer::default());
        let config = PipelineConfig {
            broker: Some(BrokerConfig {
                brokers: vec!["localhost:9092".to_string()],
                default_topics: vec!["logs".to_string()],
                ..Default::default()
            }),
            ..file_config(&dir)
        };
        let pipeline = LogPipeline::builder(config)
            .with_producer(producer.clone(), None)
            .start()
            .unwrap();

        pipeline.log(&LogRecord::new(Level::Error, "boom")).unwrap();
        pipeline.log(&LogRecord::new(Level::Debug, "noise")).unwrap();

        {
            let sent = producer.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].topic, "logs");
            let value: serde_json::Value = serde_json::from_slice(&sent[0].payload).unwrap();
            assert_eq!(value["msg"], "boom");
        }
        let written = fs::read_to_string(dir.path().join("app.log")).unwrap();
        assert_eq!(written.lines().count(), 2);

        pipeline.shutdown().await.unwrap();
        assert!(*producer.flushed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_rejected_record_still_reaches_the_file() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(RecordingProducer::default());
        let config = PipelineConfig {
            broker: Some(BrokerConfig {
                brokers: vec!["localhost:9092".to_string()],
                ..Default::default()
            }),
            ..file_config(&dir)
        };
        let pipeline = LogPipeline::builder(config)
            .with_producer(producer.clone(), None)
            .start()
            .unwrap();

        let record = LogRecord::new(Level::Info, "bad topics").with_topics([""]);
        pipeline.log(&record).unwrap();

        assert!(producer.sent.lock().unwrap().is_empty());
        let written = fs::read_to_string(dir.path().join("app.log")).unwrap();
        assert!(written.contains("bad topics"));
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_skips_the_hook() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(RecordingProducer::default());
        let config = PipelineConfig {
            broker: Some(BrokerConfig {
                brokers: vec!["localhost:9092".to_string()],
                default_topics: vec!["logs".to_string()],
                ..Default::default()
            }),
            ..file_config(&dir)
        };
        let pipeline = LogPipeline::builder(config)
            .with_producer(producer.clone(), None)
            .start()
            .unwrap();

        pipeline
            .write(&LogRecord::new(Level::Error, "local only"))
            .unwrap();

        assert!(producer.sent.lock().unwrap().is_empty());
        let written = fs::read_to_string(dir.path().join("app.log")).unwrap();
        assert!(written.contains("local only"));
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_after_shutdown_fails() {
        let dir = TempDir::new().unwrap();
        let pipeline = LogPipeline::start(file_config(&dir)).unwrap();

        pipeline.shutdown().await.unwrap();

        let err = pipeline.log(&LogRecord::new(Level::Info, "late")).unwrap_err();
        assert!(matches!(err, PipelineError::Write(_)));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = PipelineConfig {
            rotation_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            LogPipeline::start(config),
            Err(PipelineError::Config(_))
        ));
    }
}
