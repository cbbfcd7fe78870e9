// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Archival of rotated log files to cold storage.
//!
//! A cleanup pass runs in four steps for every rotated file older than the
//! retention threshold, oldest first:
//!
//! ```text
//!   select ──> compress (<file>.zip) ──> upload (<Y>/<Month>/<D>/<file>.zip) ──> delete
//! ```
//!
//! The first failing step ends the pass. Nothing is deleted from disk
//! unless the upload of that file was confirmed, so every file that
//! survives a failed pass is simply retried on the next one.
//!
//! Passes are single-flight per sink: a trigger that arrives while a pass
//! is running is dropped and the files are left for the next rotation.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Datelike, Duration, FixedOffset, Utc};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ArchiveError;
use crate::store::ArchiveStore;

pub const ARTIFACT_EXTENSION: &str = "zip";

/// One rotated file selected for archival during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveJob {
    pub path: PathBuf,
    pub timestamp: DateTime<FixedOffset>,
}

impl ArchiveJob {
    pub fn artifact_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".");
        name.push(ARTIFACT_EXTENSION);
        PathBuf::from(name)
    }

    /// `<year>/<month name>/<day>/<artifact name>`, dated by the rotation
    /// timestamp rather than the upload time.
    pub fn object_key(&self) -> String {
        let artifact = self.artifact_path();
        let artifact_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!(
            "{}/{}/{}/{}",
            self.timestamp.year(),
            self.timestamp.format("%B"),
            self.timestamp.day(),
            artifact_name
        )
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub uploaded: Vec<String>,
}

pub struct Archiver {
    dir: PathBuf,
    base_name: String,
    retention_days: u32,
    store: Arc<dyn ArchiveStore>,
    in_flight: AtomicBool,
    pass: Mutex<Option<JoinHandle<()>>>,
}

impl Archiver {
    /// `base_path` is the sink's active file; rotated siblings are looked up
    /// in its directory. A retention of zero days disables archival.
    pub fn new(base_path: &Path, retention_days: u32, store: Arc<dyn ArchiveStore>) -> Self {
        let dir = match base_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let base_name = base_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            dir,
            base_name,
            retention_days,
            store,
            in_flight: AtomicBool::new(false),
            pass: Mutex::new(None),
        }
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Starts a cleanup pass in the background unless one is already in
    /// flight. Never blocks on I/O.
    pub fn trigger(self: &Arc<Self>) {
        if self.retention_days == 0 {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime available, skipping archival pass");
            return;
        };
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("Archival pass already running, skipping trigger");
            return;
        }

        let archiver = Arc::clone(self);
        let task = runtime.spawn(async move {
            let _guard = InFlight(&archiver.in_flight);
            match archiver.cleanup().await {
                Ok(report) if !report.uploaded.is_empty() => {
                    info!("Archived {} rotated log files", report.uploaded.len());
                }
                Ok(_) => {}
                Err(e) => error!("Archival pass stopped: {e}"),
            }
        });
        *self.pass.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Waits for the pass started by the last [`Archiver::trigger`], if any.
    pub async fn wait_idle(&self) {
        let task = self
            .pass
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Archival task failed: {e}");
            }
        }
    }

    /// Runs one pass synchronously with respect to the caller.
    pub async fn cleanup(&self) -> Result<CleanupReport, ArchiveError> {
        let mut report = CleanupReport::default();
        if self.retention_days == 0 {
            return Ok(report);
        }

        let jobs = self.select(Utc::now())?;
        if jobs.is_empty() {
            return Ok(report);
        }
        debug!("Archiving {} rotated log files", jobs.len());

        for job in jobs {
            let key = job.object_key();
            let artifact = job.artifact_path();

            let body = {
                let source = job.path.clone();
                let target = artifact.clone();
                tokio::task::spawn_blocking(move || compress_and_read(&source, &target))
                    .await
                    .map_err(|e| ArchiveError::Task(e.to_string()))??
            };
            debug!("Uploading {} ({} bytes) as {key}", artifact.display(), body.len());

            if let Err(e) = self.store.put(&key, body).await {
                // The rotated original stays; the next pass recompresses it.
                let _ = fs::remove_file(&artifact);
                return Err(e);
            }

            remove(&artifact)?;
            remove(&job.path)?;
            report.uploaded.push(key);
        }

        Ok(report)
    }

    /// Rotated files older than the retention threshold, oldest first.
    /// Files whose suffix is not an RFC3339 timestamp are ignored.
    pub fn select(&self, now: DateTime<Utc>) -> Result<Vec<ArchiveJob>, ArchiveError> {
        if self.retention_days == 0 {
            return Ok(Vec::new());
        }
        let cutoff = now - Duration::days(i64::from(self.retention_days));
        let prefix = format!("{}.", self.base_name);

        let entries = fs::read_dir(&self.dir).map_err(|source| ArchiveError::Scan {
            dir: self.dir.clone(),
            source,
        })?;

        let mut jobs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ArchiveError::Scan {
                dir: self.dir.clone(),
                source,
            })?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name();
            let Some(suffix) = name.to_str().and_then(|n| n.strip_prefix(&prefix)) else {
                continue;
            };
            let Ok(timestamp) = DateTime::parse_from_rfc3339(suffix) else {
                continue;
            };
            if timestamp < cutoff {
                jobs.push(ArchiveJob {
                    path: entry.path(),
                    timestamp,
                });
            }
        }
        jobs.sort_by_key(|job| job.timestamp);
        Ok(jobs)
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn compress_and_read(source: &Path, target: &Path) -> Result<Bytes, ArchiveError> {
    compress(source, target).map_err(|e| ArchiveError::Compress {
        path: source.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::read(target)
        .map(Bytes::from)
        .map_err(|e| ArchiveError::Compress {
            path: target.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Writes `source` as the single deflated entry of the archive at `target`.
pub fn compress(source: &Path, target: &Path) -> zip::result::ZipResult<()> {
    let mut input = File::open(source)?;
    let size = input.metadata()?.len();
    let entry_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut archive = ZipWriter::new(File::create(target)?);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(size >= u64::from(u32::MAX));
    archive.start_file(entry_name, options)?;
    io::copy(&mut input, &mut archive)?;
    archive.finish()?;
    Ok(())
}

fn remove(path: &Path) -> Result<(), ArchiveError> {
    fs::remove_file(path).map_err(|source| ArchiveError::Delete {
        path: path.to_path_buf(),
        source,
    })
}
