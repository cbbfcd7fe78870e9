// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Append-only file sink with timestamped rotation.
//!
//! Writers and the rotation path share one mutex over the active file, so a
//! write can never land between the close of the old file and the creation
//! of the new one. Archival of rotated files is only *triggered* from
//! [`RotatingSink::rotate`], after the lock has been released.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::archiver::Archiver;
use crate::error::SinkError;

pub struct RotatingSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
    archiver: Option<Arc<Archiver>>,
}

impl RotatingSink {
    /// Opens the sink at `path`, rotating away any file a previous run left
    /// there so that it becomes an archival candidate.
    pub fn open(
        path: impl Into<PathBuf>,
        archiver: Option<Arc<Archiver>>,
    ) -> Result<Self, SinkError> {
        let sink = Self {
            path: path.into(),
            file: Mutex::new(None),
            archiver,
        };
        sink.rotate()?;
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an active file is currently open for writing.
    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Appends `buf` to the active file as a single ordered unit.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(file) => {
                file.write_all(buf)?;
                Ok(buf.len())
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "log sink has no active file",
            )),
        }
    }

    /// Closes the active file, renames it to `<path>.<RFC3339 now>` and opens
    /// a fresh file at `path`. Returns the rotated path, if there was a file
    /// to rename.
    ///
    /// If closing fails the sink is left without an active file and every
    /// write fails until a later rotation succeeds.
    pub fn rotate(&self) -> Result<Option<PathBuf>, SinkError> {
        let rotated = {
            let mut guard = self.lock();

            if let Some(file) = guard.take() {
                close(file).map_err(|source| SinkError::Close {
                    path: self.path.clone(),
                    source,
                })?;
            }

            let rotated = if self.path.exists() {
                let target = rotated_path(&self.path, Utc::now());
                fs::rename(&self.path, &target).map_err(|source| SinkError::Rename {
                    from: self.path.clone(),
                    to: target.clone(),
                    source,
                })?;
                Some(target)
            } else {
                None
            };

            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)
                .map_err(|source| SinkError::Create {
                    path: self.path.clone(),
                    source,
                })?;
            *guard = Some(file);
            rotated
        };

        if let Some(ref rotated) = rotated {
            debug!("Rotated {} to {}", self.path.display(), rotated.display());
        }
        if let Some(archiver) = &self.archiver {
            archiver.trigger();
        }
        Ok(rotated)
    }

    /// Closes the active file. Later writes fail with `NotConnected`.
    pub fn close(&self) -> Result<(), SinkError> {
        let file = self.lock().take();
        match file {
            Some(file) => close(file).map_err(|source| SinkError::Close {
                path: self.path.clone(),
                source,
            }),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        // A panicking writer cannot leave the handle half-updated.
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for &RotatingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingSink::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lock().as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// `File` reports close errors only through an explicit sync.
fn close(mut file: File) -> io::Result<()> {
    file.flush()?;
    file.sync_all()
}

/// `<path>.<RFC3339>` in UTC with second precision, falling back to
/// nanosecond precision when a rotation already claimed that second.
pub fn rotated_path(path: &Path, now: DateTime<Utc>) -> PathBuf {
    let candidate = with_suffix(path, &now.to_rfc3339_opts(SecondsFormat::Secs, true));
    if candidate.exists() {
        with_suffix(path, &now.to_rfc3339_opts(SecondsFormat::Nanos, true))
    } else {
        candidate
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    fn rotated_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("app.log."))
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_open_creates_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let sink = RotatingSink::open(&path, None).unwrap();

        assert!(sink.is_open());
        assert_eq!(fs::read(&path).unwrap(), b"");
        assert!(rotated_files(dir.path()).is_empty());
    }

    #[test]
    fn test_open_rotates_leftover_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "previous run").unwrap();

        let _sink = RotatingSink::open(&path, None).unwrap();

        let rotated = rotated_files(dir.path());
        assert_eq!(rotated.len(), 1);
        assert_eq!(fs::read_to_string(&rotated[0]).unwrap(), "previous run");
        assert_eq!(fs::read(&path).unwrap(), b"");
    }

    #[test]
    fn test_rotate_renames_with_rfc3339_suffix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let sink = RotatingSink::open(&path, None).unwrap();

        sink.write(b"first\n").unwrap();
        sink.write(b"second\n").unwrap();
        let before = Utc::now();
        let rotated = sink.rotate().unwrap().expect("file should be rotated");

        let name = rotated.file_name().unwrap().to_str().unwrap();
        let suffix = name.strip_prefix("app.log.").unwrap();
        let parsed = DateTime::parse_from_rfc3339(suffix).unwrap();
        assert!((parsed.with_timezone(&Utc) - before).num_seconds().abs() <= 1);

        assert_eq!(fs::read_to_string(&rotated).unwrap(), "first\nsecond\n");
        assert_eq!(fs::read(&path).unwrap(), b"");
        assert_eq!(rotated_files(dir.path()), vec![rotated]);

        sink.write(b"third\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "third\n");
    }

    #[test]
    fn test_rotate_twice_within_a_second_keeps_both() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let sink = RotatingSink::open(&path, None).unwrap();

        sink.write(b"a").unwrap();
        let first = sink.rotate().unwrap().unwrap();
        sink.write(b"b").unwrap();
        let second = sink.rotate().unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(&first).unwrap(), "a");
        assert_eq!(fs::read_to_string(&second).unwrap(), "b");
        for rotated in [first, second] {
            let name = rotated.file_name().unwrap().to_str().unwrap().to_string();
            let suffix = name.strip_prefix("app.log.").unwrap();
            assert!(DateTime::parse_from_rfc3339(suffix).is_ok());
        }
    }

    #[test]
    fn test_write_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let sink = RotatingSink::open(dir.path().join("app.log"), None).unwrap();

        sink.close().unwrap();
        sink.close().unwrap();
        let err = sink.write(b"late").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_create_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("app.log");

        let err = RotatingSink::open(&path, None).err().expect("open must fail");
        assert!(matches!(err, SinkError::Create { .. }));
    }

    #[test]
    fn test_rename_failure_leaves_sink_without_file() {
        let dir = TempDir::new().unwrap();
        // Fits in NAME_MAX on its own, but not with the timestamp suffix.
        let path = dir.path().join(format!("{}.log", "a".repeat(240)));
        let sink = RotatingSink::open(&path, None).unwrap();
        sink.write(b"kept").unwrap();

        let err = sink.rotate().unwrap_err();

        assert!(matches!(err, SinkError::Rename { .. }));
        assert!(!sink.is_open());
        let err = sink.write(b"lost").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert_eq!(fs::read_to_string(&path).unwrap(), "kept");
    }

    #[test]
    fn test_concurrent_writes_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let sink = Arc::new(RotatingSink::open(&path, None).unwrap());

        let writers: Vec<_> = (0..8)
            .map(|id| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    let line = format!("{}\n", id.to_string().repeat(512));
                    for _ in 0..50 {
                        sink.write(line.as_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 8 * 50);
        for line in lines {
            assert_eq!(line.len(), 512);
            let first = line.chars().next().unwrap();
            assert!(line.chars().all(|c| c == first));
        }
    }

    #[test]
    fn test_io_write_impl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let sink = RotatingSink::open(&path, None).unwrap();

        writeln!(&sink, "formatted {}", 42).unwrap();
        (&sink).flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "formatted 42\n");
    }
}
