//! Filesystem snapshots produced from the store's outbox.
//!
//! The relational write is authoritative. Each stored record is queued in the
//! outbox in the same transaction; draining writes one JSON file per record at
//! `{root}/{YYYY-MM-DD}/{task_type}/{id}.json` and only then dequeues it, so a
//! failed write is retried on the next pass and rewrites are harmless.

use crate::store::{InteractionStore, StoreError};
use interlog_core::InteractionRecord;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one drain call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub written: usize,
    pub failed: usize,
}

/// Writes record snapshots under a root directory.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    root: PathBuf,
}

impl SnapshotWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, record: &InteractionRecord) -> PathBuf {
        self.root
            .join(record.timestamp.format("%Y-%m-%d").to_string())
            .join(record.task_type.as_str())
            .join(format!("{}.json", record.id))
    }

    /// Writes the record atomically, replacing any previous snapshot.
    pub fn write(&self, record: &InteractionRecord) -> Result<PathBuf, SnapshotError> {
        let path = self.path_for(record);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let body = serde_json::to_vec_pretty(record)?;
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&tmp, body)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(path)
    }

    /// Writes queued snapshots until the outbox is empty or only rows that
    /// already failed in this pass remain.
    ///
    /// A failed row is moved to the back of the queue so it cannot hold up
    /// newer records.
    pub fn drain(
        &self,
        store: &InteractionStore,
        batch_size: usize,
    ) -> Result<DrainReport, SnapshotError> {
        let mut report = DrainReport::default();
        let mut failed: HashSet<String> = HashSet::new();

        loop {
            let batch = store.pending_snapshots(batch_size)?;
            if batch.iter().all(|record| failed.contains(&record.id)) {
                break;
            }

            for record in batch.iter() {
                if failed.contains(&record.id) {
                    continue;
                }
                match self.write(record) {
                    Ok(path) => {
                        store.ack_snapshot(&record.id)?;
                        report.written += 1;
                        tracing::debug!(record_id = %record.id, path = %path.display(), "Wrote snapshot");
                    }
                    Err(e) => {
                        store.defer_snapshot(&record.id)?;
                        failed.insert(record.id.clone());
                        tracing::warn!(record_id = %record.id, "Snapshot write failed, requeued: {}", e);
                    }
                }
            }

            if batch.len() < batch_size {
                break;
            }
        }

        report.failed = failed.len();
        Ok(report)
    }
}

enum Signal {
    Wake,
    Shutdown,
}

/// Background thread that drains the snapshot outbox.
///
/// Woken explicitly after each stored record and otherwise on a poll interval.
/// Dropping the worker performs a final drain and joins the thread.
pub struct SnapshotWorker {
    sender: Sender<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotWorker {
    pub fn spawn(
        store: Arc<InteractionStore>,
        writer: SnapshotWriter,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Result<Self, SnapshotError> {
        let (sender, receiver) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("interlog-snapshots".to_string())
            .spawn(move || {
                tracing::info!(root = %writer.root().display(), "Snapshot worker started");
                loop {
                    let stop = match receiver.recv_timeout(poll_interval) {
                        Ok(Signal::Wake) | Err(RecvTimeoutError::Timeout) => false,
                        Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => true,
                    };
                    if let Err(e) = writer.drain(&store, batch_size) {
                        tracing::warn!("Snapshot drain failed: {}", e);
                    }
                    if stop {
                        break;
                    }
                }
                tracing::info!("Snapshot worker stopped");
            })?;

        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    pub fn wake(&self) {
        let _ = self.sender.send(Signal::Wake);
    }
}

impl Drop for SnapshotWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(Signal::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Snapshot worker panicked");
            }
        }
    }
}
