//! Upload queue
//!
//! Owns one batch of local → remote transfers, drains it strictly one item at a
//! time and tracks per-item state:
//!
//! ```text
//! Pending → Uploading{progress} → Done
//!                               ↘ Error{progress, message}
//! ```
//!
//! The remote call reports no byte progress, so `Uploading` progress is a
//! timer-driven approximation capped below 100. A failed item never stops the
//! items after it. When the batch ends the destination directory is
//! invalidated once, even if the `run` future is dropped mid-transfer. An item
//! in flight at that point ends as `Error` with the message `abandoned`.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cache::RemoteDirectoryCache;
use super::error::FileOpError;
use super::path::{enter, normalize};
use crate::config::UploadConfig;
use crate::link::{LinkError, RemoteLink};
use crate::session::SessionId;

/// A local file picked for upload
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub name: String,
    pub data: Bytes,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Read a file from the local filesystem
    pub async fn read(path: impl AsRef<Path>) -> Result<Self, FileOpError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                FileOpError::validation(format!("{} has no file name", path.display()))
            })?;
        let data = tokio::fs::read(path).await?;
        Ok(Self::new(name, data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Per-item lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadState {
    Pending,
    Uploading { progress: u8 },
    Done,
    /// Progress is frozen at its last value
    Error { progress: u8, message: String },
}

impl UploadState {
    pub fn progress(&self) -> u8 {
        match self {
            UploadState::Pending => 0,
            UploadState::Uploading { progress } | UploadState::Error { progress, .. } => *progress,
            UploadState::Done => 100,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Done | UploadState::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadItem {
    pub id: Uuid,
    pub name: String,
    pub dest_path: String,
    pub size: u64,
    pub state: UploadState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum UploadEvent {
    StateChanged { id: Uuid, state: UploadState },
    BatchFinished { summary: BatchSummary },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    AllSucceeded,
    PartialFailure,
    AllFailed,
    /// No item ran, e.g. the batch was dismissed before the first transfer
    NothingUploaded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// The batch was dismissed before every item ran
    pub abandoned: bool,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn outcome(&self) -> BatchOutcome {
        match (self.succeeded, self.failed) {
            (0, 0) => BatchOutcome::NothingUploaded,
            (_, 0) => BatchOutcome::AllSucceeded,
            (0, _) => BatchOutcome::AllFailed,
            _ => BatchOutcome::PartialFailure,
        }
    }

    /// `Ok` unless an item failed
    ///
    /// A mix of successes and failures is `PartialBatchFailure`; a batch where
    /// every item failed is `BatchFailed`.
    pub fn into_result(self) -> Result<BatchSummary, FileOpError> {
        match self.outcome() {
            BatchOutcome::AllSucceeded | BatchOutcome::NothingUploaded => Ok(self),
            BatchOutcome::PartialFailure => Err(FileOpError::PartialBatchFailure {
                succeeded: self.succeeded,
                failed: self.failed,
            }),
            BatchOutcome::AllFailed => Err(FileOpError::BatchFailed {
                failed: self.failed,
            }),
        }
    }
}

/// Stop signal for a running batch
#[derive(Debug)]
struct BatchControl {
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl BatchControl {
    fn new() -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            cancel_tx,
            cancel_rx,
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

struct QueuedUpload {
    item: UploadItem,
    data: Bytes,
}

struct Batch {
    session: SessionId,
    current_path: String,
    uploads: Vec<QueuedUpload>,
}

#[derive(Default)]
struct QueueState {
    batch: Option<Batch>,
    control: Option<Arc<BatchControl>>,
}

const ABANDONED: &str = "abandoned";

/// Ends a batch run, including when the `run` future is dropped
///
/// Any item still `Uploading` becomes `Error`, the destination directory is
/// invalidated once and the running marker is cleared.
struct RunGuard<'a> {
    manager: &'a UploadQueueManager,
    session: SessionId,
    current_path: String,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let abandoned: Vec<(Uuid, UploadState)> = {
            let mut state = self.manager.state.lock();
            state
                .batch
                .iter_mut()
                .flat_map(|b| b.uploads.iter_mut())
                .filter_map(|u| match u.item.state {
                    UploadState::Uploading { progress } => {
                        u.item.state = UploadState::Error {
                            progress,
                            message: ABANDONED.to_string(),
                        };
                        Some((u.item.id, u.item.state.clone()))
                    }
                    _ => None,
                })
                .collect()
        };
        for (id, state) in abandoned {
            warn!("[upload] {} dropped mid-transfer", id);
            self.manager.emit(UploadEvent::StateChanged { id, state });
        }

        self.manager
            .cache
            .invalidate(&self.session, &self.current_path);
        self.manager.state.lock().control = None;
    }
}

pub struct UploadQueueManager {
    link: Arc<dyn RemoteLink>,
    cache: Arc<RemoteDirectoryCache>,
    config: UploadConfig,
    state: Mutex<QueueState>,
    events: Option<mpsc::UnboundedSender<UploadEvent>>,
}

impl UploadQueueManager {
    pub fn new(link: Arc<dyn RemoteLink>, cache: Arc<RemoteDirectoryCache>) -> Self {
        Self::with_config(link, cache, UploadConfig::default())
    }

    pub fn with_config(
        link: Arc<dyn RemoteLink>,
        cache: Arc<RemoteDirectoryCache>,
        config: UploadConfig,
    ) -> Self {
        Self {
            link,
            cache,
            config,
            state: Mutex::new(QueueState::default()),
            events: None,
        }
    }

    /// Emit an [`UploadEvent`] on every state change
    pub fn with_events(mut self, events: mpsc::UnboundedSender<UploadEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().control.is_some()
    }

    /// Start a new batch targeting `current_path`
    ///
    /// Replaces any finished or unstarted batch.
    pub fn select(
        &self,
        session: &SessionId,
        current_path: &str,
        files: Vec<LocalFile>,
    ) -> Result<Vec<UploadItem>, FileOpError> {
        if files.is_empty() {
            return Err(FileOpError::EmptyBatch);
        }
        let mut state = self.state.lock();
        if state.control.is_some() {
            return Err(FileOpError::BatchInProgress);
        }

        let current_path = normalize(current_path);
        let mut uploads: Vec<QueuedUpload> = Vec::with_capacity(files.len());
        for file in files {
            let dest_path = enter(&current_path, &file.name);
            if uploads.iter().any(|u| u.item.dest_path == dest_path) {
                warn!(
                    "[upload] {} selected more than once, last write wins",
                    dest_path
                );
            }
            uploads.push(QueuedUpload {
                item: UploadItem {
                    id: Uuid::new_v4(),
                    size: file.size(),
                    name: file.name,
                    dest_path,
                    state: UploadState::Pending,
                },
                data: file.data,
            });
        }

        debug!(
            "[upload] {} file(s) selected for {}:{}",
            uploads.len(),
            session,
            current_path
        );
        let items = uploads.iter().map(|u| u.item.clone()).collect();
        state.batch = Some(Batch {
            session: session.clone(),
            current_path,
            uploads,
        });
        Ok(items)
    }

    /// Drop a Pending item. Returns false for unknown or already started items.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut state = self.state.lock();
        let Some(batch) = state.batch.as_mut() else {
            return false;
        };
        let before = batch.uploads.len();
        batch
            .uploads
            .retain(|u| !(u.item.id == id && u.item.state == UploadState::Pending));
        batch.uploads.len() != before
    }

    /// Snapshot of the current batch
    pub fn items(&self) -> Vec<UploadItem> {
        self.state
            .lock()
            .batch
            .as_ref()
            .map(|b| b.uploads.iter().map(|u| u.item.clone()).collect())
            .unwrap_or_default()
    }

    /// Discard the batch
    ///
    /// A running batch finishes its in-flight transfer and then stops; its
    /// summary is marked abandoned.
    pub fn dismiss(&self) {
        let mut state = self.state.lock();
        if let Some(control) = &state.control {
            info!("[upload] batch dismissed while running");
            control.cancel();
        }
        state.batch = None;
    }

    /// Upload every Pending item in order
    pub async fn run(&self) -> Result<BatchSummary, FileOpError> {
        let (session, current_path, work, control) = {
            let mut state = self.state.lock();
            if state.control.is_some() {
                return Err(FileOpError::BatchInProgress);
            }
            let batch = state.batch.as_ref().ok_or(FileOpError::EmptyBatch)?;
            let work: Vec<(Uuid, String, Bytes)> = batch
                .uploads
                .iter()
                .filter(|u| u.item.state == UploadState::Pending)
                .map(|u| (u.item.id, u.item.dest_path.clone(), u.data.clone()))
                .collect();
            if work.is_empty() {
                return Err(FileOpError::EmptyBatch);
            }
            let session = batch.session.clone();
            let current_path = batch.current_path.clone();
            let control = Arc::new(BatchControl::new());
            state.control = Some(control.clone());
            (session, current_path, work, control)
        };
        let guard = RunGuard {
            manager: self,
            session: session.clone(),
            current_path: current_path.clone(),
        };

        let mut summary = BatchSummary::default();
        for (id, dest_path, data) in work {
            if control.is_cancelled() {
                break;
            }
            // Removed while waiting
            if !self.is_pending(id) {
                continue;
            }
            match self.transfer(&session, id, &dest_path, data).await {
                Ok(()) => summary.succeeded += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary.abandoned = control.is_cancelled();

        drop(guard);
        info!(
            "[upload] batch to {}:{} finished: {} succeeded, {} failed{}",
            session,
            current_path,
            summary.succeeded,
            summary.failed,
            if summary.abandoned { " (abandoned)" } else { "" }
        );
        self.emit(UploadEvent::BatchFinished { summary });
        Ok(summary)
    }

    fn is_pending(&self, id: Uuid) -> bool {
        self.state
            .lock()
            .batch
            .as_ref()
            .and_then(|b| b.uploads.iter().find(|u| u.item.id == id))
            .map(|u| u.item.state == UploadState::Pending)
            .unwrap_or(false)
    }

    async fn transfer(
        &self,
        session: &SessionId,
        id: Uuid,
        dest_path: &str,
        data: Bytes,
    ) -> Result<(), LinkError> {
        let cap = self.config.effective_cap();
        let mut progress = self.config.initial_progress.min(cap);
        self.set_state(id, UploadState::Uploading { progress });
        debug!("[upload] {} -> {}", session, dest_path);

        let upload = self.link.upload(session, dest_path, data);
        tokio::pin!(upload);
        let mut ticker = tokio::time::interval(self.config.tick_interval());
        // First tick completes immediately
        ticker.tick().await;

        let result = loop {
            tokio::select! {
                biased;
                result = &mut upload => break result,
                _ = ticker.tick() => {
                    let next = progress.saturating_add(self.config.tick_increment).min(cap);
                    if next != progress {
                        progress = next;
                        self.set_state(id, UploadState::Uploading { progress });
                    }
                }
            }
        };

        match &result {
            Ok(()) => self.set_state(id, UploadState::Done),
            Err(e) => {
                warn!("[upload] {} failed: {}", dest_path, e);
                self.set_state(
                    id,
                    UploadState::Error {
                        progress,
                        message: e.to_string(),
                    },
                );
            }
        }
        result
    }

    /// Record a transition unless the item is gone or already terminal
    fn set_state(&self, id: Uuid, next: UploadState) {
        let recorded = {
            let mut state = self.state.lock();
            let upload = state
                .batch
                .as_mut()
                .and_then(|b| b.uploads.iter_mut().find(|u| u.item.id == id));
            match upload {
                Some(u) if !u.item.state.is_terminal() => {
                    u.item.state = next.clone();
                    true
                }
                _ => false,
            }
        };
        if recorded {
            self.emit(UploadEvent::StateChanged { id, state: next });
        }
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
