//! Time-ordered observation buffer with a batch upload trigger.
//!
//! Observations are appended in arrival order, so the first element is
//! always the oldest and the staleness check only looks at it. When the
//! oldest observation is more than [`BATCH_WINDOW`] old at the time of an
//! append, the buffered batch is handed to the [`Uploader`] and the new
//! observation opens the next window.
//!
//! Uploads are best-effort: the batch leaves the buffer before the upload
//! starts and is not retried if the upload fails.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tracer_types::Observation;

use crate::traits::{Clock, Uploader};

/// Age of the oldest observation that triggers an upload.
pub const BATCH_WINDOW: Duration = Duration::minutes(30);

/// Default bound on buffered observations before a forced flush.
pub const DEFAULT_MAX_BUFFERED: usize = 10_000;

/// Counters describing buffer activity since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferStats {
    /// Observations appended.
    pub appended: u64,
    /// Batches accepted by the uploader.
    pub uploads: u64,
    /// Batches the uploader rejected.
    pub failed_uploads: u64,
    /// Observations handed to the uploader, accepted or not.
    pub uploaded_observations: u64,
}

/// Append-only buffer of observations awaiting upload.
pub struct ObservationBuffer {
    observations: Mutex<Vec<Observation>>,
    uploader: Arc<dyn Uploader>,
    clock: Arc<dyn Clock>,
    max_len: usize,
    appended: AtomicU64,
    uploads: AtomicU64,
    failed_uploads: AtomicU64,
    uploaded_observations: AtomicU64,
}

impl std::fmt::Debug for ObservationBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationBuffer")
            .field("max_len", &self.max_len)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ObservationBuffer {
    /// Create a buffer with the default size bound.
    pub fn new(uploader: Arc<dyn Uploader>, clock: Arc<dyn Clock>) -> Self {
        Self::with_max_len(uploader, clock, DEFAULT_MAX_BUFFERED)
    }

    /// Create a buffer that flushes once it holds `max_len` observations.
    ///
    /// A `max_len` of zero is treated as one.
    pub fn with_max_len(uploader: Arc<dyn Uploader>, clock: Arc<dyn Clock>, max_len: usize) -> Self {
        Self {
            observations: Mutex::new(Vec::new()),
            uploader,
            clock,
            max_len: max_len.max(1),
            appended: AtomicU64::new(0),
            uploads: AtomicU64::new(0),
            failed_uploads: AtomicU64::new(0),
            uploaded_observations: AtomicU64::new(0),
        }
    }

    /// Record an observation of `label` at the current time.
    ///
    /// Uploads the buffered batch first if its oldest observation has aged
    /// past [`BATCH_WINDOW`], and flushes everything if the size bound is
    /// reached.
    pub async fn append(&self, label: impl Into<String>) {
        let label = label.into();
        let mut batches = Vec::new();
        {
            let mut observations = self.observations.lock().await;
            let mut now = self.clock.now();

            if let Some(oldest) = observations.first()
                && now - oldest.observed_at() > BATCH_WINDOW
            {
                debug!(
                    "Oldest observation is {} old, flushing {} observation(s)",
                    now - oldest.observed_at(),
                    observations.len()
                );
                batches.push(std::mem::take(&mut *observations));
            }

            // Keep the buffer time-ordered even if the clock steps back.
            if let Some(newest) = observations.last() {
                now = now.max(newest.observed_at());
            }

            debug!("Buffering observation '{}'", label);
            observations.push(Observation::new(label, now));
            self.appended.fetch_add(1, Ordering::Relaxed);

            if observations.len() >= self.max_len {
                warn!(
                    "Observation buffer reached {} entries, forcing a flush",
                    self.max_len
                );
                batches.push(std::mem::take(&mut *observations));
            }
        }

        for batch in batches {
            self.upload(batch).await;
        }
    }

    /// Upload and clear whatever is buffered. Returns the batch size.
    pub async fn flush(&self) -> usize {
        let batch = std::mem::take(&mut *self.observations.lock().await);
        let count = batch.len();
        if count > 0 {
            self.upload(batch).await;
        }
        count
    }

    async fn upload(&self, batch: Vec<Observation>) {
        let count = batch.len();
        self.uploaded_observations
            .fetch_add(count as u64, Ordering::Relaxed);

        match self.uploader.upload(&batch).await {
            Ok(()) => {
                self.uploads.fetch_add(1, Ordering::Relaxed);
                info!("Uploaded {} observation(s)", count);
            }
            Err(e) => {
                self.failed_uploads.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping {} observation(s) after failed upload: {}", count, e);
            }
        }
    }

    /// Number of buffered observations.
    pub async fn len(&self) -> usize {
        self.observations.lock().await.len()
    }

    /// Whether the buffer is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Timestamp of the oldest buffered observation.
    pub async fn oldest(&self) -> Option<OffsetDateTime> {
        self.observations
            .lock()
            .await
            .first()
            .map(Observation::observed_at)
    }

    /// Copy of the buffered observations, oldest first.
    pub async fn snapshot(&self) -> Vec<Observation> {
        self.observations.lock().await.clone()
    }

    /// Snapshot of the buffer counters.
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            appended: self.appended.load(Ordering::Relaxed),
            uploads: self.uploads.load(Ordering::Relaxed),
            failed_uploads: self.failed_uploads.load(Ordering::Relaxed),
            uploaded_observations: self.uploaded_observations.load(Ordering::Relaxed),
        }
    }
}
