//! Batched frame loading.
//!
//! Frames come from a paginated endpoint as base64 strings. A video is
//! loaded in fixed-size batches, strictly one request at a time. A batch
//! that fails is logged and its slots stay empty; there is no retry.
//!
//! [`FrameStore`] keeps finished buffers per user and video for a while so
//! the result page, the frame image endpoint and playback share one copy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::cache::TtlCache;
use crate::error::AppError;
use crate::metrics::AppMetrics;
use crate::services::backend::BackendClient;

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBatch {
    pub offset: usize,
    pub count: usize,
}

/// Split `[0, total)` into consecutive batches of at most `batch_size`.
pub fn plan_batches(total: usize, batch_size: usize) -> Vec<FrameBatch> {
    let batch_size = batch_size.max(1);
    (0..total)
        .step_by(batch_size)
        .map(|offset| FrameBatch {
            offset,
            count: batch_size.min(total - offset),
        })
        .collect()
}

/// Anything that can hand out a page of frames.
#[async_trait]
pub trait FrameSource {
    async fn fetch_frames(
        &self,
        video_id: i64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, AppError>;
}

#[async_trait]
impl FrameSource for BackendClient {
    async fn fetch_frames(
        &self,
        video_id: i64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, AppError> {
        self.video_frames(video_id, offset, count).await
    }
}

/// One slot per frame; `None` until the frame arrives (or forever, if its batch failed).
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    slots: Vec<Option<String>>,
}

impl FrameBuffer {
    pub fn new(total: usize) -> Self {
        Self {
            slots: vec![None; total],
        }
    }

    /// Place `frames` starting at `offset`, ignoring anything past the end.
    /// Returns how many slots were filled.
    pub fn fill(&mut self, offset: usize, frames: Vec<String>) -> usize {
        let mut filled = 0;
        for (slot, frame) in self.slots.iter_mut().skip(offset).zip(frames) {
            if !frame.is_empty() {
                *slot = Some(frame);
                filled += 1;
            }
        }
        filled
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.slots.get(index).and_then(|slot| slot.as_deref())
    }

    /// Raw image bytes for one frame.
    pub fn decode(&self, index: usize) -> Option<Vec<u8>> {
        self.get(index)
            .and_then(|encoded| STANDARD_LENIENT.decode(encoded).ok())
    }

    pub fn loaded(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn total(&self) -> usize {
        self.slots.len()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }
}

/// Outcome of a full load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub batches: usize,
    pub failed_batches: usize,
    /// The backend refused the caller's token; loading stopped there.
    pub rejected: bool,
}

/// Fetch every frame of a video, one batch in flight at a time.
///
/// `progress` is bumped as frames land so other tasks can watch. A 401 or
/// 403 ends the load early since every later batch would fail the same way.
pub async fn load_frames<S>(
    source: &S,
    video_id: i64,
    total: usize,
    batch_size: usize,
    progress: &AtomicUsize,
) -> (FrameBuffer, LoadReport)
where
    S: FrameSource + ?Sized,
{
    let mut buffer = FrameBuffer::new(total);
    let batches = plan_batches(total, batch_size);
    let mut failed_batches = 0;
    let mut rejected = false;

    for batch in &batches {
        match source.fetch_frames(video_id, batch.offset, batch.count).await {
            Ok(frames) => {
                let frames = frames.into_iter().take(batch.count).collect();
                let filled = buffer.fill(batch.offset, frames);
                progress.fetch_add(filled, Ordering::Relaxed);
            }
            Err(err) => {
                failed_batches += 1;
                tracing::error!(
                    video_id,
                    "Error loading frames {}-{}: {}",
                    batch.offset,
                    batch.offset + batch.count,
                    err
                );
                if err.is_auth_failure() {
                    rejected = true;
                    break;
                }
            }
        }
    }

    (
        buffer,
        LoadReport {
            batches: batches.len(),
            failed_batches,
            rejected,
        },
    )
}

/// Loaded frames belong to the user whose token fetched them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameKey {
    pub user_id: String,
    pub video_id: i64,
}

impl FrameKey {
    pub fn new(user_id: impl Into<String>, video_id: i64) -> Self {
        Self {
            user_id: user_id.into(),
            video_id,
        }
    }
}

struct Progress {
    loaded: Arc<AtomicUsize>,
    total: usize,
}

#[derive(Clone)]
enum Finished {
    Frames(Arc<FrameBuffer>),
    Rejected,
}

/// In-flight loads are kept apart from finished ones so the TTL only ever
/// applies to the latter; the loader task removes its own entry.
struct Entries {
    loading: HashMap<FrameKey, Progress>,
    finished: TtlCache<FrameKey, Finished>,
}

impl Entries {
    fn status(&self, key: &FrameKey) -> FrameStatus {
        if let Some(progress) = self.loading.get(key) {
            return FrameStatus::Loading {
                loaded: progress.loaded.load(Ordering::Relaxed),
                total: progress.total,
            };
        }
        match self.finished.get(key) {
            Some(Finished::Frames(buffer)) => FrameStatus::Ready {
                loaded: buffer.loaded(),
                total: buffer.total(),
            },
            Some(Finished::Rejected) => FrameStatus::Rejected,
            None => FrameStatus::Absent,
        }
    }
}

/// Snapshot of a video's frames, as reported to the progress page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FrameStatus {
    Absent,
    Loading { loaded: usize, total: usize },
    Ready { loaded: usize, total: usize },
    /// The backend turned the loader's token away.
    Rejected,
}

impl FrameStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, FrameStatus::Ready { .. })
    }
}

/// Frame buffers per user and video, shared across that user's requests.
pub struct FrameStore {
    entries: Mutex<Entries>,
    batch_size: usize,
    metrics: Option<Arc<AppMetrics>>,
}

impl FrameStore {
    pub fn new(ttl: Duration, batch_size: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                loading: HashMap::new(),
                finished: TtlCache::new(ttl),
            }),
            batch_size: batch_size.max(1),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn status(&self, key: &FrameKey) -> FrameStatus {
        self.entries.lock().await.status(key)
    }

    /// The finished buffer, if loading has completed and not yet expired.
    pub async fn buffer(&self, key: &FrameKey) -> Option<Arc<FrameBuffer>> {
        match self.entries.lock().await.finished.get(key) {
            Some(Finished::Frames(buffer)) => Some(buffer),
            _ => None,
        }
    }

    /// Drop a finished entry so the next visit loads afresh.
    pub async fn forget(&self, key: &FrameKey) {
        let mut entries = self.entries.lock().await;
        if entries.finished.remove(key).is_some() {
            self.update_gauge(&entries);
        }
    }

    /// Start loading the video for this user unless it is already loading,
    /// loaded or rejected. `source` must carry that user's credentials.
    pub async fn ensure_loaded<S>(
        self: &Arc<Self>,
        source: Arc<S>,
        key: FrameKey,
        total: usize,
    ) -> FrameStatus
    where
        S: FrameSource + Send + Sync + 'static,
    {
        let mut entries = self.entries.lock().await;
        if entries.finished.purge_expired() > 0 {
            self.update_gauge(&entries);
        }
        let status = entries.status(&key);
        if status != FrameStatus::Absent {
            return status;
        }

        let loaded = Arc::new(AtomicUsize::new(0));
        entries.loading.insert(
            key.clone(),
            Progress {
                loaded: loaded.clone(),
                total,
            },
        );
        drop(entries);

        let video_id = key.video_id;
        tracing::info!(video_id, total, batch = self.batch_size, "loading frames");

        let store = Arc::clone(self);
        tokio::spawn(async move {
            let (buffer, report) =
                load_frames(source.as_ref(), video_id, total, store.batch_size, &loaded).await;

            if let Some(metrics) = &store.metrics {
                metrics
                    .frame_batches_failed_total
                    .inc_by(report.failed_batches as f64);
            }
            let finished = if report.rejected {
                tracing::warn!(video_id, user_id = %key.user_id, "backend rejected frame loading");
                Finished::Rejected
            } else {
                tracing::info!(
                    video_id,
                    loaded = buffer.loaded(),
                    total,
                    failed_batches = report.failed_batches,
                    "frames loaded"
                );
                Finished::Frames(Arc::new(buffer))
            };

            let mut entries = store.entries.lock().await;
            entries.loading.remove(&key);
            entries.finished.insert(key, finished);
            store.update_gauge(&entries);
        });

        FrameStatus::Loading { loaded: 0, total }
    }

    fn update_gauge(&self, entries: &Entries) {
        if let Some(metrics) = &self.metrics {
            let cached: usize = entries
                .finished
                .fresh_values()
                .map(|finished| match finished {
                    Finished::Frames(buffer) => buffer.loaded(),
                    Finished::Rejected => 0,
                })
                .sum();
            metrics.frames_cached.set(cached as f64);
        }
    }
}
