//! Download scheduler.
//!
//! Owns the bulk-job state machine and the bounded worker pool that
//! drains a job's tile set:
//!
//! ```text
//! start_download ──► ConfirmationGate ──► denied ──► Cancelled
//!                          │
//!                       approved
//!                          ▼
//!                  ┌──────────────┐    ┌────────────┐
//!                  │  tile queue  │◄───│ TileAddress│
//!                  └──────┬───────┘    └────────────┘
//!                         │ pop (W workers)
//!                         ▼
//!            cache hit? ──► record success
//!                         │ miss
//!                         ▼
//!            fetch ──► retry transient ──► put ──► record
//! ```
//!
//! At most one job runs per scheduler instance; a second request while
//! one is active is rejected with [`ScheduleError::JobInProgress`] so
//! interleaved writers can never corrupt the progress accounting.
//!
//! Cancellation is cooperative: the token stops dispatch of new tiles,
//! closing the tracker freezes the counts, and workers that are mid-fetch
//! finish naturally with their results discarded.

mod job;
mod policy;

pub use job::{JobId, JobState};
pub use policy::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY_SECS,
};

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{StoreError, TileStore};
use crate::confirm::{ApprovalRequest, ConfirmationGate, Decision};
use crate::coord::{tiles_for_region, BoundingBox, RegionError, TileId, ZoomRange};
use crate::progress::{ProgressSnapshot, ProgressStream, ProgressTracker};
use crate::provider::TileFetcher;

/// Default worker pool size.
pub const DEFAULT_WORKERS: usize = 4;

/// Configuration for the scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Number of concurrent download workers.
    pub workers: usize,
    /// Retry policy for transient fetch failures.
    pub retry: RetryPolicy,
    /// Zoom levels accepted for bulk operations.
    pub zoom_range: ZoomRange,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::default(),
            zoom_range: ZoomRange::default(),
        }
    }
}

/// Errors surfaced when a bulk operation cannot start.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Malformed bounding box or out-of-range zoom; no job was created.
    #[error(transparent)]
    InvalidRegion(#[from] RegionError),

    /// Another bulk job is active; no job was created.
    #[error("another bulk job is already in progress")]
    JobInProgress,

    /// The store failed while the job was being prepared.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a removal job should delete.
#[derive(Debug, Clone)]
pub enum RemovalScope {
    /// Every cached tile.
    All,
    /// The tiles covering a region, at the given zoom levels.
    Region {
        /// Region to clear.
        bbox: BoundingBox,
        /// Zoom levels to clear.
        zooms: BTreeSet<u8>,
    },
}

/// Handle to a bulk job.
///
/// Cheap to clone; observation only. Cancellation goes through
/// [`DownloadScheduler::cancel`].
#[derive(Clone)]
pub struct JobHandle {
    tracker: Arc<ProgressTracker>,
    cancel: CancellationToken,
}

impl JobHandle {
    /// The job's identifier.
    pub fn id(&self) -> JobId {
        self.tracker.job_id()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        self.tracker.state()
    }

    /// Synchronous snapshot of the job's progress.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.tracker.snapshot()
    }

    /// Subscribes to the job's progress sequence.
    ///
    /// The sequence is finite and ends at a terminal snapshot; a
    /// subscription taken after the job finished yields the final
    /// snapshot once.
    pub fn subscribe(&self) -> ProgressStream {
        self.tracker.subscribe()
    }

    /// Waits until the job reaches a terminal state and returns the
    /// final snapshot.
    pub async fn wait(&self) -> ProgressSnapshot {
        let mut stream = self.subscribe();
        while let Some(snapshot) = stream.next().await {
            if snapshot.is_terminal() {
                return snapshot;
            }
        }
        self.snapshot()
    }
}

/// Shared context for one job's workers.
#[derive(Clone)]
struct WorkerContext {
    store: Arc<dyn TileStore>,
    fetcher: Arc<dyn TileFetcher>,
    retry: RetryPolicy,
    tracker: Arc<ProgressTracker>,
    cancel: CancellationToken,
    fatal: Arc<AtomicBool>,
}

/// Orchestrates bulk downloads and removals against one tile store.
pub struct DownloadScheduler {
    store: Arc<dyn TileStore>,
    fetcher: Arc<dyn TileFetcher>,
    gate: Arc<dyn ConfirmationGate>,
    config: SchedulerConfig,
    active: Arc<Mutex<Option<JobId>>>,
    next_job_id: AtomicU64,
}

impl DownloadScheduler {
    /// Creates a scheduler.
    pub fn new(
        store: Arc<dyn TileStore>,
        fetcher: Arc<dyn TileFetcher>,
        gate: Arc<dyn ConfirmationGate>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            gate,
            config,
            active: Arc::new(Mutex::new(None)),
            next_job_id: AtomicU64::new(1),
        }
    }

    /// Starts a confirmed download of every tile covering `bbox` at the
    /// requested zoom levels.
    ///
    /// The confirmation gate is consulted synchronously before any
    /// worker starts; a denied request produces a handle already in
    /// [`JobState::Cancelled`] with the cache untouched.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::InvalidRegion`] for a malformed region and
    /// [`ScheduleError::JobInProgress`] while another job is active; in
    /// both cases no job is created.
    pub fn start_download(
        &self,
        bbox: &BoundingBox,
        zooms: &BTreeSet<u8>,
    ) -> Result<JobHandle, ScheduleError> {
        let tiles = tiles_for_region(bbox, zooms, self.config.zoom_range)?;

        let job_id = self.claim_slot()?;
        let tracker = Arc::new(ProgressTracker::new(job_id, tiles.len() as u64));
        let cancel = CancellationToken::new();
        let handle = JobHandle {
            tracker: Arc::clone(&tracker),
            cancel: cancel.clone(),
        };

        info!(job = %job_id, tiles = tiles.len(), "Download job awaiting confirmation");
        tracker.set_state(JobState::Confirming);
        let request = ApprovalRequest::Save {
            tiles: tiles.len() as u64,
        };
        if self.gate.request_approval(&request) == Decision::Denied {
            info!(job = %job_id, "Download denied at the gate");
            tracker.close(JobState::Cancelled);
            self.release_slot(job_id);
            return Ok(handle);
        }

        tracker.set_state(JobState::Running);
        let context = WorkerContext {
            store: Arc::clone(&self.store),
            fetcher: Arc::clone(&self.fetcher),
            retry: self.config.retry.clone(),
            tracker,
            cancel,
            fatal: Arc::new(AtomicBool::new(false)),
        };
        let queue: Arc<Mutex<VecDeque<TileId>>> =
            Arc::new(Mutex::new(tiles.into_iter().collect()));
        let workers = self.config.workers.max(1);
        let active = Arc::clone(&self.active);

        tokio::spawn(async move {
            let pool: Vec<_> = (0..workers)
                .map(|worker| {
                    let context = context.clone();
                    let queue = Arc::clone(&queue);
                    tokio::spawn(async move { worker_loop(worker, context, queue).await })
                })
                .collect();
            join_all(pool).await;
            finalize(&context, &active, job_id);
        });

        Ok(handle)
    }

    /// Starts a confirmed bulk removal.
    ///
    /// Removal performs synchronous local deletes, so `Running` is
    /// typically near-instantaneous and reports 1:1 progress per key.
    ///
    /// # Errors
    ///
    /// As [`start_download`](Self::start_download), plus
    /// [`ScheduleError::Store`] when the store cannot enumerate its
    /// contents.
    pub async fn start_removal(&self, scope: RemovalScope) -> Result<JobHandle, ScheduleError> {
        // Validate the region before claiming the slot.
        let region_keys = match &scope {
            RemovalScope::All => None,
            RemovalScope::Region { bbox, zooms } => {
                Some(tiles_for_region(bbox, zooms, self.config.zoom_range)?)
            }
        };

        let job_id = self.claim_slot()?;
        let prepared = self.prepare_removal(region_keys).await;
        let (keys, bytes) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                self.release_slot(job_id);
                return Err(err);
            }
        };

        let tracker = Arc::new(ProgressTracker::new(job_id, keys.len() as u64));
        let cancel = CancellationToken::new();
        let handle = JobHandle {
            tracker: Arc::clone(&tracker),
            cancel: cancel.clone(),
        };

        info!(job = %job_id, entries = keys.len(), bytes, "Removal job awaiting confirmation");
        tracker.set_state(JobState::Confirming);
        let request = ApprovalRequest::Remove {
            entries: keys.len() as u64,
            bytes,
        };
        if self.gate.request_approval(&request) == Decision::Denied {
            info!(job = %job_id, "Removal denied at the gate");
            tracker.close(JobState::Cancelled);
            self.release_slot(job_id);
            return Ok(handle);
        }

        tracker.set_state(JobState::Running);
        let context = WorkerContext {
            store: Arc::clone(&self.store),
            fetcher: Arc::clone(&self.fetcher),
            retry: RetryPolicy::None,
            tracker,
            cancel,
            fatal: Arc::new(AtomicBool::new(false)),
        };
        let active = Arc::clone(&self.active);

        tokio::spawn(async move {
            for key in keys {
                if context.cancel.is_cancelled() {
                    break;
                }
                match context.store.delete(key).await {
                    Ok(existed) => {
                        debug!(tile = %key, existed, "Removed tile");
                        context.tracker.record_success();
                    }
                    Err(err) if err.is_fatal() => {
                        report_fatal(&context, key, &err);
                        break;
                    }
                    Err(err) => {
                        warn!(tile = %key, error = %err, "Failed to remove tile");
                        context.tracker.record_failure();
                    }
                }
            }
            finalize(&context, &active, job_id);
        });

        Ok(handle)
    }

    /// Requests cancellation of a job.
    ///
    /// Idempotent and non-blocking: dispatch of new tiles stops, the
    /// progress counts are frozen before this call returns, and workers
    /// mid-fetch finish naturally with their results discarded.
    pub fn cancel(&self, handle: &JobHandle) {
        if handle.tracker.is_closed() {
            return;
        }
        info!(job = %handle.id(), "Cancellation requested");
        handle.cancel.cancel();
        handle.tracker.close(JobState::Cancelled);
    }

    /// Resolves removal keys and their byte total.
    async fn prepare_removal(
        &self,
        region_keys: Option<BTreeSet<TileId>>,
    ) -> Result<(Vec<TileId>, u64), ScheduleError> {
        match region_keys {
            None => {
                let keys = self.store.keys().await?;
                Ok((keys, self.store.size_bytes()))
            }
            Some(ids) => {
                let mut bytes = 0u64;
                let mut keys = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(size) = self.store.size_of(id).await? {
                        bytes += size;
                    }
                    keys.push(id);
                }
                Ok((keys, bytes))
            }
        }
    }

    fn claim_slot(&self) -> Result<JobId, ScheduleError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(ScheduleError::JobInProgress);
        }
        let job_id = JobId::new(self.next_job_id.fetch_add(1, Ordering::Relaxed));
        *active = Some(job_id);
        Ok(job_id)
    }

    fn release_slot(&self, job_id: JobId) {
        release(&self.active, job_id);
    }
}

fn release(active: &Mutex<Option<JobId>>, job_id: JobId) {
    let mut slot = active.lock();
    if *slot == Some(job_id) {
        *slot = None;
    }
}

/// Closes the tracker in the right terminal state and frees the slot.
fn finalize(context: &WorkerContext, active: &Mutex<Option<JobId>>, job_id: JobId) {
    let terminal = if context.fatal.load(Ordering::Acquire) {
        JobState::Failed
    } else if context.cancel.is_cancelled() {
        JobState::Cancelled
    } else {
        JobState::Completed
    };
    context.tracker.close(terminal);

    let snapshot = context.tracker.snapshot();
    info!(
        job = %job_id,
        state = %snapshot.state,
        completed = snapshot.completed,
        failed = snapshot.failed,
        total = snapshot.total,
        "Job finished"
    );
    release(active, job_id);
}

/// One worker: pops tiles until the queue drains or the job is
/// cancelled.
async fn worker_loop(
    worker: usize,
    context: WorkerContext,
    queue: Arc<Mutex<VecDeque<TileId>>>,
) {
    loop {
        if context.cancel.is_cancelled() {
            debug!(worker, "Worker stopping on cancellation");
            return;
        }
        let next = queue.lock().pop_front();
        let Some(id) = next else {
            debug!(worker, "Worker drained the queue");
            return;
        };
        process_tile(&context, id).await;
    }
}

/// Resolves one tile: cache-first, then fetch with bounded retries.
async fn process_tile(context: &WorkerContext, id: TileId) {
    match context.store.get(id).await {
        Ok(Some(_)) => {
            debug!(tile = %id, "Cache hit, no fetch needed");
            context.tracker.record_success();
            return;
        }
        Ok(None) => {}
        Err(err) if err.is_fatal() => {
            report_fatal(context, id, &err);
            return;
        }
        Err(err) => {
            // Unreadable entry: treat as a miss and refetch.
            debug!(tile = %id, error = %err, "Ignoring unreadable cache entry");
        }
    }

    let mut attempt = 1u32;
    loop {
        if context.cancel.is_cancelled() {
            return;
        }
        match context.fetcher.fetch(id).await {
            Ok(bytes) => {
                if context.cancel.is_cancelled() {
                    // The job closed while this fetch was in flight;
                    // discard the result, neither written nor counted.
                    return;
                }
                match context.store.put(id, bytes).await {
                    Ok(()) => {
                        debug!(tile = %id, "Tile stored");
                        context.tracker.record_success();
                    }
                    Err(err) if err.is_fatal() => report_fatal(context, id, &err),
                    Err(err) => {
                        warn!(tile = %id, error = %err, "Tile fetched but not stored");
                        context.tracker.record_failure();
                    }
                }
                return;
            }
            Err(err) if err.is_transient() => match context.retry.delay_for_attempt(attempt) {
                Some(delay) => {
                    debug!(
                        tile = %id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    warn!(tile = %id, attempts = attempt, error = %err, "Retries exhausted");
                    context.tracker.record_failure();
                    return;
                }
            },
            Err(err) => {
                debug!(tile = %id, error = %err, "Permanent failure, not retried");
                context.tracker.record_failure();
                return;
            }
        }
    }
}

fn report_fatal(context: &WorkerContext, id: TileId, err: &StoreError) {
    warn!(tile = %id, error = %err, "Cache store unusable, failing job");
    context.fatal.store(true, Ordering::Release);
    context.cancel.cancel();
}
