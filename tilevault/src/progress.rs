//! Progress tracking for bulk jobs.
//!
//! A [`ProgressTracker`] aggregates per-tile outcomes into atomic
//! counters and publishes every change over a `tokio::sync::watch`
//! channel. [`close`] freezes the counters; record calls arriving after
//! it are silently ignored, which is what makes cancellation race-safe
//! against in-flight workers.
//!
//! [`close`]: ProgressTracker::close

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use crate::scheduler::{JobId, JobState};

/// A point-in-time view of a job's progress.
///
/// `completed + failed ≤ total` always holds; counts never decrease
/// while the job runs and are frozen once `state` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// The job this snapshot describes.
    pub job_id: JobId,
    /// Fixed number of tiles in the job's scope.
    pub total: u64,
    /// Tiles resolved successfully (fetched and stored, cache hit, or
    /// deleted).
    pub completed: u64,
    /// Tiles that exhausted their retries or failed permanently.
    pub failed: u64,
    /// Job lifecycle state at snapshot time.
    pub state: JobState,
}

impl ProgressSnapshot {
    /// Tiles resolved one way or the other.
    pub fn resolved(&self) -> u64 {
        self.completed + self.failed
    }

    /// Returns true once the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Thread-safe per-job progress aggregator.
///
/// Counters are atomics; mutations additionally serialize on an internal
/// lock so published snapshots never move backwards from an observer's
/// point of view.
pub struct ProgressTracker {
    job_id: JobId,
    total: u64,
    completed: AtomicU64,
    failed: AtomicU64,
    closed: AtomicBool,
    state: Mutex<JobState>,
    tx: watch::Sender<ProgressSnapshot>,
}

impl ProgressTracker {
    /// Creates a tracker for a job of `total` tiles, starting in
    /// [`JobState::Pending`].
    pub fn new(job_id: JobId, total: u64) -> Self {
        let initial = ProgressSnapshot {
            job_id,
            total,
            completed: 0,
            failed: 0,
            state: JobState::Pending,
        };
        let (tx, _rx) = watch::channel(initial);
        Self {
            job_id,
            total,
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            state: Mutex::new(JobState::Pending),
            tx,
        }
    }

    /// The job this tracker belongs to.
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    /// Synchronous snapshot of the current progress.
    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.tx.borrow()
    }

    /// Records one successfully resolved tile. Ignored after close.
    pub fn record_success(&self) {
        let state = self.state.lock();
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.completed.fetch_add(1, Ordering::AcqRel);
        self.publish(*state);
    }

    /// Records one failed tile. Ignored after close.
    pub fn record_failure(&self) {
        let state = self.state.lock();
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.failed.fetch_add(1, Ordering::AcqRel);
        self.publish(*state);
    }

    /// Moves the job to a new (non-terminal) lifecycle state. Ignored
    /// after close.
    pub fn set_state(&self, next: JobState) {
        let mut state = self.state.lock();
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        *state = next;
        self.publish(next);
    }

    /// Freezes the tracker in a terminal state and publishes the final
    /// snapshot. Idempotent: only the first close takes effect, and once
    /// it returns no record call can alter the counts.
    pub fn close(&self, terminal: JobState) {
        debug_assert!(terminal.is_terminal());
        let mut state = self.state.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        *state = terminal;
        self.publish(terminal);
    }

    /// Returns true once the tracker has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Subscribes to the snapshot sequence.
    pub fn subscribe(&self) -> ProgressStream {
        ProgressStream {
            rx: self.tx.subscribe(),
            primed: false,
            done: false,
        }
    }

    /// Must be called with the state lock held; reads the counters after
    /// the mutation so a later publish can never carry smaller counts.
    fn publish(&self, state: JobState) {
        let snapshot = ProgressSnapshot {
            job_id: self.job_id,
            total: self.total,
            completed: self.completed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            state,
        };
        self.tx.send_replace(snapshot);
    }
}

/// A finite sequence of progress snapshots.
///
/// Yields the snapshot current at subscription time, then every
/// subsequent change, and ends after delivering a terminal snapshot.
/// Subscribing after the job finished yields the final snapshot exactly
/// once.
pub struct ProgressStream {
    rx: watch::Receiver<ProgressSnapshot>,
    primed: bool,
    done: bool,
}

impl ProgressStream {
    /// Waits for the next snapshot, or `None` once the sequence ended.
    pub async fn next(&mut self) -> Option<ProgressSnapshot> {
        if self.done {
            return None;
        }
        if !self.primed {
            self.primed = true;
            let snapshot = *self.rx.borrow_and_update();
            if snapshot.is_terminal() {
                self.done = true;
            }
            return Some(snapshot);
        }
        match self.rx.changed().await {
            Ok(()) => {
                let snapshot = *self.rx.borrow_and_update();
                if snapshot.is_terminal() {
                    self.done = true;
                }
                Some(snapshot)
            }
            Err(_) => {
                // Tracker dropped without a terminal state; end the stream.
                self.done = true;
                None
            }
        }
    }
}
