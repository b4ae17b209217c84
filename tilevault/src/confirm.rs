//! Confirmation gate for bulk cache mutations.
//!
//! Bulk downloads and bulk removals can consume significant bandwidth
//! and storage, so both pass through a synchronous approval checkpoint
//! before any cache mutation. The gate replaces the browser-native
//! confirm dialog of interactive map clients with a trait a host can
//! implement and a test harness can script.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

/// What the operator is being asked to approve, with enough context to
/// make the decision informed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalRequest {
    /// Download and persist `tiles` map tiles.
    Save {
        /// Number of tiles in the job's scope.
        tiles: u64,
    },
    /// Delete `entries` cached tiles totalling `bytes`.
    Remove {
        /// Number of entries to delete.
        entries: u64,
        /// Total payload bytes to delete.
        bytes: u64,
    },
}

impl fmt::Display for ApprovalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Save { tiles } => write!(f, "save {} tiles for offline use", tiles),
            Self::Remove { entries, bytes } => {
                write!(f, "remove {} cached tiles ({} bytes)", entries, bytes)
            }
        }
    }
}

/// Outcome of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Proceed with the bulk mutation.
    Approved,
    /// Abort with no side effects.
    Denied,
}

/// Synchronous approval checkpoint.
///
/// The gate holds no state between invocations; each call is a one-shot
/// query. The scheduler will not mutate the cache until `Approved` is
/// returned.
pub trait ConfirmationGate: Send + Sync {
    /// Asks for approval of one bulk operation.
    fn request_approval(&self, request: &ApprovalRequest) -> Decision;
}

/// Gate that approves everything. For non-interactive hosts that confirm
/// elsewhere (e.g. a `--yes` flag).
pub struct AutoApprove;

impl ConfirmationGate for AutoApprove {
    fn request_approval(&self, _request: &ApprovalRequest) -> Decision {
        Decision::Approved
    }
}

/// Gate that denies everything.
pub struct AutoDeny;

impl ConfirmationGate for AutoDeny {
    fn request_approval(&self, _request: &ApprovalRequest) -> Decision {
        Decision::Denied
    }
}

/// Gate that replays a scripted sequence of decisions, then falls back
/// to a default. Lets test harnesses drive approve/deny paths
/// deterministically.
pub struct ScriptedGate {
    script: Mutex<VecDeque<Decision>>,
    fallback: Decision,
}

impl ScriptedGate {
    /// Creates a gate that replays `decisions` in order, answering
    /// `fallback` once the script runs out.
    pub fn new(decisions: impl IntoIterator<Item = Decision>, fallback: Decision) -> Self {
        Self {
            script: Mutex::new(decisions.into_iter().collect()),
            fallback,
        }
    }
}

impl ConfirmationGate for ScriptedGate {
    fn request_approval(&self, _request: &ApprovalRequest) -> Decision {
        self.script.lock().pop_front().unwrap_or(self.fallback)
    }
}
