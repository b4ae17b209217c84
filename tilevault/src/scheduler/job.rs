//! Job identity and lifecycle states.

use std::fmt;

use serde::Serialize;

/// Opaque identifier for one bulk job (download or removal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct JobId(u64);

impl JobId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Lifecycle of a bulk job.
///
/// ```text
/// Pending ──► Confirming ──► Running ──► Completed
///                  │             ├─────► Cancelled
///                  └── denied ───┤
///                                └─────► Failed
/// ```
///
/// Terminal states are sticky: once a job leaves `Running` no further
/// tile writes or progress increments are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Job object constructed, gate not yet consulted.
    Pending,
    /// Waiting on the confirmation gate.
    Confirming,
    /// Workers are draining the tile set.
    Running,
    /// Every tile resolved (success or exhausted failure).
    Completed,
    /// Denied at the gate, or cancelled while running.
    Cancelled,
    /// Catastrophic condition; the job could make no further progress.
    Failed,
}

impl JobState {
    /// Returns true for `Completed`, `Cancelled` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Confirming => "confirming",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_display() {
        assert_eq!(JobId::new(7).to_string(), "job-7");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Confirming.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(JobState::Running.to_string(), "running");
        assert_eq!(JobState::Cancelled.to_string(), "cancelled");
    }
}
