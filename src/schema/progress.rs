//! Progress types for polling runs from other threads.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RunState {
    /// Working out the step budget.
    GatheringInfo = 0,
    /// Executing queued steps.
    Stepping = 1,
    /// Finished or aborted.
    Ended = 2,
}

impl RunState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::GatheringInfo,
            1 => Self::Stepping,
            _ => Self::Ended,
        }
    }
}

/// Snapshot of a run's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunProgress {
    /// Run label.
    pub label: String,
    /// Current state.
    pub state: RunState,
    /// Increments completed so far.
    pub completed_steps: i64,
    /// Estimated total increments, -1 while unknown.
    pub total_steps: i64,
    /// Completion in [0, 1].
    pub fraction: f32,
    /// Whether the run is still in progress.
    pub in_progress: bool,
    /// Whether the run finished successfully.
    pub success: bool,
    /// Human-readable status.
    pub status: String,
}
