//! Core data model.
//!
//! Work items are opaque strings; the queue never interprets them. What the
//! protocol does track is who leased what (sessions), where a worker is in
//! its cycle, and how full the lists are.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Random per-worker identity, written as the value of every lease marker
/// the worker creates. Lives as long as the worker; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

// ---------------------------------------------------------------------------
// Worker state
// ---------------------------------------------------------------------------

/// Where a worker is in its lease cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Between items.
    Idle,
    /// Relocating an item and stamping its marker.
    Leasing,
    /// A blocking lease waited out its poll timeout on an empty main list.
    /// Recorded once the wait ends; only blocking workers enter it.
    Blocked,
    /// Handler running on a leased item.
    Processing,
    /// Removing the item and its marker.
    Completing,
}

impl WorkerState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, to),
            (Idle, Leasing)
                | (Leasing, Processing)
                | (Leasing, Idle)       // non-blocking poll found nothing
                | (Leasing, Blocked)
                | (Blocked, Idle)
                | (Processing, Completing)
                | (Processing, Idle)    // handler failed, item left parked
                | (Completing, Idle)
        )
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Idle => "idle",
            WorkerState::Leasing => "leasing",
            WorkerState::Blocked => "blocked",
            WorkerState::Processing => "processing",
            WorkerState::Completing => "completing",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Outcome of an ownership-checked completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Release {
    /// This session held the marker and deleted it.
    Released,
    /// No marker existed; the lease had already lapsed.
    Expired,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Point-in-time list lengths for a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue: String,
    /// Items waiting in the main list.
    pub pending: u64,
    /// Items leased and not yet completed.
    pub processing: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing
    }

    /// Drained means nothing waiting and nothing in flight.
    pub fn is_drained(&self) -> bool {
        self.total() == 0
    }
}

/// What one reclaim pass found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Entries in the processing list at snapshot time.
    pub scanned: usize,
    /// Entries whose marker still exists.
    pub leased: usize,
    /// Unmarked entries seen for the first time; re-checked next pass.
    pub suspected: usize,
    /// Entries moved back to the main list.
    pub requeued: usize,
}
