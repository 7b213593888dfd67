//! Lease span helpers.
//!
//! One span covers a worker's whole run; each leased item gets a child span
//! carrying its content hash. State changes are recorded as events.

use crate::model::{SessionId, WorkerState};
use tracing::Span;

/// Start a span for a worker run.
///
/// Empty polls and retry pauses, with no item in hand, are recorded here.
pub fn start_worker_span(queue: &str, session: &SessionId) -> Span {
    tracing::info_span!(
        "lease.worker",
        "lease.queue" = queue,
        "lease.session" = %session,
        "lease.state" = tracing::field::Empty,
    )
}

/// Start a span for one leased item.
///
/// The `lease.state` field is declared empty and can be updated via
/// [`record_state_transition`].
pub fn start_item_span(queue: &str, item_hash: &str) -> Span {
    tracing::info_span!(
        "lease.item",
        "lease.queue" = queue,
        "lease.item_hash" = item_hash,
        "lease.state" = tracing::field::Empty,
    )
}

/// Record a state transition event on the given span.
pub fn record_state_transition(span: &Span, from: WorkerState, to: WorkerState) {
    debug_assert!(from.can_transition_to(to), "{from} -> {to}");
    span.record("lease.state", tracing::field::display(to));
    span.in_scope(|| {
        tracing::debug!(from = %from, to = %to, "state_transition");
    });
}
