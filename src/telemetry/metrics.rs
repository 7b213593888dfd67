//! Metric instrument factories for leaseq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"leaseq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for leaseq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("leaseq")
}

/// Counter: items pushed onto a main list.
/// Labels: `queue`.
pub fn items_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("leaseq.items.enqueued")
        .with_description("Number of work items enqueued")
        .build()
}

/// Counter: lease attempts.
/// Labels: `queue`, `result` ("leased" | "empty").
pub fn lease_attempts() -> Counter<u64> {
    meter()
        .u64_counter("leaseq.lease.attempts")
        .with_description("Number of lease attempts")
        .build()
}

/// Counter: completions.
/// Labels: `queue`, `result` ("completed" | "released" | "expired" | "foreign").
pub fn completions() -> Counter<u64> {
    meter()
        .u64_counter("leaseq.lease.completions")
        .with_description("Number of completed work items")
        .build()
}

/// Counter: handler failures that left an item parked in processing.
/// Labels: `queue`.
pub fn handler_failures() -> Counter<u64> {
    meter()
        .u64_counter("leaseq.handler.failures")
        .with_description("Work items whose handler returned an error")
        .build()
}

/// Counter: orphaned processing entries moved back to the main list.
/// Labels: `queue`.
pub fn items_reclaimed() -> Counter<u64> {
    meter()
        .u64_counter("leaseq.items.reclaimed")
        .with_description("Orphaned work items re-queued by the reclaimer")
        .build()
}

/// Histogram: store round-trip duration in milliseconds.
/// Labels: `store`, `operation`.
pub fn store_operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("leaseq.store.duration_ms")
        .with_description("Store operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
