//! # leaseq
//!
//! Reliable, at-least-once work queue over a shared Redis list store.
//!
//! Producers push opaque string items. Workers lease one item at a time by
//! atomically relocating it into a processing list and stamping a
//! time-boxed ownership marker, then complete it by removing both.

pub mod config;
pub mod error;
pub mod keys;
pub mod model;
pub mod queue;
pub mod store;
pub mod telemetry;
