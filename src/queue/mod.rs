//! The lease protocol: producers push, workers lease and complete, and an
//! operator-run reclaimer repairs orphans.

pub mod producer;
pub mod reclaim;
pub mod runner;
pub mod worker;

pub use producer::Producer;
pub use reclaim::Reclaimer;
pub use runner::{ExitPolicy, Handler, RunSummary};
pub use worker::Worker;
