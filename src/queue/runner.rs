//! Consume loop: lease, handle, complete, repeat.
//!
//! Liveness is driven by a `CancellationToken` the caller owns. The token is
//! only checked between iterations: a lease or handler in flight is never
//! dropped half-way, so cancelling cannot strand an item without a marker.
//! The one exception is the retry pause after an empty non-blocking poll,
//! where no item is held.

use super::worker::Worker;
use crate::error::Result;
use crate::keys::item_hash;
use crate::model::WorkerState;
use crate::telemetry::lease::{record_state_transition, start_item_span, start_worker_span};
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, warn};

/// Processes one leased item.
///
/// Returning an error leaves the item parked in the processing list; its
/// marker lapses after the lease duration.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, item: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, item: &str) -> anyhow::Result<()> {
        (self)(item.to_string()).await
    }
}

/// When the loop stops on its own, besides cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Run until the token is cancelled.
    UntilCancelled,
    /// Stop once both the main and the processing list are empty.
    WhenDrained,
    /// Stop after this many items were leased.
    AfterItems(u64),
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub leased: u64,
    pub completed: u64,
    pub failed: u64,
    /// Lease attempts that returned no item.
    pub empty_polls: u64,
}

impl Worker {
    /// Drive the lease cycle until `exit` is satisfied or `shutdown` fires.
    ///
    /// Store errors end the run and are returned; handler errors are logged
    /// and counted.
    pub async fn run<H>(
        &self,
        handler: &H,
        shutdown: &CancellationToken,
        exit: ExitPolicy,
    ) -> Result<RunSummary>
    where
        H: Handler + ?Sized,
    {
        let span = start_worker_span(self.keys.main(), &self.session);
        self.run_loop(handler, shutdown, exit, &span)
            .instrument(span.clone())
            .await
    }

    async fn run_loop<H>(
        &self,
        handler: &H,
        shutdown: &CancellationToken,
        exit: ExitPolicy,
        span: &tracing::Span,
    ) -> Result<RunSummary>
    where
        H: Handler + ?Sized,
    {
        let mut summary = RunSummary::default();
        info!(?exit, "worker started");

        loop {
            if shutdown.is_cancelled() {
                info!("shutdown requested");
                break;
            }
            let done = match exit {
                ExitPolicy::UntilCancelled => false,
                ExitPolicy::WhenDrained => self.is_empty().await?,
                ExitPolicy::AfterItems(n) => summary.leased >= n,
            };
            if done {
                info!("exit condition reached");
                break;
            }

            record_state_transition(span, WorkerState::Idle, WorkerState::Leasing);
            let item = match self.lease().await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    summary.empty_polls += 1;
                    if self.options.blocking {
                        // The lease itself waited out the poll timeout.
                        record_state_transition(span, WorkerState::Leasing, WorkerState::Blocked);
                        record_state_transition(span, WorkerState::Blocked, WorkerState::Idle);
                        continue;
                    }
                    record_state_transition(span, WorkerState::Leasing, WorkerState::Idle);
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(self.options.poll_timeout) => {}
                    }
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "lease failed, stopping worker");
                    return Err(e);
                }
            };
            summary.leased += 1;

            let item_span = start_item_span(self.keys.main(), &item_hash(&item));
            record_state_transition(&item_span, WorkerState::Leasing, WorkerState::Processing);

            match handler.handle(&item).instrument(item_span.clone()).await {
                Ok(()) => {
                    record_state_transition(
                        &item_span,
                        WorkerState::Processing,
                        WorkerState::Completing,
                    );
                    if let Err(e) = self.complete(&item).instrument(item_span.clone()).await {
                        error!(error = %e, "complete failed, stopping worker");
                        return Err(e);
                    }
                    record_state_transition(&item_span, WorkerState::Completing, WorkerState::Idle);
                    summary.completed += 1;
                }
                Err(e) => {
                    record_state_transition(&item_span, WorkerState::Processing, WorkerState::Idle);
                    metrics::handler_failures()
                        .add(1, &[KeyValue::new("queue", self.keys.main().to_string())]);
                    item_span.in_scope(|| {
                        warn!(error = %e, "handler failed, leaving item parked until its lease lapses");
                    });
                    summary.failed += 1;
                }
            }
        }

        info!(
            leased = summary.leased,
            completed = summary.completed,
            failed = summary.failed,
            "worker stopped"
        );
        Ok(summary)
    }
}
