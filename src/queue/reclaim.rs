//! Operator-invoked repair for processing entries that lost their marker.
//!
//! An entry is orphaned when it sits in the processing list but no lease
//! marker exists for its payload: the worker crashed between relocation and
//! marker write, or it died mid-processing and the lease lapsed. Nothing in
//! the worker path calls this; an operator runs passes explicitly.
//!
//! An entry is re-queued only after two consecutive passes found it
//! unmarked, so an item caught between a worker's relocation and its marker
//! write is not mistaken for an orphan. Space passes further apart than a
//! lease round-trip.

use crate::error::Result;
use crate::keys::QueueKeys;
use crate::model::SweepReport;
use crate::store::QueueStore;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Reclaimer {
    store: Arc<dyn QueueStore>,
    keys: QueueKeys,
    /// Payloads found unmarked by the previous pass.
    suspects: HashSet<String>,
}

impl Reclaimer {
    pub fn new(store: Arc<dyn QueueStore>, queue_name: impl Into<String>) -> Self {
        Self {
            store,
            keys: QueueKeys::new(queue_name),
            suspects: HashSet::new(),
        }
    }

    /// Payloads that will be re-queued if still unmarked on the next pass.
    pub fn suspects(&self) -> &HashSet<String> {
        &self.suspects
    }

    /// Run one pass over the processing list.
    pub async fn sweep(&mut self) -> Result<SweepReport> {
        let entries = self.store.range(self.keys.processing()).await?;
        let mut report = SweepReport {
            scanned: entries.len(),
            ..Default::default()
        };

        // Group duplicates but keep snapshot order, head (newest) to tail
        // (oldest). Re-queueing in that order puts the oldest orphan at the
        // main list's tail, so it is served first.
        let mut grouped: Vec<(String, usize)> = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();
        for entry in entries {
            match position.get(&entry) {
                Some(&idx) => grouped[idx].1 += 1,
                None => {
                    position.insert(entry.clone(), grouped.len());
                    grouped.push((entry, 1));
                }
            }
        }

        let mut next_suspects = HashSet::new();
        for (entry, count) in grouped {
            if self.store.exists(&self.keys.lease_key(&entry)).await? {
                report.leased += count;
                continue;
            }
            if !self.suspects.contains(&entry) {
                report.suspected += count;
                next_suspects.insert(entry);
                continue;
            }
            report.requeued += self.requeue(&entry, count).await?;
        }

        self.suspects = next_suspects;

        if report.requeued > 0 {
            metrics::items_reclaimed().add(
                report.requeued as u64,
                &[KeyValue::new("queue", self.keys.main().to_string())],
            );
        }
        info!(
            queue = self.keys.main(),
            scanned = report.scanned,
            leased = report.leased,
            suspected = report.suspected,
            requeued = report.requeued,
            "reclaim pass finished"
        );
        Ok(report)
    }

    /// Move `count` copies of an orphan back to the front of service.
    ///
    /// Pushes before removing: a crash in between leaves a duplicate, never
    /// a loss.
    async fn requeue(&self, entry: &str, count: usize) -> Result<usize> {
        let mut moved = 0;
        for _ in 0..count {
            self.store.push_tail(self.keys.main(), entry).await?;
            let removed = self
                .store
                .remove_by_value(self.keys.processing(), entry, 1)
                .await?;
            moved += 1;
            if removed == 0 {
                warn!(
                    queue = self.keys.main(),
                    "orphan left processing during reclaim; re-queued copy may be a duplicate"
                );
                break;
            }
        }
        Ok(moved)
    }
}
