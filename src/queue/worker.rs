//! Worker: leases items one at a time and acknowledges completion.
//!
//! Leasing is two store calls: an atomic relocation from the main list to
//! the processing list, then a marker write with a TTL. A crash between
//! them leaves the item parked in processing with no marker; see
//! `Reclaimer` for the operator-side repair.

use crate::config::LeaseOptions;
use crate::error::{Error, Result};
use crate::keys::{QueueKeys, item_hash};
use crate::model::{QueueStats, Release, SessionId};
use crate::store::{MarkerRelease, QueueStore, Wait};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::sync::Arc;

pub struct Worker {
    pub(super) store: Arc<dyn QueueStore>,
    pub(super) keys: QueueKeys,
    pub(super) session: SessionId,
    pub(super) options: LeaseOptions,
}

impl Worker {
    /// Bind a worker to a queue with a fresh session and default options.
    pub fn new(store: Arc<dyn QueueStore>, queue_name: impl Into<String>) -> Self {
        Self {
            store,
            keys: QueueKeys::new(queue_name),
            session: SessionId::new(),
            options: LeaseOptions::default(),
        }
    }

    /// Replace the leasing options used by [`Worker::lease`].
    pub fn with_options(mut self, options: LeaseOptions) -> Result<Self> {
        options.validate()?;
        self.options = options;
        Ok(self)
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    pub fn options(&self) -> &LeaseOptions {
        &self.options
    }

    pub fn lease_key(&self, item: &str) -> String {
        self.keys.lease_key(item)
    }

    /// True only when both the main and the processing list are empty.
    ///
    /// Items in flight keep the queue non-empty, so a worker draining the
    /// queue does not exit while another worker's item is unaccounted for.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.stats().await?.is_drained())
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let (pending, processing) = tokio::try_join!(
            self.store.length(self.keys.main()),
            self.store.length(self.keys.processing()),
        )?;
        Ok(QueueStats {
            queue: self.keys.main().to_string(),
            pending,
            processing,
        })
    }

    /// Lease the next item with this worker's configured options.
    pub async fn lease(&self) -> Result<Option<String>> {
        self.lease_with(&self.options).await
    }

    /// Lease the next item: relocate it into processing, then stamp its
    /// marker with this session and `lease_duration`.
    ///
    /// Returns `None` when the main list stayed empty for `poll_timeout`
    /// (blocking) or was empty right now (non-blocking). Callers re-poll.
    pub async fn lease_with(&self, options: &LeaseOptions) -> Result<Option<String>> {
        options.validate()?;
        let wait = if options.blocking {
            Wait::Blocking(options.poll_timeout)
        } else {
            Wait::NonBlocking
        };

        let queue = KeyValue::new("queue", self.keys.main().to_string());
        let Some(item) = self
            .store
            .move_tail(self.keys.main(), self.keys.processing(), wait)
            .await?
        else {
            metrics::lease_attempts().add(1, &[queue, KeyValue::new("result", "empty")]);
            return Ok(None);
        };

        let session = self.session.to_string();
        self.store
            .set_with_expiry(&self.keys.lease_key(&item), &session, options.lease_duration)
            .await?;

        metrics::lease_attempts().add(1, &[queue, KeyValue::new("result", "leased")]);
        tracing::debug!(
            queue = self.keys.main(),
            session = %self.session,
            item_hash = %item_hash(&item),
            ttl_ms = options.lease_duration.as_millis() as u64,
            "leased"
        );
        Ok(Some(item))
    }

    /// Mark an item done: drop every copy from processing and delete its
    /// marker. Any worker may complete any item.
    ///
    /// Removing all copies tolerates duplicate payloads sharing one marker,
    /// at the cost of also removing a distinct in-flight item with the same
    /// bytes.
    pub async fn complete(&self, item: &str) -> Result<()> {
        self.store
            .remove_by_value(self.keys.processing(), item, 0)
            .await?;
        self.store.delete_key(&self.keys.lease_key(item)).await?;

        metrics::completions().add(
            1,
            &[
                KeyValue::new("queue", self.keys.main().to_string()),
                KeyValue::new("result", "completed"),
            ],
        );
        tracing::debug!(queue = self.keys.main(), item_hash = %item_hash(item), "completed");
        Ok(())
    }

    /// Complete only if this session still holds the item's marker.
    ///
    /// If another session holds it, nothing is removed and
    /// [`Error::LeaseNotOwned`] is returned. If no marker exists the lease
    /// lapsed; the item is still removed because this worker did the work.
    pub async fn complete_owned(&self, item: &str) -> Result<Release> {
        let key = self.keys.lease_key(item);
        let queue = KeyValue::new("queue", self.keys.main().to_string());

        let release = match self
            .store
            .delete_if_equals(&key, &self.session.to_string())
            .await?
        {
            MarkerRelease::Deleted => Release::Released,
            MarkerRelease::Missing => Release::Expired,
            MarkerRelease::HeldBy(owner) => {
                metrics::completions().add(1, &[queue, KeyValue::new("result", "foreign")]);
                tracing::warn!(
                    queue = self.keys.main(),
                    session = %self.session,
                    owner = %owner,
                    "refusing to complete item leased by another session"
                );
                return Err(Error::LeaseNotOwned { key, owner });
            }
        };

        self.store
            .remove_by_value(self.keys.processing(), item, 0)
            .await?;

        let result = match release {
            Release::Released => "released",
            Release::Expired => "expired",
        };
        metrics::completions().add(1, &[queue, KeyValue::new("result", result)]);
        if release == Release::Expired {
            tracing::warn!(
                queue = self.keys.main(),
                item_hash = %item_hash(item),
                "lease lapsed before completion"
            );
        }
        Ok(release)
    }

    /// Whether any session currently holds a marker for this payload.
    pub async fn is_leased(&self, item: &str) -> Result<bool> {
        self.store.exists(&self.keys.lease_key(item)).await
    }

    /// Session id stored in this payload's marker, if any.
    pub async fn lease_owner(&self, item: &str) -> Result<Option<String>> {
        self.store.get(&self.keys.lease_key(item)).await
    }
}
