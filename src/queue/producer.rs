//! Producer: pushes opaque work items onto a queue's main list.

use crate::error::Result;
use crate::keys::QueueKeys;
use crate::store::QueueStore;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::sync::Arc;

/// Stateless beyond its store handle and queue name.
#[derive(Clone)]
pub struct Producer {
    store: Arc<dyn QueueStore>,
    keys: QueueKeys,
}

impl Producer {
    pub fn new(store: Arc<dyn QueueStore>, queue_name: impl Into<String>) -> Self {
        Self {
            store,
            keys: QueueKeys::new(queue_name),
        }
    }

    pub fn queue_name(&self) -> &str {
        self.keys.main()
    }

    /// Append an item to the back of the queue. Returns the new main list
    /// length. Fire-and-forget: nothing tracks downstream consumption.
    pub async fn enqueue(&self, item: &str) -> Result<u64> {
        let len = self.store.push_head(self.keys.main(), item).await?;
        metrics::items_enqueued().add(1, &[KeyValue::new("queue", self.keys.main().to_string())]);
        tracing::debug!(queue = self.keys.main(), len, "enqueued");
        Ok(len)
    }

    /// Enqueue items in order. Returns the main list length after the last
    /// push, or the current length if `items` is empty.
    pub async fn enqueue_all<I, S>(&self, items: I) -> Result<u64>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut len = None;
        for item in items {
            len = Some(self.enqueue(item.as_ref()).await?);
        }
        match len {
            Some(len) => Ok(len),
            None => self.store.length(self.keys.main()).await,
        }
    }
}
