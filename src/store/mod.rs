//! The seam between the lease protocol and the shared list store.
//!
//! Every method is one independently atomic store round-trip. Nothing here
//! spans two keys transactionally except `move_tail`, which the store
//! performs as a single indivisible relocation.
//!
//! Lists have a head (left) and a tail (right). Producers push onto the
//! head; `move_tail` pops the tail, so the oldest item is served first.

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// How `move_tail` behaves on an empty source list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Return `None` immediately.
    NonBlocking,
    /// Wait up to the given duration for an item to arrive.
    Blocking(Duration),
}

/// Result of a compare-and-delete on a marker key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerRelease {
    /// The key held the expected value and was deleted.
    Deleted,
    /// The key did not exist.
    Missing,
    /// The key holds another value and was left in place.
    HeldBy(String),
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Number of elements in a list (0 if absent).
    async fn length(&self, list: &str) -> Result<u64>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically pop the tail of `src` and push it onto the head of `dst`.
    async fn move_tail(&self, src: &str, dst: &str, wait: Wait) -> Result<Option<String>>;

    /// Set `key` to `value` with a server-side expiry.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remove up to `max` occurrences of `value`, scanning from the head.
    /// `max == 0` removes every occurrence. Returns the number removed.
    async fn remove_by_value(&self, list: &str, value: &str, max: usize) -> Result<u64>;

    /// Returns whether the key existed.
    async fn delete_key(&self, key: &str) -> Result<bool>;

    /// Push onto the head of a list. Returns the new length.
    async fn push_head(&self, list: &str, value: &str) -> Result<u64>;

    /// Push onto the tail of a list, i.e. next in line for `move_tail`.
    async fn push_tail(&self, list: &str, value: &str) -> Result<u64>;

    /// Snapshot of a list, head first.
    async fn range(&self, list: &str) -> Result<Vec<String>>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete `key` only if it currently holds `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<MarkerRelease>;
}
