//! In-process queue store with the same list and expiry semantics as Redis.
//!
//! Used by tests and local runs without a server. Expiry follows tokio's
//! clock, so tests can pause and advance time. `disconnect` makes every
//! subsequent call fail with a connection error.

use crate::error::{Error, Result};
use crate::store::{MarkerRelease, QueueStore, Wait};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Default)]
struct State {
    lists: HashMap<String, VecDeque<String>>,
    keys: HashMap<String, Entry>,
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl State {
    /// Drop `key` if its expiry has passed, then look it up.
    fn live_key(&mut self, key: &str) -> Option<&Entry> {
        let expired = self
            .keys
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.keys.remove(key);
        }
        self.keys.get(key)
    }

    fn list_len(&self, list: &str) -> u64 {
        self.lists.get(list).map_or(0, |l| l.len() as u64)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    /// Woken on every push so blocked `move_tail` callers re-check.
    pushed: Notify,
    disconnected: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a dropped transport: every later call fails.
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        self.pushed.notify_waiters();
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(Error::Connection("memory store disconnected".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| Error::Other("memory store lock poisoned".to_string()))
    }

    fn try_move_tail(&self, src: &str, dst: &str) -> Result<Option<String>> {
        let mut state = self.lock()?;
        let Some(item) = state.lists.get_mut(src).and_then(|l| l.pop_back()) else {
            return Ok(None);
        };
        if state.lists.get(src).is_some_and(|l| l.is_empty()) {
            state.lists.remove(src);
        }
        state
            .lists
            .entry(dst.to_string())
            .or_default()
            .push_front(item.clone());
        Ok(Some(item))
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn length(&self, list: &str) -> Result<u64> {
        Ok(self.lock()?.list_len(list))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut state = self.lock()?;
        Ok(state.lists.contains_key(key) || state.live_key(key).is_some())
    }

    async fn move_tail(&self, src: &str, dst: &str, wait: Wait) -> Result<Option<String>> {
        let deadline = match wait {
            Wait::NonBlocking => return self.try_move_tail(src, dst),
            Wait::Blocking(timeout) => Instant::now() + timeout,
        };

        loop {
            // Register interest before checking so a push in between is not missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_move_tail(src, dst)? {
                return Ok(Some(item));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        // PSETEX takes whole milliseconds and refuses 0.
        if ttl.as_millis() == 0 {
            return Err(Error::Store("invalid expire time in 'psetex' command".to_string()));
        }
        let mut state = self.lock()?;
        state.keys.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn remove_by_value(&self, list: &str, value: &str, max: usize) -> Result<u64> {
        let mut state = self.lock()?;
        let Some(entries) = state.lists.get_mut(list) else {
            return Ok(0);
        };

        let mut removed = 0usize;
        entries.retain(|entry| {
            if entry == value && (max == 0 || removed < max) {
                removed += 1;
                false
            } else {
                true
            }
        });
        if entries.is_empty() {
            state.lists.remove(list);
        }
        Ok(removed as u64)
    }

    async fn delete_key(&self, key: &str) -> Result<bool> {
        let mut state = self.lock()?;
        let live = state.live_key(key).is_some();
        state.keys.remove(key);
        Ok(state.lists.remove(key).is_some() || live)
    }

    async fn push_head(&self, list: &str, value: &str) -> Result<u64> {
        let len = {
            let mut state = self.lock()?;
            let entries = state.lists.entry(list.to_string()).or_default();
            entries.push_front(value.to_string());
            entries.len() as u64
        };
        self.pushed.notify_waiters();
        Ok(len)
    }

    async fn push_tail(&self, list: &str, value: &str) -> Result<u64> {
        let len = {
            let mut state = self.lock()?;
            let entries = state.lists.entry(list.to_string()).or_default();
            entries.push_back(value.to_string());
            entries.len() as u64
        };
        self.pushed.notify_waiters();
        Ok(len)
    }

    async fn range(&self, list: &str) -> Result<Vec<String>> {
        let state = self.lock()?;
        Ok(state
            .lists
            .get(list)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.lock()?;
        Ok(state.live_key(key).map(|e| e.value.clone()))
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<MarkerRelease> {
        let mut state = self.lock()?;
        let current = state.live_key(key).map(|e| e.value.clone());
        match current {
            None => Ok(MarkerRelease::Missing),
            Some(value) if value == expected => {
                state.keys.remove(key);
                Ok(MarkerRelease::Deleted)
            }
            Some(value) => Ok(MarkerRelease::HeldBy(value)),
        }
    }
}
