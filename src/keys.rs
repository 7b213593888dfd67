//! Key naming for a queue.
//!
//! A queue named `jobs` lives in three places in the store:
//! - `jobs`: the main list
//! - `jobs:processing`: items currently leased
//! - `jobs:leased_by_session:<hash>`: one lease marker per leased payload
//!
//! The marker suffix is derived from payload content, not list position, so
//! two items with identical bytes share one marker.

use sha2::{Digest, Sha224};

/// Hex SHA-224 of an item's payload.
pub fn item_hash(item: &str) -> String {
    hex::encode(Sha224::digest(item.as_bytes()))
}

/// Derived store names for one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    main: String,
    processing: String,
    lease_prefix: String,
}

impl QueueKeys {
    pub fn new(name: impl Into<String>) -> Self {
        let main = name.into();
        Self {
            processing: format!("{main}:processing"),
            lease_prefix: format!("{main}:leased_by_session:"),
            main,
        }
    }

    pub fn main(&self) -> &str {
        &self.main
    }

    pub fn processing(&self) -> &str {
        &self.processing
    }

    pub fn lease_prefix(&self) -> &str {
        &self.lease_prefix
    }

    /// Marker key for a payload.
    pub fn lease_key(&self, item: &str) -> String {
        format!("{}{}", self.lease_prefix, item_hash(item))
    }
}
