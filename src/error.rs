//! Error types for leaseq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport or handshake failure. Fatal to the component that raised it.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The store answered, but with a command error.
    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("lease {key} is held by session {owner}")]
    LeaseNotOwned { key: String, owner: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error means the store is unreachable.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error()
            || e.is_connection_refusal()
            || e.is_connection_dropped()
            || e.is_timeout()
        {
            Error::Connection(e.to_string())
        } else {
            Error::Store(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
