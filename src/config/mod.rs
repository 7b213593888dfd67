//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The store password is wrapped in secrecy::SecretString to
//! prevent log leaks.

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug)]
pub struct Config {
    pub queue_name: String,
    pub store: StoreConfig,
    pub lease: LeaseOptions,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// Endpoint and timeouts for the Redis store. Process-wide, set once.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<SecretString>,
    pub connect_timeout: Duration,
    /// Upper bound on a single command round-trip. Blocking leases wait
    /// inside one round-trip, so this must exceed the poll timeout.
    pub response_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
            connect_timeout: Duration::from_millis(1500),
            response_timeout: Duration::from_secs(30),
        }
    }
}

/// Leasing knobs for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseOptions {
    /// TTL stamped on the lease marker.
    pub lease_duration: Duration,
    /// How long a blocking lease waits for an item before returning `None`.
    /// In non-blocking mode, the consume loop's pause between empty polls.
    pub poll_timeout: Duration,
    /// Block on an empty main list (up to `poll_timeout`) or return at once.
    pub blocking: bool,
}

impl Default for LeaseOptions {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(2),
            blocking: true,
        }
    }
}

impl LeaseOptions {
    pub fn lease_duration(mut self, d: Duration) -> Self {
        self.lease_duration = d;
        self
    }

    pub fn poll_timeout(mut self, d: Duration) -> Self {
        self.poll_timeout = d;
        self
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Reject settings the store would misinterpret.
    ///
    /// Marker TTLs are sent in whole milliseconds and the store refuses 0.
    /// A zero blocking timeout means "wait forever"; in non-blocking mode
    /// the poll timeout is the retry pause, and zero would spin.
    pub fn validate(&self) -> Result<()> {
        if self.lease_duration < Duration::from_millis(1) {
            return Err(Error::Config(format!(
                "lease duration must be at least 1ms, got {:?}",
                self.lease_duration
            )));
        }
        if self.poll_timeout.is_zero() {
            return Err(Error::Config("poll timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = StoreConfig::default();
        let lease_defaults = LeaseOptions::default();

        let store = StoreConfig {
            host: std::env::var("REDIS_HOST").unwrap_or(defaults.host),
            port: parsed_var("REDIS_PORT")?.unwrap_or(defaults.port),
            db: parsed_var("REDIS_DB")?.unwrap_or(defaults.db),
            password: std::env::var("REDIS_PASSWORD").ok().map(SecretString::from),
            connect_timeout: parsed_var("REDIS_CONNECT_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            response_timeout: parsed_var("REDIS_RESPONSE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.response_timeout),
        };

        let lease = LeaseOptions {
            lease_duration: parsed_var("LEASE_DURATION_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(lease_defaults.lease_duration),
            poll_timeout: parsed_var("LEASE_POLL_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(lease_defaults.poll_timeout),
            blocking: parsed_var("LEASE_BLOCKING")?.unwrap_or(lease_defaults.blocking),
        };
        lease.validate()?;

        if lease.blocking && store.response_timeout <= lease.poll_timeout {
            return Err(Error::Config(format!(
                "REDIS_RESPONSE_TIMEOUT_MS ({}ms) must exceed the lease poll timeout ({}ms)",
                store.response_timeout.as_millis(),
                lease.poll_timeout.as_millis()
            )));
        }

        Ok(Self {
            queue_name: required_var("QUEUE_NAME")?,
            store,
            lease,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid value for {name}: {e}"))),
        Err(_) => Ok(None),
    }
}
