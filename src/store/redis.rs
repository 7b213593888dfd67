//! Redis-backed queue store.
//!
//! Maps each trait method onto one Redis command: LLEN, EXISTS,
//! (B)RPOPLPUSH, PSETEX, LREM, DEL, LPUSH, RPUSH, LRANGE, GET, and a small
//! Lua script for compare-and-delete.
//!
//! A blocking BRPOPLPUSH occupies the connection for its whole wait, so give
//! each worker its own `RedisStore` rather than sharing one.

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::store::{MarkerRelease, QueueStore, Wait};
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use secrecy::ExposeSecret;
use std::time::{Duration, Instant};

/// Returns 1 when deleted, 0 when missing, otherwise the current value.
const DELETE_IF_EQUALS: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then
    return 0
end
if current == ARGV[1] then
    redis.call('DEL', KEYS[1])
    return 1
end
return current
";

pub struct RedisStore {
    conn: ConnectionManager,
    response_timeout: Duration,
    delete_if_equals: redis::Script,
}

impl RedisStore {
    /// Connect to Redis with the configured endpoint and timeouts.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: redis::RedisConnectionInfo {
                db: config.db,
                password: config
                    .password
                    .as_ref()
                    .map(|p| p.expose_secret().to_string()),
                ..Default::default()
            },
        };
        let client = redis::Client::open(info)
            .map_err(|e| Error::Config(format!("invalid redis endpoint: {e}")))?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(config.connect_timeout)
            .set_response_timeout(config.response_timeout);
        let conn = ConnectionManager::new_with_config(client, manager_config)
            .await
            .map_err(|e| {
                Error::Connection(format!(
                    "cannot reach redis at {}:{}: {e}",
                    config.host, config.port
                ))
            })?;

        tracing::debug!(host = %config.host, port = config.port, db = config.db, "connected to redis");

        Ok(Self {
            conn,
            response_timeout: config.response_timeout,
            delete_if_equals: redis::Script::new(DELETE_IF_EQUALS),
        })
    }

    /// Round-trip a PING.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

fn record(operation: &'static str, started: Instant) {
    metrics::store_operation_duration_ms().record(
        started.elapsed().as_secs_f64() * 1000.0,
        &[
            KeyValue::new("store", "redis"),
            KeyValue::new("operation", operation),
        ],
    );
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn length(&self, list: &str) -> Result<u64> {
        let started = Instant::now();
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(list).await?;
        record("llen", started);
        Ok(len)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let started = Instant::now();
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        record("exists", started);
        Ok(exists)
    }

    async fn move_tail(&self, src: &str, dst: &str, wait: Wait) -> Result<Option<String>> {
        let started = Instant::now();
        let mut conn = self.conn.clone();
        let item: Option<String> = match wait {
            Wait::NonBlocking => {
                redis::cmd("RPOPLPUSH")
                    .arg(src)
                    .arg(dst)
                    .query_async(&mut conn)
                    .await?
            }
            Wait::Blocking(timeout) => {
                if timeout >= self.response_timeout {
                    return Err(Error::Config(format!(
                        "blocking timeout {timeout:?} must be shorter than the response timeout {:?}",
                        self.response_timeout
                    )));
                }
                redis::cmd("BRPOPLPUSH")
                    .arg(src)
                    .arg(dst)
                    .arg(timeout.as_secs_f64())
                    .query_async(&mut conn)
                    .await?
            }
        };
        record("rpoplpush", started);
        Ok(item)
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let started = Instant::now();
        let millis = u64::try_from(ttl.as_millis())
            .map_err(|_| Error::Config(format!("lease ttl {ttl:?} is out of range")))?;
        let mut conn = self.conn.clone();
        let _: () = conn.pset_ex(key, value, millis).await?;
        record("psetex", started);
        Ok(())
    }

    async fn remove_by_value(&self, list: &str, value: &str, max: usize) -> Result<u64> {
        let started = Instant::now();
        let count = isize::try_from(max)
            .map_err(|_| Error::Other(format!("removal count {max} is out of range")))?;
        let mut conn = self.conn.clone();
        let removed: u64 = conn.lrem(list, count, value).await?;
        record("lrem", started);
        Ok(removed)
    }

    async fn delete_key(&self, key: &str) -> Result<bool> {
        let started = Instant::now();
        let mut conn = self.conn.clone();
        let deleted: u64 = conn.del(key).await?;
        record("del", started);
        Ok(deleted > 0)
    }

    async fn push_head(&self, list: &str, value: &str) -> Result<u64> {
        let started = Instant::now();
        let mut conn = self.conn.clone();
        let len: u64 = conn.lpush(list, value).await?;
        record("lpush", started);
        Ok(len)
    }

    async fn push_tail(&self, list: &str, value: &str) -> Result<u64> {
        let started = Instant::now();
        let mut conn = self.conn.clone();
        let len: u64 = conn.rpush(list, value).await?;
        record("rpush", started);
        Ok(len)
    }

    async fn range(&self, list: &str) -> Result<Vec<String>> {
        let started = Instant::now();
        let mut conn = self.conn.clone();
        let items: Vec<String> = conn.lrange(list, 0, -1).await?;
        record("lrange", started);
        Ok(items)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let started = Instant::now();
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        record("get", started);
        Ok(value)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<MarkerRelease> {
        let started = Instant::now();
        let mut conn = self.conn.clone();
        let reply: redis::Value = self
            .delete_if_equals
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        record("delete_if_equals", started);

        match reply {
            redis::Value::Int(1) => Ok(MarkerRelease::Deleted),
            redis::Value::Int(0) => Ok(MarkerRelease::Missing),
            other => {
                let owner: String = redis::from_redis_value(&other)?;
                Ok(MarkerRelease::HeldBy(owner))
            }
        }
    }
}
