//! Redis store implementation.
//!
//! [`RedisStore`] owns the driver connection (standalone or clustered) and
//! implements the core [`Store`] trait. Failure semantics follow the cache
//! client contract:
//!
//! - read commands are retried transparently on recoverable connection
//!   faults, up to the configured retry budget
//! - write commands are never silently retried; the caller decides whether
//!   a duplicate side effect is acceptable
//! - a `READONLY` reply means a replica was asked to write after a topology
//!   change; the store reconnects and retries once without burning the
//!   backoff budget

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::FromRedisValue;
use strata::config::CacheConfig;
use strata::retry::RetryPolicy;
use strata::store::{ConnectionState, KeyTtl, Store, StoreError, StoreResult};
use tokio::sync::{RwLock, watch};
use tracing::{debug, trace, warn};

use crate::connection::{ConnectionMode, ManagedConnection, establish};
use crate::error::{Error, classify, is_readonly, is_recoverable};

/// Redis-backed [`Store`] based on the redis-rs crate.
///
/// Standalone targets use a multiplexed [`ConnectionManager`]; clustered
/// targets (behind the `cluster` feature) use the async cluster connection,
/// which routes each command to the owning shard.
///
/// [`ConnectionManager`]: redis::aio::ConnectionManager
pub struct RedisStore {
    connection: RwLock<ManagedConnection>,
    mode: ConnectionMode,
    retry: RetryPolicy,
    state: watch::Sender<ConnectionState>,
    closed: AtomicBool,
}

impl RedisStore {
    /// Connect using a resolved [`CacheConfig`].
    pub async fn connect(config: &CacheConfig) -> Result<Self, StoreError> {
        Self::builder().config(config)?.connect().await
    }

    /// Create a new builder.
    #[must_use]
    pub fn builder() -> RedisStoreBuilder {
        RedisStoreBuilder::default()
    }

    async fn connection(&self) -> StoreResult<ManagedConnection> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(self.connection.read().await.clone())
    }

    /// Replace the live connection after a fault or topology change.
    async fn reconnect(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        let mut slot = self.connection.write().await;
        let fresh = establish(&self.mode, &self.retry, &self.state).await?;
        *slot = fresh;
        Ok(())
    }

    /// Run a read command, retrying transparently on recoverable faults.
    async fn query_read<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> StoreResult<T> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let mut conn = self.connection().await?;
            match cmd.query_async::<T>(&mut conn).await {
                Ok(value) => return Ok(value),
                Err(err) if is_recoverable(&err) && attempt <= self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "read failed, retrying"
                    );
                    self.state.send_replace(ConnectionState::Reconnecting);
                    tokio::time::sleep(delay).await;
                    self.reconnect().await?;
                }
                Err(err) => return Err(classify(err)),
            }
        }
    }

    /// Run a read pipeline, retrying transparently on recoverable faults.
    async fn pipeline_read<T: FromRedisValue>(&self, pipe: &redis::Pipeline) -> StoreResult<T> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let mut conn = self.connection().await?;
            match pipe.query_async::<T>(&mut conn).await {
                Ok(value) => return Ok(value),
                Err(err) if is_recoverable(&err) && attempt <= self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    warn!(attempt, error = %err, "pipelined read failed, retrying");
                    self.state.send_replace(ConnectionState::Reconnecting);
                    tokio::time::sleep(delay).await;
                    self.reconnect().await?;
                }
                Err(err) => return Err(classify(err)),
            }
        }
    }

    /// Run a write command. Never retried, except once after a `READONLY`
    /// reply, which signals a topology change rather than a fault.
    async fn query_write<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> StoreResult<T> {
        let mut reconnected = false;
        loop {
            let mut conn = self.connection().await?;
            match cmd.query_async::<T>(&mut conn).await {
                Ok(value) => return Ok(value),
                Err(err) if is_readonly(&err) && !reconnected => {
                    debug!(error = %err, "write hit a read-only replica, reconnecting");
                    reconnected = true;
                    self.reconnect().await?;
                }
                Err(err) => return Err(classify(err)),
            }
        }
    }

    /// Run a write pipeline, with the same `READONLY` handling as
    /// [`query_write`](Self::query_write).
    async fn pipeline_write(&self, pipe: &redis::Pipeline) -> StoreResult<()> {
        let mut reconnected = false;
        loop {
            let mut conn = self.connection().await?;
            match pipe.query_async::<()>(&mut conn).await {
                Ok(()) => return Ok(()),
                Err(err) if is_readonly(&err) && !reconnected => {
                    debug!(error = %err, "write hit a read-only replica, reconnecting");
                    reconnected = true;
                    self.reconnect().await?;
                }
                Err(err) => return Err(classify(err)),
            }
        }
    }
}

fn set_cmd(key: &str, value: &str, ttl: Option<Duration>) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value);
    if let Some(ttl) = ttl {
        cmd.arg("PX").arg((ttl.as_millis() as u64).max(1));
    }
    cmd
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        trace!(key, "GET");
        self.query_read(redis::cmd("GET").arg(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        trace!(key, ttl = ?ttl, "SET");
        self.query_write(&set_cmd(key, value, ttl)).await
    }

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        trace!(count = keys.len(), "pipelined GET");
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("GET").arg(key);
        }
        self.pipeline_read(&pipe).await
    }

    async fn mset(&self, items: &[(String, String)], ttl: Option<Duration>) -> StoreResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        trace!(count = items.len(), "pipelined SET");
        let mut pipe = redis::pipe();
        for (key, value) in items {
            pipe.add_command(set_cmd(key, value, ttl)).ignore();
        }
        self.pipeline_write(&pipe).await
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let deleted: i64 = self.query_write(redis::cmd("DEL").arg(key)).await?;
        Ok(deleted > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let found: i64 = self.query_read(redis::cmd("EXISTS").arg(key)).await?;
        Ok(found > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let applied: i64 = self
            .query_write(redis::cmd("PEXPIRE").arg(key).arg((ttl.as_millis() as u64).max(1)))
            .await?;
        Ok(applied > 0)
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        // PTTL returns -2 if the key doesn't exist, -1 if it has no TTL.
        let pttl: i64 = self.query_read(redis::cmd("PTTL").arg(key)).await?;
        Ok(match pttl {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            ms => KeyTtl::Expires(Duration::from_millis(ms.max(0) as u64)),
        })
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::Release);
        self.state.send_replace(ConnectionState::Closed);
        debug!("redis store closed");
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}

/// Builder for [`RedisStore`].
#[derive(Debug, Default)]
pub struct RedisStoreBuilder {
    mode: Option<ConnectionMode>,
    retry: RetryPolicy,
}

impl RedisStoreBuilder {
    /// Set the connection mode explicitly.
    pub fn mode(mut self, mode: ConnectionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Derive connection mode and retry policy from a resolved config.
    pub fn config(mut self, config: &CacheConfig) -> Result<Self, Error> {
        self.mode = Some(ConnectionMode::from_config(config)?);
        self.retry = config.retry.clone();
        Ok(self)
    }

    /// Set the backoff policy for connection attempts.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Establish the initial connection and build the store.
    pub async fn connect(self) -> Result<RedisStore, StoreError> {
        let mode = self.mode.ok_or(Error::MissingConnectionMode)?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let connection = establish(&mode, &self.retry, &state).await?;
        Ok(RedisStore {
            connection: RwLock::new(connection),
            mode,
            retry: self.retry,
            state,
            closed: AtomicBool::new(false),
        })
    }
}
