//! Store abstraction over the remote key-value driver.
//!
//! [`Store`] is the seam between the strategy dispatcher and a concrete
//! driver (the `strata-redis` crate provides the Redis implementation).
//! Values cross this boundary in their raw wire representation (strings);
//! encoding and namespacing happen above it.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::BoxError;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store is unreachable and the retry budget is exhausted.
    #[error("connection error: {0}")]
    Connection(#[source] BoxError),

    /// A single command exceeded its deadline.
    #[error("command timed out")]
    Timeout,

    /// The server rejected or failed the command.
    #[error("command error: {0}")]
    Command(#[source] BoxError),

    /// The store was closed by an explicit `close()` call.
    #[error("store is closed")]
    Closed,
}

/// Lifecycle state of the connection owned by a store.
///
/// The state is owned exclusively by the store implementation; other
/// components observe transitions through [`Store::subscribe`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection established, or the retry budget was exhausted.
    #[default]
    Disconnected,
    /// Initial connection attempt in progress.
    Connecting,
    /// Connection is live.
    Connected,
    /// Connection was lost; reconnect attempts in progress.
    Reconnecting,
    /// The store was closed and will not reconnect.
    Closed,
}

impl ConnectionState {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

/// Remaining time-to-live of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists but has no expiry.
    Persistent,
    /// The key exists and expires after the given duration.
    Expires(Duration),
}

/// Asynchronous key-value store driver.
///
/// Read operations (`get`, `mget`, `exists`, `ttl`) may be retried
/// transparently by implementations; write operations must never be silently
/// retried, so callers keep control over duplicate side effects.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Read the raw value for a key. `None` means the key is absent.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a raw value, with an optional TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Read multiple keys in one pipelined round trip.
    ///
    /// The result is index-aligned with `keys`.
    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>>;

    /// Write multiple entries in one pipelined round trip.
    async fn mset(&self, items: &[(String, String)], ttl: Option<Duration>) -> StoreResult<()>;

    /// Delete a key. Returns `true` if the key existed.
    async fn del(&self, key: &str) -> StoreResult<bool>;

    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Set a TTL on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Remaining TTL of a key.
    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl>;

    /// Close the store. Subsequent operations fail with [`StoreError::Closed`].
    async fn close(&self) -> StoreResult<()>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Subscribe to connection-state transitions.
    fn subscribe(&self) -> watch::Receiver<ConnectionState>;
}
