//! In-memory test store with TTL support.
//!
//! Uses `tokio::time::Instant` for expiry so tests can run with paused time
//! and advance the clock deterministically.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use strata::store::{ConnectionState, KeyTtl, Store, StoreError, StoreResult};
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Thread-safe in-memory store; clones share the same entries.
#[derive(Clone)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    state: Arc<watch::Sender<ConnectionState>>,
    closed: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Connected);
        Self {
            entries: Arc::new(DashMap::new()),
            state: Arc::new(state),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Raw physical-key lookup for assertions, ignoring expiry.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|entry| !entry.expired())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn guard(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.expired() {
            drop(entry);
            self.entries.remove(key);
            None
        } else {
            Some(entry.value.clone())
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.guard()?;
        Ok(self.read(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.guard()?;
        self.entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        self.guard()?;
        Ok(keys.iter().map(|key| self.read(key)).collect())
    }

    async fn mset(&self, items: &[(String, String)], ttl: Option<Duration>) -> StoreResult<()> {
        self.guard()?;
        for (key, value) in items {
            self.set(key, value, ttl).await?;
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        self.guard()?;
        Ok(self.entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.guard()?;
        Ok(self.read(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.guard()?;
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.expired() => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        self.guard()?;
        match self.entries.get(key) {
            Some(entry) if entry.expired() => Ok(KeyTtl::Missing),
            Some(entry) => Ok(match entry.expires_at {
                Some(at) => KeyTtl::Expires(at.saturating_duration_since(Instant::now())),
                None => KeyTtl::Persistent,
            }),
            None => Ok(KeyTtl::Missing),
        }
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Closed);
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}
