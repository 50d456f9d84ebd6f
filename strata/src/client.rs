//! Cache client and strategy dispatch.
//!
//! [`CacheClient`] is the public surface of the crate. Every logical
//! operation is routed through the behavior of the [`Strategy`] fixed at
//! construction:
//!
//! | operation | `CacheAside` | `ReadThrough` | `WriteThrough` | `WriteBehind` |
//! |---|---|---|---|---|
//! | `get` | plain read | read, on miss load + fill | plain read | plain read |
//! | `set` | cache write | cache write | writer first, then cache | cache first, then background writer |
//!
//! Strategy requirements are validated at construction, never at call time:
//! `ReadThrough` needs a [`Loader`], `WriteThrough` and `WriteBehind` need a
//! [`Writer`].
//!
//! Concurrent `get` calls on the same missing key under `ReadThrough` are
//! not coalesced; each triggers its own loader invocation. Callers with
//! expensive loaders and hot keys should deduplicate upstream.
//!
//! ```no_run
//! use strata::{CacheClient, Strategy};
//! # async fn demo(store: impl strata::store::Store) -> Result<(), strata::CacheError> {
//! let client: CacheClient<String, _> = CacheClient::builder(store)
//!     .strategy(Strategy::ReadThrough)
//!     .loader(|key: String| async move {
//!         Ok::<_, strata::BoxError>(Some(format!("loaded:{key}")))
//!     })
//!     .key_prefix("app")
//!     .build()?;
//!
//! let value = client.get("greeting").await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::behind::WriteBehindQueue;
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::key::KeyNamespace;
use crate::metrics::{MetricsRecorder, MetricsSnapshot, Timer};
use crate::store::{KeyTtl, Store, StoreResult};
use crate::upstream::{Loader, Writer};
use crate::value::JsonCodec;

/// Default per-command deadline.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Loading/consistency strategy of a cache client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Plain get/set; the caller loads from the source itself on a miss.
    #[default]
    CacheAside,
    /// The client loads from the backing source on a miss via a [`Loader`].
    ReadThrough,
    /// Writes go to the backing source and the cache synchronously, as one
    /// logical operation.
    WriteThrough,
    /// Writes go to the cache synchronously and to the backing source
    /// asynchronously, best effort.
    WriteBehind,
}

/// Per-variant handler, fixed at construction.
enum Handler<V> {
    CacheAside,
    ReadThrough { loader: Arc<dyn Loader<V>> },
    WriteThrough { writer: Arc<dyn Writer<V>> },
    WriteBehind { writer: Arc<dyn Writer<V>> },
}

/// A single failed key within a batch operation.
#[derive(Debug)]
pub struct BatchFailure {
    /// The logical key that failed.
    pub key: String,
    /// Why it failed.
    pub error: CacheError,
}

/// Outcome of [`CacheClient::mget`].
///
/// `values` is index-aligned with the requested keys; keys listed in
/// `failures` yield `None` there.
#[derive(Debug)]
pub struct MgetOutcome<V> {
    /// Decoded values, one slot per requested key.
    pub values: Vec<Option<V>>,
    /// Keys that failed without aborting the rest of the batch.
    pub failures: Vec<BatchFailure>,
}

/// Outcome of [`CacheClient::mset`].
#[derive(Debug, Default)]
pub struct MsetOutcome {
    /// Keys that failed without aborting the rest of the batch.
    pub failures: Vec<BatchFailure>,
}

impl MsetOutcome {
    /// True when every key was written.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

struct ClientInner<V, S> {
    store: S,
    handler: Handler<V>,
    namespace: KeyNamespace,
    codec: JsonCodec,
    metrics: MetricsRecorder,
    default_ttl: Option<Duration>,
    command_timeout: Duration,
    behind: WriteBehindQueue,
}

/// Strategy-driven cache client in front of a remote key-value store.
///
/// Cheap to clone; clones share the store connection, metrics and pending
/// background writes. `V` is the cached value type, `S` the store driver.
pub struct CacheClient<V, S> {
    inner: Arc<ClientInner<V, S>>,
}

impl<V, S> Clone for CacheClient<V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, S> CacheClient<V, S>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: Store,
{
    /// Start building a client on top of a store.
    pub fn builder(store: S) -> CacheClientBuilder<V, S> {
        CacheClientBuilder::new(store)
    }

    /// Read a value.
    ///
    /// Returns `None` when the key is absent. Under [`Strategy::ReadThrough`]
    /// an absent key invokes the loader; a non-`None` result is cached with
    /// the default TTL and returned. A loader `None` is returned as-is and
    /// never cached, so negative results are not pinned indefinitely.
    pub async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let physical = self.inner.namespace.physical(key);
        let timer = Timer::new();
        let raw = self.run("get", self.inner.store.get(&physical)).await?;
        self.inner.metrics.record_command_time("get", timer.elapsed());

        match raw {
            Some(raw) => {
                let decoded = self.decode_or_meter("get", &raw)?;
                self.inner.metrics.record_hit();
                Ok(decoded)
            }
            None => {
                self.inner.metrics.record_miss();
                match &self.inner.handler {
                    Handler::ReadThrough { loader } => {
                        self.load_and_fill(key, &physical, loader.as_ref()).await
                    }
                    _ => Ok(None),
                }
            }
        }
    }

    /// Write a value, with an optional TTL overriding the default.
    ///
    /// Under [`Strategy::WriteThrough`] the writer is awaited first; a writer
    /// failure aborts the whole operation and leaves the cache untouched.
    /// Under [`Strategy::WriteBehind`] the cache is written first and the
    /// writer call is dispatched in the background; a background failure is
    /// logged and counted in metrics but never surfaced here.
    pub async fn set(&self, key: &str, value: &V, ttl: Option<Duration>) -> Result<(), CacheError> {
        let physical = self.inner.namespace.physical(key);
        let raw = self.inner.codec.encode(value)?;
        let ttl = ttl.or(self.inner.default_ttl);

        match &self.inner.handler {
            Handler::WriteThrough { writer } => {
                writer.write(key, value).await.map_err(|source| {
                    self.inner.metrics.record_error("set");
                    CacheError::Writer {
                        key: key.to_owned(),
                        source,
                    }
                })?;
                self.store_set(&physical, &raw, ttl).await
            }
            Handler::WriteBehind { writer } => {
                self.store_set(&physical, &raw, ttl).await?;
                self.dispatch_behind(writer, key.to_owned(), value.clone());
                Ok(())
            }
            _ => self.store_set(&physical, &raw, ttl).await,
        }
    }

    /// Read multiple keys in one pipelined round trip.
    ///
    /// Under [`Strategy::ReadThrough`] missing keys are loaded concurrently
    /// and loaded values are filled back in one pipelined write. Per-key
    /// failures (decode, loader) are reported in the outcome without
    /// aborting the keys that succeeded.
    pub async fn mget(&self, keys: &[&str]) -> Result<MgetOutcome<V>, CacheError> {
        let physical: Vec<String> = keys
            .iter()
            .map(|key| self.inner.namespace.physical(key))
            .collect();
        let timer = Timer::new();
        let raws = self.run("mget", self.inner.store.mget(&physical)).await?;
        self.inner
            .metrics
            .record_command_time("mget", timer.elapsed());

        let mut values: Vec<Option<V>> = Vec::with_capacity(keys.len());
        let mut failures = Vec::new();
        let mut missing = Vec::new();
        for (idx, raw) in raws.into_iter().enumerate() {
            match raw {
                Some(raw) => match self.inner.codec.decode::<V>(&raw) {
                    Ok(decoded) => {
                        self.inner.metrics.record_hit();
                        values.push(decoded.into_option());
                    }
                    Err(err) => {
                        self.inner.metrics.record_error("mget");
                        failures.push(BatchFailure {
                            key: keys[idx].to_owned(),
                            error: err.into(),
                        });
                        values.push(None);
                    }
                },
                None => {
                    self.inner.metrics.record_miss();
                    values.push(None);
                    missing.push(idx);
                }
            }
        }

        if let Handler::ReadThrough { loader } = &self.inner.handler
            && !missing.is_empty()
        {
            let loads = missing.iter().map(|&idx| {
                let loader = Arc::clone(loader);
                let key = keys[idx].to_owned();
                async move { (idx, loader.load(&key).await) }
            });
            let mut fill = Vec::new();
            for (idx, result) in futures::future::join_all(loads).await {
                match result {
                    Ok(Some(value)) => match self.inner.codec.encode(&value) {
                        Ok(raw) => {
                            fill.push((physical[idx].clone(), raw));
                            values[idx] = Some(value);
                        }
                        Err(err) => failures.push(BatchFailure {
                            key: keys[idx].to_owned(),
                            error: err.into(),
                        }),
                    },
                    Ok(None) => {}
                    Err(source) => {
                        self.inner.metrics.record_error("mget");
                        failures.push(BatchFailure {
                            key: keys[idx].to_owned(),
                            error: CacheError::Loader {
                                key: keys[idx].to_owned(),
                                source,
                            },
                        });
                    }
                }
            }
            if !fill.is_empty() {
                self.run("mset", self.inner.store.mset(&fill, self.inner.default_ttl))
                    .await?;
                for _ in &fill {
                    self.inner.metrics.record_set();
                }
            }
        }

        Ok(MgetOutcome { values, failures })
    }

    /// Write multiple entries in one pipelined round trip.
    ///
    /// Entries that fail to encode are reported per key and skipped; the
    /// rest of the batch proceeds. Under [`Strategy::WriteThrough`] the
    /// writer batch is awaited first and a writer failure aborts the whole
    /// operation (no partial commit). Under [`Strategy::WriteBehind`] the
    /// writer batch runs in the background.
    pub async fn mset(
        &self,
        items: &[(&str, V)],
        ttl: Option<Duration>,
    ) -> Result<MsetOutcome, CacheError> {
        let ttl = ttl.or(self.inner.default_ttl);
        let mut outcome = MsetOutcome::default();
        let mut encoded = Vec::with_capacity(items.len());
        let mut accepted = Vec::with_capacity(items.len());
        for (key, value) in items {
            match self.inner.codec.encode(value) {
                Ok(raw) => {
                    encoded.push((self.inner.namespace.physical(key), raw));
                    accepted.push(((*key).to_owned(), value.clone()));
                }
                Err(err) => {
                    self.inner.metrics.record_error("mset");
                    outcome.failures.push(BatchFailure {
                        key: (*key).to_owned(),
                        error: err.into(),
                    });
                }
            }
        }
        if encoded.is_empty() {
            return Ok(outcome);
        }

        match &self.inner.handler {
            Handler::WriteThrough { writer } => {
                writer.write_batch(&accepted).await.map_err(|source| {
                    self.inner.metrics.record_error("mset");
                    CacheError::Writer {
                        key: accepted[0].0.clone(),
                        source,
                    }
                })?;
                self.store_mset(&encoded, ttl).await?;
            }
            Handler::WriteBehind { writer } => {
                self.store_mset(&encoded, ttl).await?;
                let writer = Arc::clone(writer);
                let metrics = self.inner.metrics.clone();
                self.inner.behind.spawn(async move {
                    if let Err(err) = writer.write_batch(&accepted).await {
                        metrics.record_error("write_behind");
                        warn!(error = %err, "background batch write failed");
                    }
                });
            }
            _ => self.store_mset(&encoded, ttl).await?,
        }
        Ok(outcome)
    }

    /// Delete a key. Returns `true` if it existed.
    pub async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let physical = self.inner.namespace.physical(key);
        let timer = Timer::new();
        let deleted = self.run("del", self.inner.store.del(&physical)).await?;
        self.inner.metrics.record_command_time("del", timer.elapsed());
        self.inner.metrics.record_del();
        Ok(deleted)
    }

    /// Check whether a key exists without reading it.
    pub async fn has(&self, key: &str) -> Result<bool, CacheError> {
        let physical = self.inner.namespace.physical(key);
        self.run("has", self.inner.store.exists(&physical)).await
    }

    /// Set a TTL on an existing key. Returns `false` if the key is absent.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let physical = self.inner.namespace.physical(key);
        self.run("expire", self.inner.store.expire(&physical, ttl))
            .await
    }

    /// Remaining TTL of a key.
    pub async fn ttl(&self, key: &str) -> Result<KeyTtl, CacheError> {
        let physical = self.inner.namespace.physical(key);
        self.run("ttl", self.inner.store.ttl(&physical)).await
    }

    /// Snapshot of the metrics recorder.
    pub fn stats(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// The injected metrics recorder.
    pub fn metrics(&self) -> &MetricsRecorder {
        &self.inner.metrics
    }

    /// Number of write-behind operations still in flight.
    pub fn pending_writes(&self) -> usize {
        self.inner.behind.pending()
    }

    /// Await every pending write-behind operation.
    ///
    /// Call this before [`close`](Self::close) to avoid abandoning
    /// background writes; a dispatched write is not cancellable.
    pub async fn flush(&self) {
        self.inner.behind.drain().await;
    }

    /// Drain pending background writes, then close the store.
    pub async fn close(&self) -> Result<(), CacheError> {
        self.flush().await;
        debug!("closing cache client");
        self.run("close", self.inner.store.close()).await
    }

    async fn load_and_fill(
        &self,
        logical: &str,
        physical: &str,
        loader: &dyn Loader<V>,
    ) -> Result<Option<V>, CacheError> {
        let loaded = loader.load(logical).await.map_err(|source| {
            self.inner.metrics.record_error("get");
            CacheError::Loader {
                key: logical.to_owned(),
                source,
            }
        })?;
        match loaded {
            Some(value) => {
                let raw = self.inner.codec.encode(&value)?;
                self.store_set(physical, &raw, self.inner.default_ttl).await?;
                Ok(Some(value))
            }
            // Loader miss: return None without caching a negative entry.
            None => Ok(None),
        }
    }

    fn dispatch_behind(&self, writer: &Arc<dyn Writer<V>>, key: String, value: V) {
        let writer = Arc::clone(writer);
        let metrics = self.inner.metrics.clone();
        self.inner.behind.spawn(async move {
            if let Err(err) = writer.write(&key, &value).await {
                metrics.record_error("write_behind");
                warn!(key = %key, error = %err, "background write failed");
            }
        });
    }

    async fn store_set(
        &self,
        physical: &str,
        raw: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let timer = Timer::new();
        self.run("set", self.inner.store.set(physical, raw, ttl))
            .await?;
        self.inner.metrics.record_command_time("set", timer.elapsed());
        self.inner.metrics.record_set();
        Ok(())
    }

    async fn store_mset(
        &self,
        encoded: &[(String, String)],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let timer = Timer::new();
        self.run("mset", self.inner.store.mset(encoded, ttl)).await?;
        self.inner
            .metrics
            .record_command_time("mset", timer.elapsed());
        for _ in encoded {
            self.inner.metrics.record_set();
        }
        Ok(())
    }

    fn decode_or_meter(&self, command: &str, raw: &str) -> Result<Option<V>, CacheError> {
        match self.inner.codec.decode::<V>(raw) {
            Ok(decoded) => Ok(decoded.into_option()),
            Err(err) => {
                self.inner.metrics.record_error(command);
                Err(err.into())
            }
        }
    }

    /// Run a store operation under the per-command deadline.
    async fn run<T>(
        &self,
        command: &'static str,
        operation: impl Future<Output = StoreResult<T>>,
    ) -> Result<T, CacheError> {
        let timeout = self.inner.command_timeout;
        match tokio::time::timeout(timeout, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                self.inner.metrics.record_error(command);
                Err(CacheError::from_store(command, err, timeout))
            }
            Err(_) => {
                self.inner.metrics.record_error(command);
                Err(CacheError::Timeout {
                    command: SmolStr::new_static(command),
                    timeout,
                })
            }
        }
    }
}

/// Builder for [`CacheClient`].
pub struct CacheClientBuilder<V, S> {
    store: S,
    strategy: Strategy,
    loader: Option<Arc<dyn Loader<V>>>,
    writer: Option<Arc<dyn Writer<V>>>,
    key_prefix: Option<String>,
    default_ttl: Option<Duration>,
    command_timeout: Duration,
    metrics: MetricsRecorder,
}

impl<V, S> CacheClientBuilder<V, S>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: Store,
{
    fn new(store: S) -> Self {
        Self {
            store,
            strategy: Strategy::default(),
            loader: None,
            writer: None,
            key_prefix: None,
            default_ttl: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            metrics: MetricsRecorder::new(),
        }
    }

    /// Select the loading/consistency strategy.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the loader invoked on read-through misses.
    pub fn loader(mut self, loader: impl Loader<V> + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Set the writer invoked on write-through and write-behind writes.
    pub fn writer(mut self, writer: impl Writer<V> + 'static) -> Self {
        self.writer = Some(Arc::new(writer));
        self
    }

    /// Namespace prefix prepended to every key.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// TTL applied to writes that do not specify one.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Per-command deadline. Defaults to five seconds.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Inject a metrics recorder, e.g. one shared with other clients.
    pub fn metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = metrics;
        self
    }

    /// Apply the cache options of a resolved [`CacheConfig`].
    pub fn options_from(mut self, config: &CacheConfig) -> Self {
        if let Some(prefix) = &config.cache.key_prefix {
            self.key_prefix = Some(prefix.clone());
        }
        if let Some(ttl) = config.cache.default_ttl {
            self.default_ttl = Some(ttl);
        }
        self
    }

    /// Build the client.
    ///
    /// Fails with [`CacheError::Validation`] when the selected strategy is
    /// missing its required callback.
    pub fn build(self) -> Result<CacheClient<V, S>, CacheError> {
        let handler = match self.strategy {
            Strategy::CacheAside => Handler::CacheAside,
            Strategy::ReadThrough => Handler::ReadThrough {
                loader: self
                    .loader
                    .ok_or(CacheError::Validation("read-through requires a loader"))?,
            },
            Strategy::WriteThrough => Handler::WriteThrough {
                writer: self
                    .writer
                    .ok_or(CacheError::Validation("write-through requires a writer"))?,
            },
            Strategy::WriteBehind => Handler::WriteBehind {
                writer: self
                    .writer
                    .ok_or(CacheError::Validation("write-behind requires a writer"))?,
            },
        };
        Ok(CacheClient {
            inner: Arc::new(ClientInner {
                store: self.store,
                handler,
                namespace: KeyNamespace::new(self.key_prefix.as_deref()),
                codec: JsonCodec,
                metrics: self.metrics,
                default_ttl: self.default_ttl,
                command_timeout: self.command_timeout,
                behind: WriteBehindQueue::new(),
            }),
        })
    }
}
