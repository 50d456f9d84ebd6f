#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Detached task tracking for write-behind.
///
/// Background writes are dispatched to the runtime and tracked in a
/// [`WriteBehindQueue`](behind::WriteBehindQueue) so they can be drained
/// before shutdown.
pub mod behind;

/// Cache client and strategy dispatch.
///
/// [`CacheClient`](client::CacheClient) routes every operation through one
/// of four strategies fixed at construction: cache-aside, read-through,
/// write-through and write-behind.
pub mod client;

/// Configuration resolution.
///
/// Merges file values, `STRATA_*` environment variables and connection
/// strings into an immutable [`CacheConfig`](config::CacheConfig), with
/// managed-provider normalization (forced TLS, provider ports, account
/// usernames).
pub mod config;

/// Error types for cache operations.
///
/// [`CacheError`](error::CacheError) covers configuration, connection,
/// timeout, serialization, loader/writer and validation failures.
pub mod error;

/// Key namespacing.
pub mod key;

/// Operational metrics: hit/miss/set/delete/error counters and per-command
/// latency aggregates, snapshot-readable and resettable.
pub mod metrics;

/// Connection retry policy with exponential backoff and jitter.
pub mod retry;

/// Store abstraction over the remote key-value driver.
pub mod store;

/// Caller-supplied loader and writer callbacks to the backing source.
pub mod upstream;

/// Value serialization codec with a reserved nil sentinel.
pub mod value;

pub use client::{BatchFailure, CacheClient, CacheClientBuilder, MgetOutcome, MsetOutcome, Strategy};
pub use config::CacheConfig;
pub use error::{BoxError, CacheError};
pub use key::KeyNamespace;
pub use metrics::{MetricsRecorder, MetricsSnapshot};
pub use retry::RetryPolicy;
pub use store::{ConnectionState, KeyTtl, Store, StoreError, StoreResult};
pub use upstream::{Loader, Writer};
pub use value::{CodecError, Decoded, JsonCodec};
