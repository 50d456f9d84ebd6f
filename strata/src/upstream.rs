//! Caller-supplied callbacks to the backing source of truth.
//!
//! A [`Loader`] fetches a value from the backing source on a cache miss
//! (read-through). A [`Writer`] persists a value to the backing source on a
//! cache write (write-through and write-behind).
//!
//! Error contract:
//!
//! - a loader signals "not found" by returning `Ok(None)` — it must not fail
//!   for an expected miss; a loader error aborts the `get` that triggered it
//! - a writer error aborts the whole `set` under write-through, and is
//!   logged-and-metered under write-behind
//!
//! Both traits have blanket implementations for async closures, so plain
//! functions work without a newtype:
//!
//! ```
//! use strata::upstream::Loader;
//!
//! let loader = |key: String| async move {
//!     Ok::<_, strata::BoxError>(if key == "answer" { Some(42_u32) } else { None })
//! };
//! # fn assert_loader(_: &impl Loader<u32>) {}
//! # assert_loader(&loader);
//! ```

use std::future::Future;

use async_trait::async_trait;

use crate::error::BoxError;

/// Loads a value from the backing source on a cache miss.
#[async_trait]
pub trait Loader<V>: Send + Sync {
    /// Fetch the value for a logical key. `Ok(None)` means "not found".
    async fn load(&self, key: &str) -> Result<Option<V>, BoxError>;
}

#[async_trait]
impl<V, F, Fut> Loader<V> for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<V>, BoxError>> + Send,
    V: 'static,
{
    async fn load(&self, key: &str) -> Result<Option<V>, BoxError> {
        (self)(key.to_owned()).await
    }
}

/// Persists a value to the backing source on a cache write.
#[async_trait]
pub trait Writer<V>: Send + Sync {
    /// Persist a single entry.
    async fn write(&self, key: &str, value: &V) -> Result<(), BoxError>;

    /// Persist a batch of entries.
    ///
    /// The default implementation writes entries sequentially and stops at
    /// the first failure.
    async fn write_batch(&self, items: &[(String, V)]) -> Result<(), BoxError>
    where
        V: Sync,
    {
        for (key, value) in items {
            self.write(key, value).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<V, F, Fut> Writer<V> for F
where
    F: Fn(String, V) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send,
    V: Clone + Send + Sync + 'static,
{
    async fn write(&self, key: &str, value: &V) -> Result<(), BoxError> {
        (self)(key.to_owned(), value.clone()).await
    }
}
