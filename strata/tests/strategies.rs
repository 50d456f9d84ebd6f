//! End-to-end behavior of the four cache strategies.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::InMemoryStore;
use pretty_assertions::assert_eq;
use strata::{BoxError, CacheClient, CacheError, Strategy};
use tokio::sync::Notify;

fn counting_loader(
    calls: &Arc<AtomicUsize>,
    result: Option<String>,
) -> impl strata::Loader<String> + 'static {
    let calls = Arc::clone(calls);
    move |key: String| {
        let calls = Arc::clone(&calls);
        let result = result.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(result.map(|value| format!("{value}:{key}")))
        }
    }
}

#[tokio::test]
async fn cache_aside_round_trips_values() {
    let store = InMemoryStore::new();
    let client: CacheClient<String, _> = CacheClient::builder(store).build().unwrap();

    assert_eq!(client.get("user:1").await.unwrap(), None);
    client.set("user:1", &"ada".to_owned(), None).await.unwrap();
    assert_eq!(client.get("user:1").await.unwrap(), Some("ada".to_owned()));

    assert!(client.del("user:1").await.unwrap());
    assert_eq!(client.get("user:1").await.unwrap(), None);
    assert!(!client.del("user:1").await.unwrap());
}

#[tokio::test]
async fn construction_fails_without_required_callbacks() {
    for strategy in [Strategy::ReadThrough, Strategy::WriteThrough, Strategy::WriteBehind] {
        let result: Result<CacheClient<String, _>, _> = CacheClient::builder(InMemoryStore::new())
            .strategy(strategy)
            .build();
        let Err(err) = result else {
            panic!("{strategy:?} must require its callback at construction");
        };
        assert!(matches!(err, CacheError::Validation(_)));
    }
}

#[tokio::test]
async fn read_through_loads_once_then_hits() {
    let store = InMemoryStore::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let client: CacheClient<String, _> = CacheClient::builder(store.clone())
        .strategy(Strategy::ReadThrough)
        .loader(counting_loader(&calls, Some("loaded".to_owned())))
        .build()
        .unwrap();

    let first = client.get("k").await.unwrap();
    assert_eq!(first, Some("loaded:k".to_owned()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(store.contains("k"));

    let second = client.get("k").await.unwrap();
    assert_eq!(second, Some("loaded:k".to_owned()));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "second get must be a hit");

    let stats = client.stats();
    assert_eq!(stats.cache_miss, 1);
    assert_eq!(stats.cache_hit, 1);
}

#[tokio::test]
async fn read_through_does_not_cache_loader_misses() {
    let store = InMemoryStore::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let client: CacheClient<String, _> = CacheClient::builder(store.clone())
        .strategy(Strategy::ReadThrough)
        .loader(counting_loader(&calls, None))
        .build()
        .unwrap();

    assert_eq!(client.get("absent").await.unwrap(), None);
    assert!(!store.contains("absent"));
    // A second get triggers the loader again: negative results are not pinned.
    assert_eq!(client.get("absent").await.unwrap(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn read_through_surfaces_loader_errors() {
    let client: CacheClient<String, _> = CacheClient::builder(InMemoryStore::new())
        .strategy(Strategy::ReadThrough)
        .loader(|_key: String| async move { Err::<Option<String>, BoxError>("backend down".into()) })
        .build()
        .unwrap();

    let err = client.get("k").await.unwrap_err();
    assert!(matches!(err, CacheError::Loader { ref key, .. } if key == "k"));
}

#[tokio::test]
async fn write_through_awaits_the_writer_before_caching() {
    let store = InMemoryStore::new();
    let written = Arc::new(AtomicUsize::new(0));
    let writer = {
        let written = Arc::clone(&written);
        move |_key: String, _value: String| {
            let written = Arc::clone(&written);
            async move {
                written.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            }
        }
    };
    let client: CacheClient<String, _> = CacheClient::builder(store.clone())
        .strategy(Strategy::WriteThrough)
        .writer(writer)
        .build()
        .unwrap();

    client.set("k", &"v".to_owned(), None).await.unwrap();
    assert_eq!(written.load(Ordering::SeqCst), 1);
    assert!(store.contains("k"));
}

#[tokio::test]
async fn write_through_failure_leaves_no_partial_commit() {
    let store = InMemoryStore::new();
    let client: CacheClient<String, _> = CacheClient::builder(store.clone())
        .strategy(Strategy::WriteThrough)
        .writer(|_key: String, _value: String| async move {
            Err::<(), BoxError>("constraint violation".into())
        })
        .build()
        .unwrap();

    let err = client.set("k", &"v".to_owned(), None).await.unwrap_err();
    assert!(matches!(err, CacheError::Writer { ref key, .. } if key == "k"));
    assert_eq!(store.len(), 0, "cache must stay untouched on writer failure");
}

#[tokio::test(flavor = "multi_thread")]
async fn write_behind_resolves_before_the_writer_settles() {
    let store = InMemoryStore::new();
    let gate = Arc::new(Notify::new());
    let written = Arc::new(AtomicUsize::new(0));
    let writer = {
        let gate = Arc::clone(&gate);
        let written = Arc::clone(&written);
        move |_key: String, _value: String| {
            let gate = Arc::clone(&gate);
            let written = Arc::clone(&written);
            async move {
                gate.notified().await;
                written.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            }
        }
    };
    let client: CacheClient<String, _> = CacheClient::builder(store.clone())
        .strategy(Strategy::WriteBehind)
        .writer(writer)
        .build()
        .unwrap();

    // set returns while the writer is still parked on the gate.
    client.set("k", &"v".to_owned(), None).await.unwrap();
    assert!(store.contains("k"));
    assert_eq!(written.load(Ordering::SeqCst), 0);
    assert_eq!(client.pending_writes(), 1);

    // notify_one stores a permit, so the order of park vs notify is immaterial.
    gate.notify_one();
    client.flush().await;
    assert_eq!(written.load(Ordering::SeqCst), 1);
    assert_eq!(client.pending_writes(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn write_behind_failures_are_metered_not_surfaced() {
    let store = InMemoryStore::new();
    let client: CacheClient<String, _> = CacheClient::builder(store.clone())
        .strategy(Strategy::WriteBehind)
        .writer(|_key: String, _value: String| async move {
            Err::<(), BoxError>("sink unavailable".into())
        })
        .build()
        .unwrap();

    // The caller's set succeeds regardless of the background outcome.
    client.set("k", &"v".to_owned(), None).await.unwrap();
    client.flush().await;

    assert!(store.contains("k"));
    assert_eq!(client.stats().command_errors, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn close_drains_pending_background_writes() {
    let store = InMemoryStore::new();
    let written = Arc::new(AtomicUsize::new(0));
    let writer = {
        let written = Arc::clone(&written);
        move |_key: String, _value: String| {
            let written = Arc::clone(&written);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                written.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            }
        }
    };
    let client: CacheClient<String, _> = CacheClient::builder(store.clone())
        .strategy(Strategy::WriteBehind)
        .writer(writer)
        .build()
        .unwrap();

    client.set("a", &"1".to_owned(), None).await.unwrap();
    client.set("b", &"2".to_owned(), None).await.unwrap();
    client.close().await.unwrap();

    assert_eq!(written.load(Ordering::SeqCst), 2);
    // The store is closed afterwards; further operations fail as connection
    // errors.
    let err = client.get("a").await.unwrap_err();
    assert!(matches!(err, CacheError::Connection { .. }));
}
