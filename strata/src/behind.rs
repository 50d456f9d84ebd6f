//! Detached task tracking for write-behind.
//!
//! Under write-behind, the backing-source write is dispatched to the runtime
//! and the caller's `set` returns without awaiting it. [`WriteBehindQueue`]
//! tracks these detached tasks so they can be drained before shutdown.
//!
//! Delivery contract: best effort, no retry. A dispatched write runs to
//! completion or failure independently of the caller; failures are recorded
//! in metrics and logged by the task itself. Closing the client while writes
//! are pending abandons them, which is why [`CacheClient::close`] drains the
//! queue first.
//!
//! [`CacheClient::close`]: crate::client::CacheClient::close

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug, Default)]
struct QueueInner {
    tasks: DashMap<u64, JoinHandle<()>>,
    next_id: AtomicU64,
}

/// Tracker for in-flight background writes.
///
/// Cheap to clone; clones share the same task set.
#[derive(Debug, Clone, Default)]
pub struct WriteBehindQueue {
    inner: Arc<QueueInner>,
}

impl WriteBehindQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch a background write.
    ///
    /// The task starts immediately and removes itself from the queue on
    /// completion. Returns the task id.
    pub fn spawn<F>(&self, task: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            task.await;
            inner.tasks.remove(&id);
        });
        // The task may already have finished and removed itself; inserting a
        // finished handle is harmless, drain() reaps it.
        self.inner.tasks.insert(id, handle);
        id
    }

    /// Number of writes still in flight.
    pub fn pending(&self) -> usize {
        self.inner
            .tasks
            .iter()
            .filter(|entry| !entry.is_finished())
            .count()
    }

    /// Await every in-flight write, including ones dispatched while draining.
    pub async fn drain(&self) {
        loop {
            let ids: Vec<u64> = self.inner.tasks.iter().map(|entry| *entry.key()).collect();
            if ids.is_empty() {
                return;
            }
            for id in ids {
                if let Some((_, handle)) = self.inner.tasks.remove(&id)
                    && let Err(err) = handle.await
                    && !err.is_cancelled()
                {
                    warn!(task = id, error = %err, "background write task panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::oneshot;

    #[tokio::test]
    async fn drain_waits_for_pending_tasks() {
        let queue = WriteBehindQueue::new();
        let (tx, rx) = oneshot::channel::<()>();
        let flag = Arc::new(AtomicU64::new(0));
        let task_flag = Arc::clone(&flag);
        queue.spawn(async move {
            let _ = rx.await;
            task_flag.store(1, Ordering::SeqCst);
        });
        assert_eq!(queue.pending(), 1);

        tx.send(()).unwrap();
        queue.drain().await;
        assert_eq!(flag.load(Ordering::SeqCst), 1);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn finished_tasks_remove_themselves() {
        let queue = WriteBehindQueue::new();
        queue.spawn(async {});
        // Yield until the task has run and reaped its own entry.
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(1)).await;
            if queue.pending() == 0 {
                break;
            }
        }
        assert_eq!(queue.pending(), 0);
    }
}
