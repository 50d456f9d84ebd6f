//! Operational metrics for cache commands.
//!
//! [`MetricsRecorder`] keeps process-local counters for hits, misses, sets,
//! deletes and command errors, plus per-command latency aggregates. It is an
//! explicit, constructor-injected dependency of the client rather than a
//! hidden global, so separate client instances (e.g. in tests) never share
//! state. Clones share the same underlying counters.
//!
//! Counter increments are atomic; latency aggregates are sharded by command
//! label. [`MetricsRecorder::snapshot`] never mutates state and
//! [`MetricsRecorder::reset`] restores a pristine recorder for test
//! isolation.
//!
//! When the `metrics` cargo feature is enabled, increments are also forwarded
//! to the [`metrics`] crate facade under `strata_*` metric names.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use smol_str::SmolStr;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track number of cache hit events.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "strata_cache_hit_total",
            "Total number of cache hit events."
        );
        "strata_cache_hit_total"
    };
    /// Track number of cache miss events.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "strata_cache_miss_total",
            "Total number of cache miss events."
        );
        "strata_cache_miss_total"
    };
    /// Track number of cache set events.
    pub static ref CACHE_SET_COUNTER: &'static str = {
        metrics::describe_counter!(
            "strata_cache_set_total",
            "Total number of cache set events."
        );
        "strata_cache_set_total"
    };
    /// Track number of cache delete events.
    pub static ref CACHE_DEL_COUNTER: &'static str = {
        metrics::describe_counter!(
            "strata_cache_del_total",
            "Total number of cache delete events."
        );
        "strata_cache_del_total"
    };
    /// Track number of command errors.
    pub static ref COMMAND_ERROR_COUNTER: &'static str = {
        metrics::describe_counter!(
            "strata_command_errors_total",
            "Total number of cache command errors."
        );
        "strata_command_errors_total"
    };
    /// Histogram of command duration.
    pub static ref COMMAND_DURATION: &'static str = {
        metrics::describe_histogram!(
            "strata_command_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of cache commands in seconds."
        );
        "strata_command_duration_seconds"
    };
}

/// Timer for measuring command latency.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    #[inline]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed duration since timer creation.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct CommandTimes {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

#[derive(Debug, Default)]
struct MetricsInner {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    dels: AtomicU64,
    errors: AtomicU64,
    commands: DashMap<SmolStr, CommandTimes>,
}

/// Process-local metrics recorder shared by all clones.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder {
    inner: Arc<MetricsInner>,
}

impl MetricsRecorder {
    /// Create a fresh recorder with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cache hit.
    pub fn record_hit(&self) {
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!(*CACHE_HIT_COUNTER).increment(1);
    }

    /// Record a cache miss.
    pub fn record_miss(&self) {
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!(*CACHE_MISS_COUNTER).increment(1);
    }

    /// Record a cache write.
    pub fn record_set(&self) {
        self.inner.sets.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!(*CACHE_SET_COUNTER).increment(1);
    }

    /// Record a cache delete.
    pub fn record_del(&self) {
        self.inner.dels.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!(*CACHE_DEL_COUNTER).increment(1);
    }

    /// Record a command error.
    pub fn record_error(&self, command: &str) {
        self.inner.errors.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!(*COMMAND_ERROR_COUNTER, "command" => command.to_string()).increment(1);
        #[cfg(not(feature = "metrics"))]
        let _ = command;
    }

    /// Record the duration of a completed command and return it.
    pub fn record_command_time(&self, command: impl Into<SmolStr>, elapsed: Duration) -> Duration {
        let command = command.into();
        self.inner
            .commands
            .entry(command.clone())
            .and_modify(|times| {
                times.count += 1;
                times.total += elapsed;
                times.min = times.min.min(elapsed);
                times.max = times.max.max(elapsed);
            })
            .or_insert(CommandTimes {
                count: 1,
                total: elapsed,
                min: elapsed,
                max: elapsed,
            });
        #[cfg(feature = "metrics")]
        metrics::histogram!(*COMMAND_DURATION, "command" => command.to_string())
            .record(elapsed.as_secs_f64());
        elapsed
    }

    /// Take an immutable snapshot of all counters and latency aggregates.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let hit_ratio = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        };
        let commands = self
            .inner
            .commands
            .iter()
            .map(|entry| {
                let times = *entry.value();
                (
                    entry.key().to_string(),
                    CommandStats {
                        count: times.count,
                        total: times.total,
                        min: times.min,
                        max: times.max,
                        avg: times.total / times.count.max(1) as u32,
                    },
                )
            })
            .collect();
        MetricsSnapshot {
            cache_hit: hits,
            cache_miss: misses,
            cache_set: self.inner.sets.load(Ordering::Relaxed),
            cache_del: self.inner.dels.load(Ordering::Relaxed),
            command_errors: self.inner.errors.load(Ordering::Relaxed),
            hit_ratio,
            commands,
        }
    }

    /// Reset all counters and latency aggregates to zero.
    pub fn reset(&self) {
        self.inner.hits.store(0, Ordering::Relaxed);
        self.inner.misses.store(0, Ordering::Relaxed);
        self.inner.sets.store(0, Ordering::Relaxed);
        self.inner.dels.store(0, Ordering::Relaxed);
        self.inner.errors.store(0, Ordering::Relaxed);
        self.inner.commands.clear();
    }
}

/// Immutable view of the recorder at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Number of cache hits.
    pub cache_hit: u64,
    /// Number of cache misses.
    pub cache_miss: u64,
    /// Number of cache writes.
    pub cache_set: u64,
    /// Number of cache deletes.
    pub cache_del: u64,
    /// Number of command errors.
    pub command_errors: u64,
    /// `cache_hit / (cache_hit + cache_miss)`, `0.0` when no lookups occurred.
    pub hit_ratio: f64,
    /// Latency aggregates keyed by command label.
    pub commands: BTreeMap<String, CommandStats>,
}

/// Latency aggregate for a single command label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandStats {
    /// Number of recorded invocations.
    pub count: u64,
    /// Sum of all durations.
    pub total: Duration,
    /// Smallest recorded duration.
    pub min: Duration,
    /// Largest recorded duration.
    pub max: Duration,
    /// `total / count`.
    pub avg: Duration,
}
