//! Connection retry policy with exponential backoff and jitter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff policy applied to connection attempts.
///
/// The delay before retry attempt `n` (1-based) is
/// `min(initial_delay * factor^(n-1) * (1 + rand() * jitter), max_delay)`.
/// Jitter perturbs each delay upward by at most the configured fraction to
/// avoid synchronized retry storms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of consecutive retries before giving up.
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(rename = "initial_delay_ms", with = "duration_ms")]
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub factor: f64,
    /// Random inflation fraction in `[0, jitter]` applied per delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            factor: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Deterministic delay for the given attempt, before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_delay
            .mul_f64(self.factor.powi(attempt.saturating_sub(1) as i32));
        exp.min(self.max_delay)
    }

    /// Jittered delay for the given attempt (1-based), capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_delay
            .mul_f64(self.factor.powi(attempt.saturating_sub(1) as i32));
        let jittered = if self.jitter > 0.0 {
            exp.mul_f64(1.0 + fastrand::f64() * self.jitter)
        } else {
            exp
        };
        jittered.min(self.max_delay)
    }
}

/// Serialize/deserialize a `Duration` as integer milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            factor: 2.0,
            jitter: 0.1,
        }
    }

    #[test]
    fn base_delays_double_then_cap() {
        let policy = policy();
        let delays: Vec<u64> = (1..=5)
            .map(|n| policy.base_delay(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000]);
    }

    #[test]
    fn jitter_inflates_by_at_most_the_configured_fraction() {
        let policy = policy();
        for attempt in 1..=5 {
            let base = policy.base_delay(attempt);
            for _ in 0..50 {
                let delay = policy.delay(attempt);
                assert!(delay <= policy.max_delay);
                assert!(delay >= base.min(policy.max_delay));
                assert!(delay <= base.mul_f64(1.0 + policy.jitter).min(policy.max_delay));
            }
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..policy()
        };
        assert_eq!(policy.delay(3), Duration::from_millis(400));
    }
}
