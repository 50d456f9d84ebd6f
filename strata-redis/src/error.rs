//! Error types for the Redis store.
//!
//! All errors convert to [`StoreError`] so the core client handles every
//! store uniformly.

use redis::RedisError;
use strata::StoreError;

/// Error type for Redis store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error from the underlying Redis client.
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),

    /// Connection mode was not specified when building the store.
    ///
    /// Call [`RedisStoreBuilder::mode`] or [`RedisStoreBuilder::config`]
    /// before [`RedisStoreBuilder::connect`].
    ///
    /// [`RedisStoreBuilder::mode`]: crate::RedisStoreBuilder::mode
    /// [`RedisStoreBuilder::config`]: crate::RedisStoreBuilder::config
    /// [`RedisStoreBuilder::connect`]: crate::RedisStoreBuilder::connect
    #[error("connection mode not specified, call .mode() or .config() before .connect()")]
    MissingConnectionMode,

    /// Cluster mode was requested but the `cluster` feature is disabled.
    #[error("cluster mode requires the `cluster` feature")]
    ClusterFeatureDisabled,

    /// The resolved configuration does not form a valid connection URL.
    #[error("invalid connection target: {0}")]
    InvalidTarget(String),
}

impl From<Error> for StoreError {
    fn from(error: Error) -> Self {
        match error {
            Error::Redis(err) => classify(err),
            other => StoreError::Connection(Box::new(other)),
        }
    }
}

/// Map a driver error onto the store taxonomy.
pub(crate) fn classify(err: RedisError) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else if is_recoverable(&err) {
        StoreError::Connection(Box::new(err))
    } else {
        StoreError::Command(Box::new(err))
    }
}

/// Connection-level faults worth a transparent retry for idempotent reads.
pub(crate) fn is_recoverable(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal()
}

/// A `READONLY` reply: the target is a replica that cannot serve writes,
/// which signals a topology change rather than a fault.
pub(crate) fn is_readonly(err: &RedisError) -> bool {
    err.code() == Some("READONLY")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parse a raw RESP error frame into a `RedisError`.
    fn server_error(frame: &[u8]) -> RedisError {
        match redis::parse_redis_value(frame) {
            Ok(value) => value
                .extract_error()
                .expect_err("an error frame must not parse as a value"),
            Err(err) => err,
        }
    }

    #[test]
    fn readonly_replies_are_detected_by_code() {
        let err = server_error(b"-READONLY You can't write against a read only replica.\r\n");
        assert!(is_readonly(&err));

        let err = server_error(b"-ERR unknown command 'FOO'\r\n");
        assert!(!is_readonly(&err));
    }

    #[test]
    fn server_rejections_classify_as_command_errors() {
        let err = server_error(b"-ERR unknown command 'FOO'\r\n");
        assert!(!is_recoverable(&err));
        assert!(matches!(classify(err), StoreError::Command(_)));
    }
}
