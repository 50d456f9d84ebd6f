//! Error types for cache operations.

use std::time::Duration;

use smol_str::SmolStr;

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::value::CodecError;

/// Boxed error type used for driver and callback error sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for public cache client operations.
///
/// Every failed operation carries the command name and the underlying cause.
/// Write-behind background failures are the one exception: they are only
/// observable through metrics and logs, never through this type (a documented
/// tradeoff of that strategy, not a bug).
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Malformed or incomplete configuration. Fatal at construction.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The store is unreachable and the retry budget is exhausted.
    #[error("command `{command}`: connection failed: {source}")]
    Connection {
        /// The logical command that observed the failure.
        command: SmolStr,
        /// Underlying driver error.
        source: BoxError,
    },

    /// A single command exceeded its deadline. Recoverable; the caller may
    /// retry.
    #[error("command `{command}` timed out after {timeout:?}")]
    Timeout {
        /// The logical command that timed out.
        command: SmolStr,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// A value could not be encoded or decoded. Never retried.
    #[error(transparent)]
    Serialization(#[from] CodecError),

    /// The caller-supplied loader failed. Loaders signal "not found" by
    /// returning `None`; an error here is unrecoverable for that `get`.
    #[error("loader failed for key `{key}`: {source}")]
    Loader {
        /// Logical key the loader was invoked for.
        key: String,
        /// Error returned by the loader.
        source: BoxError,
    },

    /// The caller-supplied writer failed under write-through.
    #[error("writer failed for key `{key}`: {source}")]
    Writer {
        /// Logical key the writer was invoked for.
        key: String,
        /// Error returned by the writer.
        source: BoxError,
    },

    /// A strategy was configured without its required callback. Fatal at
    /// construction, never at call time.
    #[error("invalid client configuration: {0}")]
    Validation(&'static str),

    /// The server rejected or failed a command.
    #[error("command `{command}` failed: {source}")]
    Command {
        /// The logical command that failed.
        command: SmolStr,
        /// Underlying driver error.
        source: BoxError,
    },
}

impl CacheError {
    /// Map a store-level error onto the command that triggered it.
    pub(crate) fn from_store(command: &'static str, err: StoreError, timeout: Duration) -> Self {
        let command = SmolStr::new_static(command);
        match err {
            StoreError::Connection(source) => Self::Connection { command, source },
            StoreError::Timeout => Self::Timeout { command, timeout },
            StoreError::Command(source) => Self::Command { command, source },
            StoreError::Closed => Self::Connection {
                command,
                source: Box::new(StoreError::Closed),
            },
        }
    }
}
