//! Cache client configuration.
//!
//! A [`CacheConfig`] is resolved once, before the client is constructed, by
//! merging up to four sources. Precedence, highest to lowest:
//!
//! 1. explicit connection-string fields
//! 2. environment variables (`STRATA_*`)
//! 3. file values (YAML)
//! 4. built-in defaults
//!
//! After merging, hosts of known managed-cache providers get that provider's
//! defaults applied (TLS forced on, the TLS port when no port was given,
//! the account name as username). The resolved config is immutable for the
//! lifetime of the client; there is no hot reload.
//!
//! ```no_run
//! use strata::config;
//!
//! let cfg = config::resolve(Some("strata.yaml".as_ref()), None)?;
//! assert_eq!(cfg.connection.port, 6379);
//! # Ok::<(), strata::config::ConfigError>(())
//! ```

mod connection_string;
mod provider;
mod resolve;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

pub use provider::Provider;
pub use resolve::{resolve, resolve_with_env};

/// Error type for configuration resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file `{path}`: {source}")]
    Io {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file exists but is not parseable.
    #[error("failed to parse config file `{path}`: {message}")]
    Parse {
        /// Path of the offending file.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// An override carries a value of the wrong shape.
    #[error("invalid value for `{field}`: `{value}`")]
    InvalidValue {
        /// Field or environment variable name.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A required field is still missing after all overrides were applied.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// The connection string does not match any accepted format.
    #[error("malformed connection string: {0}")]
    ConnectionString(String),
}

/// Fully resolved cache client configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Connection target and credentials.
    pub connection: ConnectionConfig,
    /// Backoff policy for connection attempts.
    pub retry: RetryPolicy,
    /// Cluster topology settings.
    pub cluster: ClusterConfig,
    /// Cache behavior options.
    pub cache: CacheOptions,
}

/// Connection target, credentials and TLS settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Username, when the server requires authentication.
    pub username: Option<String>,
    /// Password, when the server requires authentication.
    pub password: Option<String>,
    /// TLS settings.
    pub tls: TlsConfig,
    /// Logical database index.
    pub db: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 6379,
            username: None,
            password: None,
            tls: TlsConfig::default(),
            db: 0,
        }
    }
}

/// TLS settings.
///
/// Invariant: whenever `enabled` is true the resolver guarantees a non-empty
/// `servername` equal to the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Whether to negotiate TLS.
    pub enabled: bool,
    /// Server name for SNI and certificate validation.
    pub servername: Option<String>,
}

/// Cluster topology settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Whether the target is a clustered deployment.
    pub enabled: bool,
    /// Seed nodes. Required (non-empty) when `enabled` is true.
    pub nodes: Vec<NodeAddr>,
    /// Allow read commands to be served by replicas.
    ///
    /// Reads may then observe slightly stale data (eventual consistency);
    /// writes always target the primary for the owning shard.
    pub read_from_replicas: bool,
}

/// Address of a single cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddr {
    /// Node hostname.
    pub host: String,
    /// Node port.
    pub port: u16,
}

/// Cache behavior options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// TTL applied to writes that do not specify one.
    #[serde(rename = "default_ttl_secs", with = "opt_duration_secs")]
    pub default_ttl: Option<Duration>,
    /// Namespace prefix prepended to every key.
    pub key_prefix: Option<String>,
}

/// Serialize/deserialize an `Option<Duration>` as integer seconds.
mod opt_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
