//! Configuration resolution: file, environment, connection string, defaults.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::retry::RetryPolicy;

use super::{
    CacheConfig, CacheOptions, ClusterConfig, ConfigError, ConnectionConfig, TlsConfig,
    connection_string, provider,
};

/// Environment variable names honored by [`resolve`].
const ENV_HOST: &str = "STRATA_HOST";
const ENV_PORT: &str = "STRATA_PORT";
const ENV_USERNAME: &str = "STRATA_USERNAME";
const ENV_PASSWORD: &str = "STRATA_PASSWORD";
const ENV_DB: &str = "STRATA_DB";
const ENV_TLS: &str = "STRATA_TLS";
const ENV_KEY_PREFIX: &str = "STRATA_KEY_PREFIX";
const ENV_DEFAULT_TTL: &str = "STRATA_DEFAULT_TTL";

/// Resolve a [`CacheConfig`] from an optional file, process environment
/// variables and an optional connection string.
///
/// A missing file is not an error; a file that exists but does not parse is.
pub fn resolve(
    file: Option<&Path>,
    connection_string: Option<&str>,
) -> Result<CacheConfig, ConfigError> {
    resolve_with_env(file, connection_string, |name| std::env::var(name).ok())
}

/// Like [`resolve`], with an injectable environment lookup for tests.
pub fn resolve_with_env(
    file: Option<&Path>,
    connection_string: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<CacheConfig, ConfigError> {
    let file_config = match file {
        Some(path) if path.exists() => Some(load_file(path)?),
        Some(path) => {
            debug!(path = %path.display(), "config file not found, using defaults");
            None
        }
        None => None,
    };

    let mut draft = Draft::from_file(file_config.as_ref());
    draft.apply_env(&env)?;
    if let Some(raw) = connection_string {
        draft.apply_parts(connection_string::parse(raw)?);
    }
    provider::normalize(&mut draft);
    draft.finalize(file_config)
}

fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    serde_saphyr::from_str(&contents).map_err(|err| ConfigError::Parse {
        path: path.to_owned(),
        message: err.to_string(),
    })
}

/// File shape: every field optional, unknown sections ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    connection: FileConnection,
    retry: Option<RetryPolicy>,
    cluster: Option<ClusterConfig>,
    cache: FileCache,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConnection {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    db: Option<i64>,
    tls: FileTls,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileTls {
    enabled: Option<bool>,
    servername: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileCache {
    default_ttl_secs: Option<u64>,
    key_prefix: Option<String>,
}

/// Merged overridable fields; `None` means "no source specified it yet".
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Draft {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: Option<i64>,
    pub tls_enabled: Option<bool>,
    pub servername: Option<String>,
    pub key_prefix: Option<String>,
    pub default_ttl: Option<Duration>,
}

impl Draft {
    fn from_file(file: Option<&FileConfig>) -> Self {
        let Some(file) = file else {
            return Self::default();
        };
        Self {
            host: file.connection.host.clone(),
            port: file.connection.port,
            username: file.connection.username.clone(),
            password: file.connection.password.clone(),
            db: file.connection.db,
            tls_enabled: file.connection.tls.enabled,
            servername: file.connection.tls.servername.clone(),
            key_prefix: file.cache.key_prefix.clone(),
            default_ttl: file.cache.default_ttl_secs.map(Duration::from_secs),
        }
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(host) = env(ENV_HOST) {
            self.host = Some(host);
        }
        if let Some(port) = env(ENV_PORT) {
            self.port = Some(parse_env(ENV_PORT, &port)?);
        }
        if let Some(username) = env(ENV_USERNAME) {
            self.username = Some(username);
        }
        if let Some(password) = env(ENV_PASSWORD) {
            self.password = Some(password);
        }
        if let Some(db) = env(ENV_DB) {
            self.db = Some(parse_env(ENV_DB, &db)?);
        }
        if let Some(tls) = env(ENV_TLS) {
            self.tls_enabled = Some(parse_bool(ENV_TLS, &tls)?);
        }
        if let Some(prefix) = env(ENV_KEY_PREFIX) {
            self.key_prefix = Some(prefix);
        }
        if let Some(ttl) = env(ENV_DEFAULT_TTL) {
            let secs: u64 = parse_env(ENV_DEFAULT_TTL, &ttl)?;
            self.default_ttl = Some(Duration::from_secs(secs));
        }
        Ok(())
    }

    fn apply_parts(&mut self, parts: connection_string::ConnectionStringParts) {
        if parts.host.is_some() {
            self.host = parts.host;
        }
        if parts.port.is_some() {
            self.port = parts.port;
        }
        if parts.username.is_some() {
            self.username = parts.username;
        }
        if parts.password.is_some() {
            self.password = parts.password;
        }
        if parts.db.is_some() {
            self.db = parts.db;
        }
        if parts.tls.is_some() {
            self.tls_enabled = parts.tls;
        }
    }

    fn finalize(self, file: Option<FileConfig>) -> Result<CacheConfig, ConfigError> {
        let host = self.host.unwrap_or_else(|| "127.0.0.1".to_owned());

        // Managed providers authenticate with an access key; refuse to build
        // a config that cannot possibly connect.
        if provider::Provider::detect(&host).is_some() && self.password.is_none() {
            return Err(ConfigError::MissingField("connection.password"));
        }

        let tls_enabled = self.tls_enabled.unwrap_or(false);
        let servername = tls_enabled.then(|| {
            self.servername
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| host.clone())
        });

        let (retry, cluster) = match file {
            Some(file) => (
                file.retry.unwrap_or_default(),
                file.cluster.unwrap_or_default(),
            ),
            None => (RetryPolicy::default(), ClusterConfig::default()),
        };
        if cluster.enabled && cluster.nodes.is_empty() {
            return Err(ConfigError::MissingField("cluster.nodes"));
        }

        Ok(CacheConfig {
            connection: ConnectionConfig {
                host,
                port: self.port.unwrap_or(6379),
                username: self.username,
                password: self.password,
                tls: TlsConfig {
                    enabled: tls_enabled,
                    servername,
                },
                db: self.db.unwrap_or(0),
            },
            retry,
            cluster,
            cache: CacheOptions {
                default_ttl: self.default_ttl,
                key_prefix: self.key_prefix,
            },
        })
    }
}

fn parse_env<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        field,
        value: value.to_owned(),
    })
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field,
            value: value.to_owned(),
        }),
    }
}
