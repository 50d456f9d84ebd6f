//! Connection modes and supervised connection establishment.
//!
//! A [`ConnectionMode`] describes the target topology: a single server or a
//! cluster. [`establish`] turns a mode into a live connection, applying the
//! configured backoff policy and publishing state transitions on a `watch`
//! channel owned by the store.

use redis::aio::ConnectionManager;
use redis::{Cmd, ConnectionInfo, IntoConnectionInfo, Pipeline, RedisFuture};
use strata::config::CacheConfig;
use strata::retry::RetryPolicy;
use strata::store::{ConnectionState, StoreError};
use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;

/// Connection settings for a single (non-clustered) server.
#[derive(Debug, Clone)]
pub struct SingleConfig {
    pub(crate) info: ConnectionInfo,
}

impl SingleConfig {
    /// Target a server by URL (`redis://` or `rediss://`).
    pub fn url(url: impl AsRef<str>) -> Result<Self, Error> {
        let info = url.as_ref().into_connection_info()?;
        Ok(Self { info })
    }
}

/// Connection settings for a clustered deployment.
#[cfg(feature = "cluster")]
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub(crate) nodes: Vec<ConnectionInfo>,
    pub(crate) read_from_replicas: bool,
}

/// Target topology of a [`RedisStore`](crate::RedisStore).
#[derive(Debug, Clone)]
pub enum ConnectionMode {
    /// Single server.
    Single(SingleConfig),
    /// Clustered deployment; reads may be served by replicas when
    /// configured, writes are routed to the owning shard's primary.
    #[cfg(feature = "cluster")]
    Cluster(ClusterConfig),
}

impl ConnectionMode {
    /// Single-server mode from a URL.
    pub fn single(url: impl AsRef<str>) -> Result<Self, Error> {
        Ok(Self::Single(SingleConfig::url(url)?))
    }

    /// Cluster mode from seed node URLs.
    #[cfg(feature = "cluster")]
    pub fn cluster(
        urls: impl IntoIterator<Item = impl AsRef<str>>,
        read_from_replicas: bool,
    ) -> Result<Self, Error> {
        let nodes = urls
            .into_iter()
            .map(|url| url.as_ref().into_connection_info())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Cluster(ClusterConfig {
            nodes,
            read_from_replicas,
        }))
    }

    /// Derive the mode from a resolved [`CacheConfig`].
    pub fn from_config(config: &CacheConfig) -> Result<Self, Error> {
        if config.cluster.enabled {
            #[cfg(feature = "cluster")]
            {
                let nodes = config
                    .cluster
                    .nodes
                    .iter()
                    .map(|node| connection_info(config, &node.host, node.port))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Self::Cluster(ClusterConfig {
                    nodes,
                    read_from_replicas: config.cluster.read_from_replicas,
                }));
            }
            #[cfg(not(feature = "cluster"))]
            return Err(Error::ClusterFeatureDisabled);
        }
        let info = connection_info(config, &config.connection.host, config.connection.port)?;
        Ok(Self::Single(SingleConfig { info }))
    }
}

/// Build the `redis://`/`rediss://` URL for one target.
///
/// Credentials go through the `url` crate so reserved characters are
/// percent-encoded; the driver decodes them when parsing the URL. For
/// TLS targets the config resolver guarantees `servername == host`, so the
/// URL host serves both dialing and SNI.
fn connection_url(config: &CacheConfig, host: &str, port: u16) -> Result<Url, Error> {
    let scheme = if config.connection.tls.enabled {
        "rediss"
    } else {
        "redis"
    };
    let mut url = Url::parse(&format!(
        "{scheme}://{host}:{port}/{db}",
        db = config.connection.db
    ))
    .map_err(|err| Error::InvalidTarget(err.to_string()))?;
    if let Some(username) = &config.connection.username {
        url.set_username(username)
            .map_err(|()| Error::InvalidTarget("username rejected".to_owned()))?;
    }
    if let Some(password) = &config.connection.password {
        url.set_password(Some(password))
            .map_err(|()| Error::InvalidTarget("password rejected".to_owned()))?;
    }
    Ok(url)
}

fn connection_info(config: &CacheConfig, host: &str, port: u16) -> Result<ConnectionInfo, Error> {
    Ok(connection_url(config, host, port)?
        .as_str()
        .into_connection_info()?)
}

/// Live connection handle; clones share the underlying multiplexed link.
#[derive(Clone)]
pub(crate) enum ManagedConnection {
    Single(ConnectionManager),
    #[cfg(feature = "cluster")]
    Cluster(redis::cluster_async::ClusterConnection),
}

impl redis::aio::ConnectionLike for ManagedConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, redis::Value> {
        match self {
            Self::Single(conn) => conn.req_packed_command(cmd),
            #[cfg(feature = "cluster")]
            Self::Cluster(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        pipeline: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<redis::Value>> {
        match self {
            Self::Single(conn) => conn.req_packed_commands(pipeline, offset, count),
            #[cfg(feature = "cluster")]
            Self::Cluster(conn) => conn.req_packed_commands(pipeline, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            Self::Single(conn) => conn.get_db(),
            #[cfg(feature = "cluster")]
            Self::Cluster(_) => 0,
        }
    }
}

async fn try_connect(mode: &ConnectionMode) -> Result<ManagedConnection, redis::RedisError> {
    match mode {
        ConnectionMode::Single(config) => {
            let client = redis::Client::open(config.info.clone())?;
            let manager = client.get_connection_manager().await?;
            Ok(ManagedConnection::Single(manager))
        }
        #[cfg(feature = "cluster")]
        ConnectionMode::Cluster(config) => {
            let mut builder = redis::cluster::ClusterClient::builder(config.nodes.clone());
            if config.read_from_replicas {
                builder = builder.read_from_replicas();
            }
            let client = builder.build()?;
            let connection = client.get_async_connection().await?;
            Ok(ManagedConnection::Cluster(connection))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(tls: bool) -> CacheConfig {
        let mut config = CacheConfig::default();
        config.connection.tls.enabled = tls;
        config
    }

    #[test]
    fn plain_target_builds_a_redis_url() {
        let url = connection_url(&config(false), "cache.internal", 6379).unwrap();
        assert_eq!(url.as_str(), "redis://cache.internal:6379/0");
        assert!(url.as_str().into_connection_info().is_ok());
    }

    #[test]
    fn tls_target_uses_the_secure_scheme() {
        let mut config = config(true);
        config.connection.db = 2;
        let url = connection_url(&config, "cache.example.com", 6380).unwrap();
        assert_eq!(url.as_str(), "rediss://cache.example.com:6380/2");
    }

    #[test]
    fn credentials_with_reserved_characters_are_encoded() {
        let mut config = config(false);
        config.connection.username = Some("billing".to_owned());
        config.connection.password = Some("p@ss:word/1".to_owned());
        let url = connection_url(&config, "cache.internal", 6379).unwrap();
        assert_eq!(url.username(), "billing");
        assert_eq!(url.password(), Some("p%40ss%3Aword%2F1"));
        // The driver parses and decodes the URL form.
        assert!(url.as_str().into_connection_info().is_ok());
    }
}

/// Connect with exponential backoff, publishing state transitions.
///
/// Gives up with [`StoreError::Connection`] after `retry.max_retries`
/// consecutive failures.
pub(crate) async fn establish(
    mode: &ConnectionMode,
    retry: &RetryPolicy,
    state: &watch::Sender<ConnectionState>,
) -> Result<ManagedConnection, StoreError> {
    state.send_replace(ConnectionState::Connecting);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match try_connect(mode).await {
            Ok(connection) => {
                state.send_replace(ConnectionState::Connected);
                debug!(attempt, "connected");
                return Ok(connection);
            }
            Err(err) if attempt > retry.max_retries => {
                state.send_replace(ConnectionState::Disconnected);
                warn!(attempt, error = %err, "connection retries exhausted");
                return Err(StoreError::Connection(Box::new(err)));
            }
            Err(err) => {
                let delay = retry.delay(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "connect failed, backing off"
                );
                state.send_replace(ConnectionState::Reconnecting);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
