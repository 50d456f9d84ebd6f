//! Managed-cache provider detection and defaults.
//!
//! Hosts of known managed providers need TLS and, for some providers, an
//! account-derived username. Normalization runs on the merged draft so it
//! only fills fields no higher-precedence source has set, and it is
//! idempotent: applying it twice yields the same draft.

use super::resolve::Draft;

/// Managed cache provider recognized by its host suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Azure Cache for Redis (`*.redis.cache.windows.net`).
    AzureCache,
    /// AWS ElastiCache with in-transit encryption (`*.cache.amazonaws.com`).
    AwsElastiCache,
}

impl Provider {
    /// Detect a provider from a hostname.
    pub fn detect(host: &str) -> Option<Self> {
        if host.ends_with(".redis.cache.windows.net") {
            Some(Self::AzureCache)
        } else if host.ends_with(".cache.amazonaws.com") {
            Some(Self::AwsElastiCache)
        } else {
            None
        }
    }

    /// Port used for TLS connections when none was configured.
    pub fn tls_port(&self) -> u16 {
        match self {
            Self::AzureCache => 6380,
            Self::AwsElastiCache => 6379,
        }
    }
}

/// Apply provider defaults to a merged draft. Idempotent.
pub(crate) fn normalize(draft: &mut Draft) {
    let Some(host) = draft.host.clone() else {
        return;
    };
    let Some(provider) = Provider::detect(&host) else {
        return;
    };

    draft.tls_enabled = Some(true);
    draft.servername = Some(host.clone());
    if draft.port.is_none() {
        draft.port = Some(provider.tls_port());
    }
    // Azure authenticates with the cache name as username and the access
    // key as password.
    if provider == Provider::AzureCache && draft.username.is_none() {
        draft.username = host.split('.').next().map(str::to_owned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn detects_known_suffixes() {
        assert_eq!(
            Provider::detect("mycache.redis.cache.windows.net"),
            Some(Provider::AzureCache)
        );
        assert_eq!(
            Provider::detect("mygroup.abc123.use1.cache.amazonaws.com"),
            Some(Provider::AwsElastiCache)
        );
        assert_eq!(Provider::detect("redis.internal"), None);
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut draft = Draft {
            host: Some("mycache.redis.cache.windows.net".to_owned()),
            ..Draft::default()
        };
        normalize(&mut draft);
        let once = draft.clone();
        normalize(&mut draft);
        assert_eq!(draft, once);

        assert_eq!(draft.tls_enabled, Some(true));
        assert_eq!(draft.port, Some(6380));
        assert_eq!(draft.username.as_deref(), Some("mycache"));
        assert_eq!(
            draft.servername.as_deref(),
            Some("mycache.redis.cache.windows.net")
        );
    }

    #[test]
    fn explicit_port_and_username_win() {
        let mut draft = Draft {
            host: Some("mycache.redis.cache.windows.net".to_owned()),
            port: Some(7000),
            username: Some("custom".to_owned()),
            ..Draft::default()
        };
        normalize(&mut draft);
        assert_eq!(draft.port, Some(7000));
        assert_eq!(draft.username.as_deref(), Some("custom"));
    }
}
