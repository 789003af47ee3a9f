//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use stagechain_core::{ChainConfig, DEFAULT_STAGE_PATH};

use crate::delivery::{DeliveryPolicy, DEFAULT_CLIENT_MARKER};

/// Default listen address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:8787";

/// Default SQLite database path.
pub const DEFAULT_DB_PATH: &str = "stagechain.db";

/// Configuration for the stagechain server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub addr: String,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Absolute base URL stage paths are appended to. Empty means stage
    /// URLs are relative.
    pub public_url: String,
    /// Substring the client's `User-Agent` must contain.
    pub client_marker: String,
    /// How long generated stages stay readable.
    pub stage_ttl: Duration,
    /// Interval of the expiry purge task.
    pub purge_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            public_url: String::new(),
            client_marker: DEFAULT_CLIENT_MARKER.to_string(),
            stage_ttl: Duration::from_secs(3600),
            purge_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Read configuration from `STAGECHAIN_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            addr: lookup("STAGECHAIN_ADDR").unwrap_or(defaults.addr),
            db_path: lookup("STAGECHAIN_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            public_url: lookup("STAGECHAIN_PUBLIC_URL").unwrap_or(defaults.public_url),
            client_marker: lookup("STAGECHAIN_CLIENT_MARKER")
                .filter(|m| !m.is_empty())
                .unwrap_or(defaults.client_marker),
            stage_ttl: seconds(&lookup, "STAGECHAIN_TTL_SECS", defaults.stage_ttl),
            purge_interval: seconds(&lookup, "STAGECHAIN_PURGE_SECS", defaults.purge_interval),
        }
    }

    /// Chain generation settings derived from this configuration.
    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            stage_ttl: self.stage_ttl,
            stage_url_prefix: format!(
                "{}{}",
                self.public_url.trim_end_matches('/'),
                DEFAULT_STAGE_PATH
            ),
            ..ChainConfig::default()
        }
    }

    /// Delivery policy derived from this configuration.
    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            client_marker: self.client_marker.clone(),
        }
    }
}

fn seconds<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                warn!(key, value = %raw, "invalid duration, using default");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.addr, DEFAULT_ADDR);
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.client_marker, "Roblox");
        assert_eq!(config.stage_ttl, Duration::from_secs(3600));
        assert_eq!(config.purge_interval, Duration::from_secs(60));
        assert_eq!(config.chain_config().stage_url_prefix, "/api/scripts/");
    }

    #[test]
    fn test_reads_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("STAGECHAIN_ADDR", "127.0.0.1:9000"),
            ("STAGECHAIN_DB", "/tmp/x.db"),
            ("STAGECHAIN_PUBLIC_URL", "https://stages.example.com/"),
            ("STAGECHAIN_CLIENT_MARKER", "RobloxStudio"),
            ("STAGECHAIN_TTL_SECS", "120"),
            ("STAGECHAIN_PURGE_SECS", "5"),
        ]));
        assert_eq!(config.addr, "127.0.0.1:9000");
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.stage_ttl, Duration::from_secs(120));
        assert_eq!(config.purge_interval, Duration::from_secs(5));
        assert_eq!(config.delivery_policy().client_marker, "RobloxStudio");

        let chain = config.chain_config();
        assert_eq!(
            chain.stage_url_prefix,
            "https://stages.example.com/api/scripts/"
        );
        assert_eq!(chain.stage_ttl, Duration::from_secs(120));
        assert!(chain.validate().is_ok());
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("STAGECHAIN_TTL_SECS", "an hour"),
            ("STAGECHAIN_PURGE_SECS", "0"),
        ]));
        assert_eq!(config.stage_ttl, Duration::from_secs(3600));
        assert_eq!(config.purge_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_unsafe_public_url_fails_validation() {
        for url in ["https://stages.example.com/a b", "https://stages.example.com/\n"] {
            let config = ServerConfig::from_lookup(lookup(&[("STAGECHAIN_PUBLIC_URL", url)]));
            assert!(config.chain_config().validate().is_err(), "accepted {:?}", url);
        }
    }
}
