//! Configuration for the origin server and the client cache.
//!
//! Loaded from `~/.newsdesk/config.json` (or an explicit path). A missing
//! file yields defaults; every section is `#[serde(default)]` so partial files
//! are fine. Selected values can be overridden from the environment, which is
//! read after `.env` has been loaded by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::config::ServerConfig;
use crate::error::{NewsError, Result};
use crate::news::PAGE_SIZE;

/// Default upstream REST base.
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub origin: OriginConfig,
    pub server: ServerConfig,
    pub client: ClientConfig,
}

/// Upstream news provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// API token appended as `token=`. Empty means unauthenticated.
    pub api_key: String,
    pub timeout_secs: u64,
    /// The domestic feed is broadened with generic business news up to this many items.
    pub domestic_min_items: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            api_key: String::new(),
            timeout_secs: 30,
            domestic_min_items: 40,
        }
    }
}

/// Origin cache and pagination settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Origin TTL in milliseconds.
    pub cache_duration_ms: i64,
    /// How long a rate-limit flag sticks before a fetch is retried.
    pub rate_limit_reset_ms: i64,
    pub page_size: usize,
    /// Cap on items kept from the streaming ingest path.
    pub streamed_items_cap: usize,
    /// How often the SSE endpoint re-pushes the item set.
    pub push_interval_secs: u64,
    pub keep_alive_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            cache_duration_ms: 60 * 60 * 1000,
            rate_limit_reset_ms: 24 * 60 * 60 * 1000,
            page_size: PAGE_SIZE,
            streamed_items_cap: 50,
            push_interval_secs: 5 * 60,
            keep_alive_secs: 30,
        }
    }
}

impl OriginConfig {
    pub fn push_interval(&self) -> Duration {
        Duration::from_secs(self.push_interval_secs.max(1))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }
}

/// Client cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the paginated read API.
    pub server_url: String,
    /// Client snapshot expiry in milliseconds.
    pub cache_expiry_ms: i64,
    /// Minimum spacing between two outbound page requests.
    pub throttle_delay_ms: u64,
    /// Directory holding cache snapshots. `None` means `~/.newsdesk/cache`.
    pub storage_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8787".to_string(),
            cache_expiry_ms: 3 * 60 * 60 * 1000,
            throttle_delay_ms: 1000,
            storage_dir: None,
        }
    }
}

impl ClientConfig {
    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_delay_ms)
    }

    pub fn resolved_storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(|| Config::dir().join("cache"))
    }
}

impl Config {
    /// `~/.newsdesk`, or `./.newsdesk` when no home directory is known.
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".newsdesk")
    }

    /// Default config file location.
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data)
                .map_err(|e| NewsError::Config(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(NewsError::Config(format!("{}: {}", path.display(), e))),
        }
    }

    /// Load from an explicit path or the default location, then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from_path(p)?,
            None => Self::load_from_path(&Self::path())?,
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `NEWSDESK_*` overrides read through `get`.
    ///
    /// Takes a lookup function instead of reading the process environment so
    /// tests do not race on global state.
    pub fn apply_env_overrides<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = get("NEWSDESK_UPSTREAM_API_KEY").or_else(|| get("FINNHUB_API_KEY")) {
            self.upstream.api_key = key;
        }
        if let Some(url) = get("NEWSDESK_UPSTREAM_BASE_URL") {
            self.upstream.base_url = url;
        }
        if let Some(bind) = get("NEWSDESK_SERVER_BIND") {
            self.server.bind = bind;
        }
        if let Some(port) = get("NEWSDESK_SERVER_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| NewsError::Config(format!("invalid NEWSDESK_SERVER_PORT: {port}")))?;
        }
        if let Some(url) = get("NEWSDESK_CLIENT_SERVER_URL") {
            self.client.server_url = url;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.origin.page_size == 0 {
            return Err(NewsError::Config("origin.page_size must be at least 1".into()));
        }
        if self.origin.cache_duration_ms < 0 || self.origin.rate_limit_reset_ms < 0 {
            return Err(NewsError::Config("origin durations must not be negative".into()));
        }
        url::Url::parse(&self.upstream.base_url)
            .map_err(|e| NewsError::Config(format!("upstream.base_url: {e}")))?;
        url::Url::parse(&self.client.server_url)
            .map_err(|e| NewsError::Config(format!("client.server_url: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.origin.cache_duration_ms, 3_600_000);
        assert_eq!(cfg.origin.rate_limit_reset_ms, 86_400_000);
        assert_eq!(cfg.origin.page_size, 10);
        assert_eq!(cfg.client.cache_expiry_ms, 10_800_000);
        assert_eq!(cfg.client.throttle_delay_ms, 1000);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::load_from_path(&tmp.path().join("nope.json")).unwrap();
        assert_eq!(cfg.upstream.base_url, DEFAULT_UPSTREAM_BASE_URL);
    }

    #[test]
    fn test_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"origin":{"page_size":5},"server":{"port":9000}}"#).unwrap();
        let cfg = Config::load_from_path(&path).unwrap();
        assert_eq!(cfg.origin.page_size, 5);
        assert_eq!(cfg.origin.streamed_items_cap, 50);
        assert_eq!(cfg.server.port, 9000);
    }

    #[test]
    fn test_corrupt_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Config::load_from_path(&path),
            Err(NewsError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("FINNHUB_API_KEY", "fallback-key"),
            ("NEWSDESK_SERVER_PORT", "9100"),
            ("NEWSDESK_CLIENT_SERVER_URL", "http://10.0.0.2:9100"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.upstream.api_key, "fallback-key");
        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.client.server_url, "http://10.0.0.2:9100");
    }

    #[test]
    fn test_bad_port_override_rejected() {
        let mut cfg = Config::default();
        let result = cfg.apply_env_overrides(|k| {
            (k == "NEWSDESK_SERVER_PORT").then(|| "eighty".to_string())
        });
        assert!(matches!(result, Err(NewsError::Config(_))));
    }
}
