// =============================================================================
// Dashboard Configuration — JSON file with serde defaults + env overrides
// =============================================================================
//
// Every field carries a serde default so a partial (or missing) config file
// still yields a runnable service. Secrets are only ever read from the
// environment and never written back out or logged.
// =============================================================================

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_symbols() -> Vec<String> {
    ["dogeusdt", "btcusdt", "ethusdt", "bnbusdt", "xrpusdt", "solusdt"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_feed_url() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}

fn default_feed_reconnect_secs() -> u64 {
    5
}

fn default_broadcast_capacity() -> usize {
    1024
}

fn default_rate_api_url() -> String {
    "https://pro-api.coinmarketcap.com".to_string()
}

fn default_rate_cache_ttl_secs() -> u64 {
    300
}

fn default_klines_api_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_klines_limit() -> u32 {
    1000
}

fn default_interval() -> String {
    "1h".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_database_path() -> String {
    "users.db".to_string()
}

fn default_session_ttl_hours() -> i64 {
    24
}

fn default_password_iterations() -> u32 {
    260_000
}

// =============================================================================
// DashboardConfig
// =============================================================================

/// Top-level configuration for the dashboard service.
#[derive(Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    // --- Server --------------------------------------------------------------

    /// Address the HTTP server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Symbol allow-list, stored lower-case.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    // --- Live feed -----------------------------------------------------------

    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Delay before reconnecting the feed. Zero disables reconnection.
    #[serde(default = "default_feed_reconnect_secs")]
    pub feed_reconnect_secs: u64,

    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    // --- Upstream HTTP APIs --------------------------------------------------

    #[serde(default = "default_rate_api_url")]
    pub rate_api_url: String,

    /// CoinMarketCap API key. Only read from `COINMARKETCAP_API_KEY`.
    #[serde(skip)]
    pub rate_api_key: String,

    /// Freshness window for cached conversion rates.
    #[serde(default = "default_rate_cache_ttl_secs")]
    pub rate_cache_ttl_secs: u64,

    #[serde(default = "default_klines_api_url")]
    pub klines_api_url: String,

    /// Rows requested per klines call. Binance caps this at 1000.
    #[serde(default = "default_klines_limit")]
    pub klines_limit: u32,

    #[serde(default = "default_interval")]
    pub default_interval: String,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    // --- Accounts ------------------------------------------------------------

    /// SQLite file holding the user table.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,

    #[serde(default = "default_password_iterations")]
    pub password_iterations: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            symbols: default_symbols(),
            feed_url: default_feed_url(),
            feed_reconnect_secs: default_feed_reconnect_secs(),
            broadcast_capacity: default_broadcast_capacity(),
            rate_api_url: default_rate_api_url(),
            rate_api_key: String::new(),
            rate_cache_ttl_secs: default_rate_cache_ttl_secs(),
            klines_api_url: default_klines_api_url(),
            klines_limit: default_klines_limit(),
            default_interval: default_interval(),
            http_timeout_secs: default_http_timeout_secs(),
            database_path: default_database_path(),
            session_ttl_hours: default_session_ttl_hours(),
            password_iterations: default_password_iterations(),
        }
    }
}

impl std::fmt::Debug for DashboardConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardConfig")
            .field("bind_addr", &self.bind_addr)
            .field("symbols", &self.symbols)
            .field("feed_url", &self.feed_url)
            .field("rate_api_url", &self.rate_api_url)
            .field("rate_api_key", &"<redacted>")
            .field("rate_cache_ttl_secs", &self.rate_cache_ttl_secs)
            .field("klines_api_url", &self.klines_api_url)
            .field("database_path", &self.database_path)
            .finish_non_exhaustive()
    }
}

impl DashboardConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so the caller can fall back to defaults
    /// with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dashboard config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse dashboard config from {}", path.display()))?;

        info!(path = %path.display(), symbols = ?config.symbols, "dashboard config loaded");
        Ok(config.normalised())
    }

    /// Apply environment overrides on top of the file/default values.
    pub fn apply_env(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self.normalised()
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("DASHBOARD_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(syms) = lookup("DASHBOARD_SYMBOLS") {
            self.symbols = syms
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(path) = lookup("DASHBOARD_DB_PATH") {
            self.database_path = path;
        }
        if let Some(key) = lookup("COINMARKETCAP_API_KEY") {
            self.rate_api_key = key;
        }
    }

    fn normalised(mut self) -> Self {
        let mut seen = HashSet::new();
        self.symbols = self
            .symbols
            .iter()
            .map(|s| s.to_lowercase())
            .filter(|s| seen.insert(s.clone()))
            .collect();
        if self.symbols.is_empty() {
            self.symbols = default_symbols();
        }
        self
    }

    /// Whether `symbol` is on the allow-list (case-insensitive).
    pub fn is_allowed(&self, symbol: &str) -> bool {
        let lower = symbol.to_lowercase();
        self.symbols.iter().any(|s| *s == lower)
    }

    pub fn rate_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.rate_cache_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }
}
