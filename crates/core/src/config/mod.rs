//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SEAMCACHE_*)
//! 2. TOML config file (if SEAMCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Default byte budget for the current cache instance (50 MiB).
pub const DEFAULT_SIZE_BUDGET: u64 = 50 * 1024 * 1024;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SEAMCACHE_*)
/// 2. TOML config file (if SEAMCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite cache database.
    ///
    /// Set via SEAMCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Socket address the proxy listens on.
    ///
    /// Set via SEAMCACHE_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Upstream origin that relative request paths resolve against.
    ///
    /// Set via SEAMCACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Prefix of every cache instance name.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Deployment version. Bumping it installs a new cache instance and
    /// sweeps the old one on activation.
    ///
    /// Set via SEAMCACHE_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Paths under this prefix are never cached.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Path of the cached document served to failed navigations.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Path of the synthetic resource written by `UPDATE_CACHE` messages.
    #[serde(default = "default_data_key")]
    pub data_key: String,

    /// Ceiling on the aggregate body size of the current instance, in bytes.
    ///
    /// Set via SEAMCACHE_SIZE_BUDGET environment variable.
    #[serde(default = "default_size_budget")]
    pub size_budget: u64,

    /// User-Agent string for upstream requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upstream request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes accepted for a single upstream response.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Activate a freshly installed version without waiting.
    #[serde(default = "default_true")]
    pub skip_waiting: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./seamcache.sqlite")
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".into()
}

fn default_origin() -> String {
    "http://127.0.0.1:8080".into()
}

fn default_cache_prefix() -> String {
    "sewing-accountant".into()
}

fn default_cache_version() -> String {
    "v1".into()
}

fn default_api_prefix() -> String {
    "/api/".into()
}

fn default_offline_page() -> String {
    "/offline.html".into()
}

fn default_data_key() -> String {
    "/data.json".into()
}

fn default_size_budget() -> u64 {
    DEFAULT_SIZE_BUDGET
}

fn default_user_agent() -> String {
    "seamcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            listen_addr: default_listen_addr(),
            origin: default_origin(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            api_prefix: default_api_prefix(),
            offline_page: default_offline_page(),
            data_key: default_data_key(),
            size_budget: default_size_budget(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            skip_waiting: true,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Version-qualified name of the current cache instance.
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.cache_version)
    }

    /// Parsed upstream origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute http(s) URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::Invalid { field: "origin".into(), reason: format!("unsupported scheme {other}") }),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SEAMCACHE_`
    /// 2. TOML file from `SEAMCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SEAMCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SEAMCACHE_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
