//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PIGGYBANK_SW_*)
//! 2. TOML config file (if PIGGYBANK_SW_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The defaults describe the deployed worker; bump `version` whenever the
//! static assets change or stale content keeps being served.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PIGGYBANK_SW_*)
/// 2. TOML config file (if PIGGYBANK_SW_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin the worker is installed for, e.g. `https://piggy.example.com`.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Base name of the cache store.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Deployment version embedded in the store name.
    #[serde(default = "default_version")]
    pub version: String,

    /// Paths pre-cached at install time, in order.
    #[serde(default = "default_static_assets")]
    pub static_assets: Vec<String>,

    /// Same-origin paths under this prefix are never intercepted.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Path under which the last good navigation document is kept.
    #[serde(default = "default_document_key")]
    pub document_key: String,

    /// Skip waiting after install and claim clients on activation.
    #[serde(default = "default_true")]
    pub fast_activation: bool,

    /// Force navigation fetches past the HTTP cache and persist the result.
    #[serde(default = "default_true")]
    pub navigation_cache_refresh: bool,

    /// Path to SQLite cache database.
    ///
    /// Set via PIGGYBANK_SW_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to read per response.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_origin() -> String {
    "http://localhost:5173".into()
}

fn default_cache_name() -> String {
    "piggybank".into()
}

fn default_version() -> String {
    "v4".into()
}

fn default_static_assets() -> Vec<String> {
    ["/", "/index.html", "/manifest.json", "/icon-192.png", "/icon-512.png"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_api_prefix() -> String {
    "/api/".into()
}

fn default_document_key() -> String {
    "/index.html".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./piggybank-sw-cache.sqlite")
}

fn default_user_agent() -> String {
    "piggybank-sw/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            cache_name: default_cache_name(),
            version: default_version(),
            static_assets: default_static_assets(),
            api_prefix: default_api_prefix(),
            document_key: default_document_key(),
            fast_activation: true,
            navigation_cache_refresh: true,
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Name of the store owned by this version, e.g. `piggybank-v4`.
    pub fn store_name(&self) -> String {
        format!("{}-{}", self.cache_name, self.version)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `PIGGYBANK_SW_`
    /// 2. TOML file from `PIGGYBANK_SW_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("PIGGYBANK_SW_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("PIGGYBANK_SW_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
