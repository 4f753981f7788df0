//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` when present and deserializes into strongly-typed
//! structs; every field has a default so the file is optional. The
//! variables the service has always honoured (`WATCH_INTERVAL_SECONDS`,
//! `OCEAN_URL`, ...) override the file. Secrets are referenced by env-var
//! name and resolved at runtime.
//!
//! The resulting `AppConfig` is built once in `main` and passed down.

use anyhow::{Context, Result};
use secrecy::Secret;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::chain::esplora::DEFAULT_BASE_URL;
use crate::engine::scheduler::FailurePolicy;
use crate::wallet::ocean::DEFAULT_ENDPOINT;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub watcher: WatcherConfig,
    pub wallet: WalletConfig,
    pub chain: ChainConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WatcherConfig {
    /// Seconds between ticks. The watcher is disabled unless positive.
    pub interval_secs: i64,
    /// Seconds a `Pending` order may wait for funding.
    pub expiry_secs: u64,
    pub on_fetch_failure: FailurePolicy,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: -1,
            expiry_secs: 600,
            on_fetch_failure: FailurePolicy::Terminate,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WalletConfig {
    pub endpoint: String,
    /// Name of the env var holding the wallet bearer token, if any.
    pub token_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token_env: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChainConfig {
    pub explorer_url: String,
    pub timeout_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            explorer_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://swapwatch.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist, then apply overrides from the process environment.
    pub fn load(path: &str) -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::load_with(path, &vars)
    }

    /// As [`AppConfig::load`], with the environment passed in.
    pub fn load_with(path: &str, env: &HashMap<String, String>) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {path}"))?;
            Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file: {path}"))?
        } else {
            Self::default()
        };
        config.apply_env(env)?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply environment overrides. A malformed numeric value is an error.
    pub fn apply_env(&mut self, env: &HashMap<String, String>) -> Result<()> {
        let get = |key: &str| env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(v) = get("WATCH_INTERVAL_SECONDS") {
            self.watcher.interval_secs = v
                .parse()
                .with_context(|| format!("WATCH_INTERVAL_SECONDS is not an integer: {v}"))?;
        }
        if let Some(v) = get("OCEAN_URL") {
            self.wallet.endpoint = v.to_string();
        }
        if let Some(v) = get("EXPLORER_URL") {
            self.chain.explorer_url = v.to_string();
        }
        if let Some(v) = get("DATABASE_URL") {
            self.storage.database_url = v.to_string();
        }
        if let Some(v) = get("PORT") {
            self.server.port = v
                .parse()
                .with_context(|| format!("PORT is not a valid port: {v}"))?;
        }
        Ok(())
    }

    /// Tick interval, or `None` when the watcher is disabled.
    pub fn watch_interval(&self) -> Option<Duration> {
        u64::try_from(self.watcher.interval_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.watcher.expiry_secs)
    }

    /// Resolve the wallet bearer token from the env var named in config.
    pub fn wallet_token(&self) -> Result<Option<Secret<String>>> {
        self.wallet
            .token_env
            .as_deref()
            .map(|name| Self::resolve_env(name).map(Secret::new))
            .transpose()
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
