//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! `ROTATOR_PROXIES` (comma separated) replaces the proxy list from the file,
//! so a deployment can rotate proxies without editing the TOML. Blank
//! segments are skipped; a value with no proxies at all is ignored.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use proxy_rotator::{NamespaceConfig, RotatorSettings};
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rotator: RotatorSection,
    #[serde(default)]
    pub pool: PoolSection,
    #[serde(default)]
    pub namespaces: Vec<NamespaceConfig>,
}

/// Rotator-wide defaults
#[derive(Debug, Deserialize)]
pub struct RotatorSection {
    #[serde(default = "default_cooldown_ms")]
    pub default_cooldown_ms: u64,
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

/// Proxy pool contents
#[derive(Debug, Default, Deserialize)]
pub struct PoolSection {
    #[serde(default)]
    pub proxies: Vec<String>,
}

fn default_cooldown_ms() -> u64 {
    1000
}

fn default_max_jitter_ms() -> u64 {
    1000
}

impl Default for RotatorSection {
    fn default() -> Self {
        Self {
            default_cooldown_ms: default_cooldown_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl RotatorSection {
    pub fn settings(&self) -> RotatorSettings {
        RotatorSettings {
            default_cooldown: Duration::from_millis(self.default_cooldown_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(raw) = std::env::var("ROTATOR_PROXIES") {
            let proxies: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_owned)
                .collect();
            if !proxies.is_empty() {
                config.pool.proxies = proxies;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> common::Result<()> {
        for proxy in self.pool.proxies.iter_mut() {
            let trimmed = proxy.trim();
            if trimmed.is_empty() {
                return Err(common::Error::Config(
                    "proxy entries must not be empty".into(),
                ));
            }
            *proxy = trimmed.to_owned();
        }

        let mut keys = HashSet::new();
        for namespace in &self.namespaces {
            if namespace.key.is_empty() {
                return Err(common::Error::Config(
                    "namespace key must not be empty".into(),
                ));
            }
            if !keys.insert(namespace.key.as_str()) {
                return Err(common::Error::Config(format!(
                    "duplicate namespace key: {}",
                    namespace.key
                )));
            }
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("proxy-rotator.toml")
    }
}
