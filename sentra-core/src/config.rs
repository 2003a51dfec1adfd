//! Configuration types for sentra

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Entity time-to-live in seconds for age-based pruning
    #[serde(default = "default_entity_ttl")]
    pub entity_ttl_secs: u64,
}

fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sentra")
        .join("state.db")
}

fn default_entity_ttl() -> u64 {
    3600
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            entity_ttl_secs: default_entity_ttl(),
        }
    }
}

/// Execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Per-run timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    300
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

/// Policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Whether the policy gate is active
    #[serde(default = "default_policy_enabled")]
    pub enabled: bool,
}

fn default_policy_enabled() -> bool {
    true
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: default_policy_enabled(),
        }
    }
}

/// Complete sentra configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentraConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl SentraConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> crate::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from default locations with cascade:
    /// 1. ./sentra.toml (local override)
    /// 2. ~/.sentra/config.toml (global defaults)
    /// 3. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(config) = Self::from_file("sentra.toml") {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let global_path = home.join(".sentra").join("config.toml");
            if let Ok(config) = Self::from_file(&global_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".sentra").join("config.toml"))
    }
}
