//! Configuration management
//!
//! Loads configuration from config.toml with support for:
//! - Server binding settings
//! - SQLite database location
//! - Session lifetime, signature scheme and role assignment
//! - Contribution approval and dashboard display parameters

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path, or `:memory:`
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "ambassador-ledger.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureScheme {
    Sr25519,
    Mock,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_hours: i64,
    pub signature_scheme: SignatureScheme,
    /// How old a signed login message may be
    pub login_window_secs: i64,
    /// Wallets starting with one of these become ambassadors
    pub ambassador_prefixes: Vec<String>,
    /// Wallets containing one of these become ambassadors
    pub ambassador_markers: Vec<String>,
    /// Wallets that are admins from their first connect
    pub admin_wallets: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 7 * 24,
            signature_scheme: SignatureScheme::Sr25519,
            login_window_secs: 300,
            ambassador_prefixes: vec!["QUBIC1234".to_string(), "QUBIC9876".to_string()],
            ambassador_markers: vec!["AMBASSADOR".to_string()],
            admin_wallets: Vec::new(),
        }
    }
}

impl AuthConfig {
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }
}

/// Rewards system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    /// Submissions are approved on arrival; otherwise they wait for review
    pub auto_approve: bool,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self { auto_approve: true }
    }
}

/// Cosmetic dashboard values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub contribution_bias: u64,
    pub weekly_growth: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            contribution_bias: 0,
            weekly_growth: 12,
        }
    }
}

impl Config {
    /// Load from a config file, falling back to the embedded defaults
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            toml::from_str(DEFAULT_CONFIG).context("Failed to parse default config")?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.session_ttl_hours <= 0 {
            bail!("auth.session_ttl_hours must be positive");
        }
        if self.auth.login_window_secs <= 0 {
            bail!("auth.login_window_secs must be positive");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            rewards: RewardsConfig::default(),
            display: DisplayConfig::default(),
        })
    }
}
