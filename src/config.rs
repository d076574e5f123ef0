//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, bot tokens) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`. Configuration
//! errors are fatal at startup — everything after that is skip-and-log.

use anyhow::{bail, Context, Result};
use chrono::Duration;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

use crate::arb::detector::DetectorConfig;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub odds_api: OddsApiConfig,
    pub quota: QuotaConfig,
    pub database: DatabaseConfig,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    pub scan_interval_secs: u64,
    /// Sport keys to scan, e.g. "soccer_epl", "basketball_nba".
    pub sports: Vec<String>,
    /// Total stake that stake allocations are computed against.
    pub total_stake: f64,
    /// Minimum profit percentage to report (margin epsilon).
    pub min_profit_pct: f64,
    /// Sanity ceiling — margins above this are treated as bad feed data.
    #[serde(default = "default_max_profit_pct")]
    pub max_profit_pct: f64,
    /// How long a stored opportunity suppresses re-detections.
    pub staleness_window_secs: i64,
    /// Whether one bookmaker may fill more than one leg of the same
    /// opportunity (sole offerers are always allowed).
    #[serde(default)]
    pub allow_shared_bookmaker: bool,
}

fn default_max_profit_pct() -> f64 {
    30.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct OddsApiConfig {
    pub api_key_env: String,
    /// Comma-separated bookmaker regions, e.g. "us,uk,eu,au".
    pub regions: String,
    /// Comma-separated market keys to request, e.g. "h2h".
    pub markets: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuotaConfig {
    pub calls_limit: u32,
    /// Window length in days (The Odds API quotas are monthly).
    pub window_days: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    pub enabled: bool,
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the scanner cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scanner.sports.is_empty() {
            bail!("scanner.sports must list at least one sport key");
        }
        if self.scanner.scan_interval_secs == 0 {
            bail!("scanner.scan_interval_secs must be positive");
        }
        if self.scanner.total_stake <= 0.0 {
            bail!("scanner.total_stake must be positive");
        }
        if self.scanner.min_profit_pct < 0.0 {
            bail!("scanner.min_profit_pct must not be negative");
        }
        if self.scanner.staleness_window_secs <= 0 {
            bail!("scanner.staleness_window_secs must be positive");
        }
        if self.quota.calls_limit == 0 {
            bail!("quota.calls_limit must be positive");
        }
        if self.quota.window_days <= 0 {
            bail!("quota.window_days must be positive");
        }
        Ok(())
    }

    /// Detector configuration derived from the `[scanner]` section.
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            min_profit_pct: self.scanner.min_profit_pct,
            max_profit_pct: self.scanner.max_profit_pct,
            total_stake: self.scanner.total_stake,
            allow_shared_bookmaker: self.scanner.allow_shared_bookmaker,
            staleness_window: Duration::seconds(self.scanner.staleness_window_secs),
        }
    }

    /// Resolve an environment variable name to a secret value.
    pub fn resolve_secret(env_name: &str) -> Result<SecretString> {
        let value = std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))?;
        Ok(SecretString::new(value))
    }
}
