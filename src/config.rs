// ⚙️ Configuration - Rules, ledger batching, and file locations
// Loaded from JSON; every section falls back to its defaults.

use crate::ledger::LedgerConfig;
use crate::rules::{RulesConfig, TierLimits};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0:?}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config JSON: {0:?}")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// SQLite database backing the aggregation store
    pub database: PathBuf,

    /// Persisted ledger chain
    pub chain: PathBuf,

    /// JSON-lines validation results
    pub results: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            database: PathBuf::from("outputs/loads.db"),
            chain: PathBuf::from("outputs/blockchain.json"),
            results: PathBuf::from("outputs/output.txt"),
        }
    }
}

impl PathsConfig {
    /// Detailed results sit next to the compact ones: `output.txt` → `output_detailed.txt`
    pub fn detailed_results(&self) -> PathBuf {
        let stem = self
            .results
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let name = match self.results.extension() {
            Some(ext) => format!("{}_detailed.{}", stem, ext.to_string_lossy()),
            None => format!("{}_detailed", stem),
        };
        self.results.with_file_name(name)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rules: RulesConfig,
    pub ledger: LedgerConfig,
    pub paths: PathsConfig,
}

impl Config {
    /// Load config from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.batch_size == 0 {
            return Err(ConfigError::Invalid("ledger.batch_size must be at least 1".to_string()));
        }
        if self.rules.prime_limit < 2 {
            return Err(ConfigError::Invalid("rules.prime_limit must be at least 2".to_string()));
        }

        for (name, tier) in [("prime", &self.rules.prime), ("normal", &self.rules.normal)] {
            check_tier(name, tier)?;
        }

        Ok(())
    }
}

fn check_tier(name: &str, tier: &TierLimits) -> Result<(), ConfigError> {
    if tier.max_daily_count == 0 {
        return Err(ConfigError::Invalid(format!("rules.{name}.max_daily_count must be at least 1")));
    }
    if !tier.max_daily_total.is_sign_positive() || tier.max_daily_total.is_zero() {
        return Err(ConfigError::Invalid(format!("rules.{name}.max_daily_total must be positive")));
    }
    if let Some(weekly) = tier.max_weekly_total {
        if weekly < tier.max_daily_total {
            return Err(ConfigError::Invalid(format!(
                "rules.{name}.max_weekly_total is below the daily total"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LinkMode;
    use rust_decimal::Decimal;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rules.prime_limit, 1_000_000);
        assert_eq!(config.rules.normal.max_weekly_total, Some(Decimal::from(20000)));
        assert_eq!(config.ledger.batch_size, 1);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(
            r#"{
                "ledger": { "batch_size": 100, "batch_interval_secs": 3600, "link_mode": "content_digest" },
                "rules": { "normal": { "max_daily_count": 5, "max_daily_total": "7500.50" } }
            }"#,
        );

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.ledger.batch_size, 100);
        assert_eq!(config.ledger.batch_interval_secs, Some(3600));
        assert_eq!(config.ledger.link_mode, LinkMode::ContentDigest);
        assert_eq!(config.rules.normal.max_daily_total, Decimal::new(750050, 2));
        assert_eq!(config.rules.normal.max_weekly_total, None);
        assert_eq!(config.rules.prime, TierLimits::prime());
        assert_eq!(config.paths, PathsConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_config(r#"{ "ledger": { "batch_size": 0 } }"#);
        assert!(matches!(Config::from_file(file.path()), Err(ConfigError::Invalid(_))));

        let file = write_config(r#"{ "rules": { "prime_limit": 1 } }"#);
        assert!(matches!(Config::from_file(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unreadable_and_unparsable() {
        assert!(matches!(Config::from_file("/nonexistent/config.json"), Err(ConfigError::Io(..))));

        let file = write_config("{ not json");
        assert!(matches!(Config::from_file(file.path()), Err(ConfigError::Parse(..))));
    }

    #[test]
    fn test_detailed_results_path() {
        let paths = PathsConfig::default();
        assert_eq!(paths.detailed_results(), PathBuf::from("outputs/output_detailed.txt"));

        let paths = PathsConfig {
            results: PathBuf::from("results"),
            ..PathsConfig::default()
        };
        assert_eq!(paths.detailed_results(), PathBuf::from("results_detailed"));
    }
}
