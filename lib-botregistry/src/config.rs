//! Registry Configuration
//!
//! Storage location and fee parameters. Loaded from TOML; every field has a
//! default so partial files are accepted.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use lib_types::Amount;

use crate::errors::{RegistryError, RegistryResult};
use crate::transactions::FeeSchedule;

/// Default registry config filename
pub const DEFAULT_CONFIG_FILENAME: &str = "botregistry.toml";

/// Configuration of a bot registry instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    // =========================================================================
    // Storage
    // =========================================================================
    /// Directory of the sled database
    pub db_path: PathBuf,
    /// Use a throwaway database, ignoring `db_path`
    pub temporary: bool,
    /// Flush to disk after every committed block
    pub flush_on_commit: bool,

    // =========================================================================
    // Fees
    // =========================================================================
    /// Smallest currency units per coin; all bot fees are multiples of it
    pub one_coin: u64,
    /// Minimum miner fee a registry transaction must pay
    pub minimum_miner_fee: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/botregistry"),
            temporary: false,
            flush_on_commit: true,

            one_coin: 1_000_000_000,
            minimum_miner_fee: 100_000_000, // 0.1 coin
        }
    }
}

impl RegistryConfig {
    /// Throwaway storage and unit-sized fees, for tests
    pub fn for_testing() -> Self {
        Self {
            db_path: PathBuf::new(),
            temporary: true,
            flush_on_commit: false,
            one_coin: 1,
            minimum_miner_fee: 1,
        }
    }

    pub fn from_toml_str(raw: &str) -> RegistryResult<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| RegistryError::Config(format!("Invalid registry config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::new(self.one_coin as Amount)
    }

    pub fn minimum_miner_fee(&self) -> Amount {
        self.minimum_miner_fee as Amount
    }

    fn validate(&self) -> RegistryResult<()> {
        if self.one_coin == 0 {
            return Err(RegistryError::Config("one_coin must be positive".to_string()));
        }
        if !self.temporary && self.db_path.as_os_str().is_empty() {
            return Err(RegistryError::Config(
                "db_path is required unless temporary is set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load a config file; the file must exist
pub fn load_config(path: &Path) -> RegistryResult<RegistryConfig> {
    if !path.exists() {
        return Err(RegistryError::Config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| RegistryError::Config(format!("Failed to read config: {}", e)))?;

    RegistryConfig::from_toml_str(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert!(!config.temporary);
        assert_eq!(config.one_coin, 1_000_000_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testing_config() {
        let config = RegistryConfig::for_testing();
        assert!(config.temporary);
        assert_eq!(config.minimum_miner_fee(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RegistryConfig::from_toml_str(
            r#"
            db_path = "/var/lib/botregistry"
            minimum_miner_fee = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/botregistry"));
        assert_eq!(config.minimum_miner_fee, 5);
        assert_eq!(config.one_coin, RegistryConfig::default().one_coin);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(matches!(
            RegistryConfig::from_toml_str("one_coin = \"lots\""),
            Err(RegistryError::Config(_))
        ));
        assert!(matches!(
            RegistryConfig::from_toml_str("one_coin = 0"),
            Err(RegistryError::Config(_))
        ));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILENAME);
        fs::write(&path, "temporary = true\nflush_on_commit = false\n").unwrap();

        let config = load_config(&path).unwrap();
        assert!(config.temporary);
        assert!(!config.flush_on_commit);

        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }
}
