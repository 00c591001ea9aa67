//! Bank configuration file (TOML)
//!
//! Example:
//! ```toml
//! custodian = "<64 hex chars>"
//! owner = "<64 hex chars>"
//! start_paused = false
//!
//! [interest]
//! numerator = 1
//! denominator = 1000
//! seconds_per_day = 86400
//! ```

use custody_core::constants::{RATE_DENOMINATOR, RATE_NUMERATOR, SECONDS_PER_DAY};
use custody_core::{Address, Amount, InterestRate};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestConfig {
    #[serde(default = "default_numerator")]
    pub numerator: u64,
    #[serde(default = "default_denominator")]
    pub denominator: u64,
    #[serde(default = "default_seconds_per_day")]
    pub seconds_per_day: u64,
}

fn default_numerator() -> u64 {
    RATE_NUMERATOR as u64
}

fn default_denominator() -> u64 {
    RATE_DENOMINATOR as u64
}

fn default_seconds_per_day() -> u64 {
    SECONDS_PER_DAY
}

impl Default for InterestConfig {
    fn default() -> Self {
        Self {
            numerator: default_numerator(),
            denominator: default_denominator(),
            seconds_per_day: SECONDS_PER_DAY,
        }
    }
}

impl From<InterestConfig> for InterestRate {
    fn from(config: InterestConfig) -> Self {
        InterestRate {
            numerator: config.numerator as Amount,
            denominator: config.denominator as Amount,
            period_secs: config.seconds_per_day,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankConfig {
    /// Account the bank holds funds under
    pub custodian: Address,
    pub owner: Address,
    #[serde(default)]
    pub start_paused: bool,
    #[serde(default)]
    pub interest: InterestConfig,
}

impl BankConfig {
    pub fn new(custodian: Address, owner: Address) -> Self {
        Self {
            custodian,
            owner,
            start_paused: false,
            interest: InterestConfig::default(),
        }
    }

    /// Load and validate configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: BankConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.custodian.is_zero() {
            return Err(ConfigError::Invalid("custodian must be non-zero".to_string()));
        }
        if self.owner.is_zero() {
            return Err(ConfigError::Invalid("owner must be non-zero".to_string()));
        }
        self.rate()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn rate(&self) -> InterestRate {
        self.interest.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BankConfig {
        BankConfig::new(Address::from_seed("bank"), Address::from_seed("owner"))
    }

    #[test]
    fn test_defaults_apply() {
        let text = format!(
            "custodian = \"{}\"\nowner = \"{}\"\n",
            Address::from_seed("bank").to_hex(),
            Address::from_seed("owner").to_hex()
        );
        let config = BankConfig::parse(&text).unwrap();

        assert_eq!(config, sample());
        assert_eq!(config.rate(), InterestRate::default());
        assert!(!config.start_paused);
    }

    #[test]
    fn test_toml_roundtrip_through_file() {
        let mut config = sample();
        config.start_paused = true;
        config.interest.numerator = 5;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.toml");
        config.save_to_file(&path).unwrap();

        assert_eq!(BankConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_validation() {
        let mut config = sample();
        config.interest.denominator = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = sample();
        config.interest.seconds_per_day = 0;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.owner = Address::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_address_is_parse_error() {
        let text = "custodian = \"zz\"\nowner = \"zz\"\n";
        assert!(matches!(
            BankConfig::parse(text),
            Err(ConfigError::ParseError(_))
        ));
    }
}
