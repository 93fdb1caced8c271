//! Rate configuration loading from config.toml
//!
//! Fee, tax and teacher compensation settings are read from a TOML file. Every section and
//! key is optional: a missing rate is treated as zero so that a half-configured school can
//! still take payments, and the loader warns about what it filled in.

use crate::core::retry::RetryPolicy;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Card network used when a card payment does not name one
pub const DEFAULT_CARD_NETWORK: &str = "Elkart";

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "TUITION_LEDGER_CONFIG";

/// Everything the ledger, tracker and payroll engine read from configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Bank and POS fee rates
    pub fees: FeeTable,
    /// Company tax
    pub tax: TaxConfig,
    /// Center split and social fund
    pub teacher_fees: TeacherFeeConfig,
    /// Optimistic concurrency retry budget
    pub retry: RetryPolicy,
}

/// Bank fee rates per payment method
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeeTable {
    /// Rate charged on QR transfers
    pub qr_base_rate: f64,
    /// POS rate per card network, keyed by network name
    pub pos_rates: HashMap<String, f64>,
}

impl FeeTable {
    /// POS rate for a card network, falling back to [`DEFAULT_CARD_NETWORK`] when no
    /// network is given. `None` if the network has no configured rate.
    #[must_use]
    pub fn pos_rate(&self, network: Option<&str>) -> Option<f64> {
        self.pos_rates
            .get(network.unwrap_or(DEFAULT_CARD_NETWORK))
            .copied()
    }
}

/// Company tax settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TaxConfig {
    /// Fraction of the gross amount withheld as tax
    pub company_tax_rate: f64,
}

/// How revenue is shared between the center and its teachers
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TeacherFeeConfig {
    /// Fraction of revenue the center keeps; the teacher gets the rest
    pub center_split: f64,
    /// Fixed deduction per pay period for teachers paying into the social fund
    pub social_fund: f64,
}

impl Default for TeacherFeeConfig {
    fn default() -> Self {
        Self {
            center_split: 0.5,
            social_fund: 0.0,
        }
    }
}

impl LedgerConfig {
    /// Checks that every rate is a fraction and every amount is non-negative.
    pub fn validate(&self) -> Result<()> {
        let fractions = [
            ("fees.qr_base_rate", self.fees.qr_base_rate),
            ("tax.company_tax_rate", self.tax.company_tax_rate),
            ("teacher_fees.center_split", self.teacher_fees.center_split),
        ];
        for (key, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config {
                    message: format!("{key} must be between 0 and 1, got {value}"),
                });
            }
        }

        for (network, rate) in &self.fees.pos_rates {
            if !(0.0..=1.0).contains(rate) {
                return Err(Error::Config {
                    message: format!("fees.pos_rates.{network} must be between 0 and 1, got {rate}"),
                });
            }
        }

        if !self.teacher_fees.social_fund.is_finite() || self.teacher_fees.social_fund < 0.0 {
            return Err(Error::Config {
                message: format!(
                    "teacher_fees.social_fund must be a non-negative amount, got {}",
                    self.teacher_fees.social_fund
                ),
            });
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::Config {
                message: "retry.max_attempts must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Parses and validates a config from TOML text.
pub fn parse_config(contents: &str) -> Result<LedgerConfig> {
    let config: LedgerConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads the ledger configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A rate is outside `0..=1` or the social fund is negative
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<LedgerConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;
    parse_config(&contents)
}

/// Loads the configuration from `TUITION_LEDGER_CONFIG` (default `./config.toml`).
///
/// See [`load_config_or_default`].
pub fn load_default_config() -> Result<LedgerConfig> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
    load_config_or_default(path)
}

/// Loads the configuration from `path`, falling back to defaults if the file cannot be read.
///
/// A file that can be read but does not parse or validate is an error.
pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> Result<LedgerConfig> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents),
        Err(e) => {
            warn!(
                "Using zero fee and tax rates, could not read {}: {e}",
                path.display()
            );
            Ok(LedgerConfig::default())
        }
    }
}
