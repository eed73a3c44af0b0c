//! Pricing and provisioning configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};
use solar_pricing::defaults::{
    default_rates, MAX_QUOTATION_VALIDITY_DAYS, QUOTATION_VALIDITY_DAYS,
};
use solar_pricing::{CascadeRates, RoundingPolicy};

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PricingConfig {
    /// Rates for quotations created without their own.
    pub default_rates: CascadeRates,
    pub rounding: RoundingPolicy,
    pub quotation_validity_days: i64,
    /// Quotation numbers look like `<number_prefix>-2026-0001`.
    pub number_prefix: String,
    pub project_prefix: String,
    pub cost_center_prefix: String,
    /// Project state names that qualify as a project's first state,
    /// matched case-insensitively.
    pub initial_state_names: Vec<String>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_rates: default_rates(),
            rounding: RoundingPolicy::PerStep,
            quotation_validity_days: QUOTATION_VALIDITY_DAYS,
            number_prefix: "COT".into(),
            project_prefix: "PRJ".into(),
            cost_center_prefix: "CC".into(),
            initial_state_names: vec!["initiated".into(), "active".into()],
        }
    }
}

impl PricingConfig {
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> ConfigResult<()> {
        self.default_rates
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("default_rates: {}", e)))?;
        if !(0..=MAX_QUOTATION_VALIDITY_DAYS).contains(&self.quotation_validity_days) {
            return Err(ConfigError::Invalid(format!(
                "quotation_validity_days must be between 0 and {}, got {}",
                MAX_QUOTATION_VALIDITY_DAYS, self.quotation_validity_days
            )));
        }
        for (name, value) in [
            ("number_prefix", &self.number_prefix),
            ("project_prefix", &self.project_prefix),
            ("cost_center_prefix", &self.cost_center_prefix),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }
}
