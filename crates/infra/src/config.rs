//! Configuration loading and representation.

use rust_decimal::Decimal;
use thiserror::Error;

use workshop_core::Percent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkshopConfig {
    /// Number given to the first order of an empty store.
    pub first_order_number: u64,
    /// Tax applied to new orders that do not specify one.
    pub default_tax: Percent,
    /// Discount applied to new orders that do not specify one.
    pub default_discount: Percent,
}

impl Default for WorkshopConfig {
    fn default() -> Self {
        Self {
            first_order_number: 1,
            default_tax: Percent::ZERO,
            default_discount: Percent::ZERO,
        }
    }
}

impl WorkshopConfig {
    pub const FIRST_ORDER_NUMBER: &'static str = "WORKSHOP_FIRST_ORDER_NUMBER";
    pub const DEFAULT_TAX_PERCENT: &'static str = "WORKSHOP_DEFAULT_TAX_PERCENT";
    pub const DEFAULT_DISCOUNT_PERCENT: &'static str = "WORKSHOP_DEFAULT_DISCOUNT_PERCENT";

    /// Load from process environment variables; unset variables keep defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load through an arbitrary lookup (environment, file, test map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(Self::FIRST_ORDER_NUMBER) {
            let number = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| invalid(Self::FIRST_ORDER_NUMBER, &raw, e.to_string()))?;
            if number == 0 {
                return Err(invalid(Self::FIRST_ORDER_NUMBER, &raw, "must be positive"));
            }
            config.first_order_number = number;
        }

        if let Some(raw) = lookup(Self::DEFAULT_TAX_PERCENT) {
            config.default_tax = parse_percent(Self::DEFAULT_TAX_PERCENT, &raw)?;
        }

        if let Some(raw) = lookup(Self::DEFAULT_DISCOUNT_PERCENT) {
            config.default_discount = parse_percent(Self::DEFAULT_DISCOUNT_PERCENT, &raw)?;
        }

        Ok(config)
    }
}

fn parse_percent(var: &'static str, raw: &str) -> Result<Percent, ConfigError> {
    let value = raw
        .trim()
        .parse::<Decimal>()
        .map_err(|e| invalid(var, raw, e.to_string()))?;
    Percent::new(value).map_err(|e| invalid(var, raw, e.to_string()))
}

fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}
