//! Monetary amounts and percentages.
//!
//! `Money` is exact decimal arithmetic over `rust_decimal::Decimal`. No rounding
//! happens in arithmetic; `round_cents` exists for presentation only. Every
//! operation is checked: overflow is a validation error, never a panic.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// A monetary amount in the workshop's single operating currency.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Build an amount that must not be negative (prices, labor cost).
    pub fn non_negative(amount: Decimal, what: &str) -> DomainResult<Self> {
        if amount < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "{what} must not be negative (got {amount})"
            )));
        }
        Ok(Self(amount))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// `self × percent / 100`.
    pub fn percent(self, percent: Percent) -> DomainResult<Money> {
        self.0
            .checked_mul(percent.value())
            .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
            .map(Money)
            .ok_or_else(out_of_range)
    }

    pub fn checked_add(self, rhs: Money) -> DomainResult<Money> {
        self.0.checked_add(rhs.0).map(Money).ok_or_else(out_of_range)
    }

    pub fn checked_sub(self, rhs: Money) -> DomainResult<Money> {
        self.0.checked_sub(rhs.0).map(Money).ok_or_else(out_of_range)
    }

    /// `self × quantity`.
    pub fn times(self, quantity: u32) -> DomainResult<Money> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Money)
            .ok_or_else(out_of_range)
    }

    /// Round to two decimal places, midpoint away from zero.
    pub fn round_cents(self) -> Money {
        Money(self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }
}

fn out_of_range() -> DomainError {
    DomainError::validation("amount out of range")
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

/// A percentage constrained to `[0, 100]`.
///
/// Out-of-range values are rejected, never clamped. Deserialization goes
/// through the same check, so stored discount/tax values are validated on
/// their way into the core.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percent(Decimal);

impl ValueObject for Percent {}

impl Percent {
    pub const ZERO: Percent = Percent(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!(
                "percentage must lie in [0, 100] (got {value})"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl core::fmt::Display for Percent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl TryFrom<Decimal> for Percent {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percent> for Decimal {
    fn from(value: Percent) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn percent_of_amount_is_exact() {
        let amount = Money::new(dec!(252));
        let tax = Percent::new(dec!(5)).unwrap();
        assert_eq!(amount.percent(tax).unwrap(), Money::new(dec!(12.6)));
    }

    #[test]
    fn percent_outside_range_is_rejected() {
        assert!(Percent::new(dec!(-0.01)).is_err());
        assert!(Percent::new(dec!(100.01)).is_err());
        assert!(Percent::new(dec!(0)).is_ok());
        assert!(Percent::new(dec!(100)).is_ok());
    }

    #[test]
    fn percent_deserialization_validates_range() {
        assert!(serde_json::from_str::<Percent>("\"150\"").is_err());
        let p: Percent = serde_json::from_str("10").unwrap();
        assert_eq!(p.value(), dec!(10));
    }

    #[test]
    fn negative_amount_is_rejected_where_non_negative_is_required() {
        let err = Money::non_negative(dec!(-1), "unit price").unwrap_err();
        assert!(err.is_validation());
        assert!(Money::non_negative(dec!(0), "unit price").is_ok());
    }

    #[test]
    fn round_cents_rounds_midpoint_away_from_zero() {
        assert_eq!(Money::new(dec!(10.125)).round_cents(), Money::new(dec!(10.13)));
        assert_eq!(Money::new(dec!(10.124)).round_cents(), Money::new(dec!(10.12)));
    }

    #[test]
    fn quantity_multiplication_and_addition() {
        let services = Money::new(dec!(100)).times(2).unwrap();
        let total = services.checked_add(Money::new(dec!(50))).unwrap();
        assert_eq!(total, Money::new(dec!(250)));
        assert_eq!(total.checked_sub(services).unwrap(), Money::new(dec!(50)));
    }

    #[test]
    fn overflow_is_a_validation_error() {
        let max = Money::new(Decimal::MAX);
        assert!(max.times(2).unwrap_err().is_validation());
        assert!(max.checked_add(Money::new(dec!(1))).unwrap_err().is_validation());
        assert!(max.percent(Percent::new(dec!(10)).unwrap()).is_err());
        assert_eq!(max.times(1).unwrap(), max);
    }
}
