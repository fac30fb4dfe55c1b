//! Order totals: subtotal, discount, tax and grand total.
//!
//! `compute` is the only place the derived monetary fields of an order are
//! produced. It is pure and deterministic.

use serde::{Deserialize, Serialize};

use workshop_core::{DomainError, DomainResult, Money, Percent};

/// The pricing inputs of a single line item.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub unit_price: Money,
    pub quantity: u32,
}

impl PricedLine {
    pub fn new(unit_price: Money, quantity: u32) -> Self {
        Self {
            unit_price,
            quantity,
        }
    }

    fn amount(&self) -> DomainResult<Money> {
        if self.quantity < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        Money::non_negative(self.unit_price.amount(), "unit price")?;
        self.unit_price.times(self.quantity)
    }
}

/// Derived monetary figures of an order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal: Money,
    pub discount_amount: Money,
    pub tax_amount: Money,
    pub total: Money,
}

impl Totals {
    /// The amount tax is levied on: subtotal after discount.
    pub fn taxable_amount(&self) -> DomainResult<Money> {
        self.subtotal.checked_sub(self.discount_amount)
    }
}

/// Compute the order totals.
///
/// - `subtotal = Σ(unit_price × quantity) + labor_cost`
/// - `discount_amount = subtotal × discount / 100` (applied before tax)
/// - `tax_amount = (subtotal − discount_amount) × tax / 100`
/// - `total = subtotal − discount_amount + tax_amount`
///
/// Quantities below one and negative prices or labor cost are rejected, as is
/// any intermediate amount too large to represent. Percentages are
/// range-checked by [`Percent`] itself.
pub fn compute(
    lines: impl IntoIterator<Item = PricedLine>,
    labor_cost: Money,
    discount: Percent,
    tax: Percent,
) -> DomainResult<Totals> {
    Money::non_negative(labor_cost.amount(), "labor cost")?;

    let mut lines_total = Money::ZERO;
    for line in lines {
        lines_total = lines_total.checked_add(line.amount()?)?;
    }

    let subtotal = lines_total.checked_add(labor_cost)?;
    let discount_amount = subtotal.percent(discount)?;
    let taxable = subtotal.checked_sub(discount_amount)?;
    let tax_amount = taxable.percent(tax)?;

    Ok(Totals {
        subtotal,
        discount_amount,
        tax_amount,
        total: taxable.checked_add(tax_amount)?,
    })
}
