//! The markup cascade.
//!
//! Turns the quotation subtotal into the final price through a fixed,
//! strictly ordered chain of percentage applications:
//!
//! 1. `commercial_management = subtotal × commercial_management_rate`
//! 2. `subtotal2 = subtotal + commercial_management`
//! 3. `administration = subtotal2 × administration_rate`
//! 4. `contingency = subtotal2 × contingency_rate`
//! 5. `profit = subtotal2 × profit_rate`
//! 6. `profit_iva = profit × profit_iva_rate`
//! 7. `subtotal3 = subtotal2 + administration + contingency + profit + profit_iva`
//! 8. `withholdings = subtotal3 × withholding_rate`
//! 9. `total_value = subtotal3 + withholdings`
//!
//! Under [`RoundingPolicy::PerStep`] every step is rounded to cents before the
//! next step reads it, so rounding error accumulates down the chain. Rates are
//! not range checked here; an out-of-range rate yields a number, not an error.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::round_cents;

/// Percentage configuration of a quotation. Every rate is a fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CascadeRates {
    #[serde(default)]
    pub commercial_management: Decimal,
    #[serde(default)]
    pub administration: Decimal,
    #[serde(default)]
    pub contingency: Decimal,
    #[serde(default)]
    pub profit: Decimal,
    #[serde(default)]
    pub profit_iva: Decimal,
    #[serde(default)]
    pub withholding: Decimal,
}

/// A rate outside `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate {name} = {value} is outside [0, 1]")]
pub struct RateOutOfRange {
    pub name: &'static str,
    pub value: Decimal,
}

impl CascadeRates {
    /// Rates paired with their field names, in cascade order.
    pub fn named(&self) -> [(&'static str, Decimal); 6] {
        [
            ("commercial_management", self.commercial_management),
            ("administration", self.administration),
            ("contingency", self.contingency),
            ("profit", self.profit),
            ("profit_iva", self.profit_iva),
            ("withholding", self.withholding),
        ]
    }

    /// Report the first rate outside `[0, 1]`.
    ///
    /// The cascade never calls this; it is for input boundaries.
    pub fn validate(&self) -> Result<(), RateOutOfRange> {
        for (name, value) in self.named() {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(RateOutOfRange { name, value });
            }
        }
        Ok(())
    }
}

/// When intermediate results are rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingPolicy {
    /// Round each step to cents before it feeds the next one.
    #[default]
    PerStep,
    /// Carry full precision through the chain and round each published
    /// field once at the end.
    FinalOnly,
}

/// Every intermediate and final value of the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CascadeBreakdown {
    pub subtotal: Decimal,
    pub commercial_management: Decimal,
    pub subtotal2: Decimal,
    pub administration: Decimal,
    pub contingency: Decimal,
    pub profit: Decimal,
    pub profit_iva: Decimal,
    pub subtotal3: Decimal,
    pub withholdings: Decimal,
    pub total_value: Decimal,
}

/// Run the cascade with per-step rounding.
pub fn apply_cascade(subtotal: Decimal, rates: &CascadeRates) -> CascadeBreakdown {
    apply_cascade_with(subtotal, rates, RoundingPolicy::PerStep)
}

/// Run the cascade under an explicit rounding policy.
pub fn apply_cascade_with(
    subtotal: Decimal,
    rates: &CascadeRates,
    policy: RoundingPolicy,
) -> CascadeBreakdown {
    let step = |value: Decimal| match policy {
        RoundingPolicy::PerStep => round_cents(value),
        RoundingPolicy::FinalOnly => value,
    };

    let subtotal = step(subtotal);
    let commercial_management = step(subtotal * rates.commercial_management);
    let subtotal2 = step(subtotal + commercial_management);
    let administration = step(subtotal2 * rates.administration);
    let contingency = step(subtotal2 * rates.contingency);
    let profit = step(subtotal2 * rates.profit);
    let profit_iva = step(profit * rates.profit_iva);
    let subtotal3 = step(subtotal2 + administration + contingency + profit + profit_iva);
    let withholdings = step(subtotal3 * rates.withholding);
    let total_value = step(subtotal3 + withholdings);

    let breakdown = CascadeBreakdown {
        subtotal,
        commercial_management,
        subtotal2,
        administration,
        contingency,
        profit,
        profit_iva,
        subtotal3,
        withholdings,
        total_value,
    };

    match policy {
        RoundingPolicy::PerStep => breakdown,
        RoundingPolicy::FinalOnly => breakdown.rounded(),
    }
}

impl CascadeBreakdown {
    fn rounded(self) -> Self {
        Self {
            subtotal: round_cents(self.subtotal),
            commercial_management: round_cents(self.commercial_management),
            subtotal2: round_cents(self.subtotal2),
            administration: round_cents(self.administration),
            contingency: round_cents(self.contingency),
            profit: round_cents(self.profit),
            profit_iva: round_cents(self.profit_iva),
            subtotal3: round_cents(self.subtotal3),
            withholdings: round_cents(self.withholdings),
            total_value: round_cents(self.total_value),
        }
    }

    /// Markup over the subtotal: `total_value - subtotal`.
    pub fn markup(&self) -> Decimal {
        self.total_value - self.subtotal
    }
}
