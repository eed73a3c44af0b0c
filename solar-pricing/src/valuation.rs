//! Line item valuation.
//!
//! A quotation row is valued as its cost plus a profit share of that cost:
//!
//! - `cost      = quantity × unit_price`
//! - `profit    = cost × profit_percentage`
//! - `row_total = cost + profit`
//!
//! Nothing is rounded here. Rows keep full precision until the aggregator
//! rounds their sum, and the valuator never rejects its input; bad
//! quantities and prices are stopped at the service boundary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The three inputs a row contributes to pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub quantity: Decimal,
    /// Unit price in COP.
    pub unit_price: Decimal,
    /// Profit share as a fraction (`0.15` is fifteen percent).
    pub profit_percentage: Decimal,
}

/// Valued row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineValuation {
    pub cost: Decimal,
    pub profit: Decimal,
    pub row_total: Decimal,
}

/// Value a single row.
pub fn value_line(input: &LineInput) -> LineValuation {
    let cost = input.quantity * input.unit_price;
    let profit = cost * input.profit_percentage;
    LineValuation {
        cost,
        profit,
        row_total: cost + profit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn values_cost_and_profit() {
        let v = value_line(&LineInput {
            quantity: dec!(12),
            unit_price: dec!(850000),
            profit_percentage: dec!(0.15),
        });
        assert_eq!(v.cost, dec!(10200000));
        assert_eq!(v.profit, dec!(1530000));
        assert_eq!(v.row_total, dec!(11730000));
    }

    #[test]
    fn keeps_fractional_precision() {
        let v = value_line(&LineInput {
            quantity: dec!(2.5),
            unit_price: dec!(3.333),
            profit_percentage: dec!(0.1),
        });
        assert_eq!(v.cost, dec!(8.3325));
        assert_eq!(v.profit, dec!(0.83325));
        assert_eq!(v.row_total, dec!(9.16575));
    }

    #[test]
    fn zero_profit_row_is_pure_cost() {
        let v = value_line(&LineInput {
            quantity: dec!(4),
            unit_price: dec!(125000),
            profit_percentage: Decimal::ZERO,
        });
        assert_eq!(v.profit, Decimal::ZERO);
        assert_eq!(v.row_total, v.cost);
    }
}
