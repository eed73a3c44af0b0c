//! Aggregation of valued rows into the quotation subtotal.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::round_cents;
use crate::valuation::LineValuation;

/// Sum of all valued rows of one quotation.
///
/// Only `subtotal` feeds the markup cascade. The cost and profit sums are
/// informational and stay unrounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Aggregate {
    pub subtotal: Decimal,
    pub total_cost: Decimal,
    pub total_profit: Decimal,
    pub line_count: usize,
}

/// Sum row totals across product rows and complementary item rows.
///
/// Decimal addition is exact, so the result does not depend on row order.
pub fn aggregate<'a, I>(rows: I) -> Aggregate
where
    I: IntoIterator<Item = &'a LineValuation>,
{
    let mut sum = Decimal::ZERO;
    let mut total_cost = Decimal::ZERO;
    let mut total_profit = Decimal::ZERO;
    let mut line_count = 0;

    for row in rows {
        sum += row.row_total;
        total_cost += row.cost;
        total_profit += row.profit;
        line_count += 1;
    }

    Aggregate {
        subtotal: round_cents(sum),
        total_cost,
        total_profit,
        line_count,
    }
}
