//! Default pricing parameters.
//!
//! Applied when a quotation is created without an explicit rate set.
//! Changing a value here changes every new quotation priced by
//! `solar-pipeline` that does not carry its own rates.

use rust_decimal::Decimal;

use crate::cascade::CascadeRates;

/// Colombian VAT charged on the profit component of an AIU contract.
pub const PROFIT_IVA_RATE: Decimal = Decimal::from_parts(19, 0, 0, false, 2);

/// Days a quotation stays valid after creation.
pub const QUOTATION_VALIDITY_DAYS: i64 = 30;

/// Longest validity a configuration may ask for.
pub const MAX_QUOTATION_VALIDITY_DAYS: i64 = 3650;

/// Largest quantity accepted on a single row.
pub const MAX_LINE_QUANTITY: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Largest unit price accepted on a single row, in COP (10^13).
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(1_316_134_912, 2_328, 0, false, 0);

/// Most rows a quotation may carry.
///
/// With the row limits above and every rate capped at one, the cascade total
/// stays several orders of magnitude below `Decimal::MAX`.
pub const MAX_LINES: usize = 10_000;

/// Rates a fresh quotation starts from: no markup except IVA on profit.
pub fn default_rates() -> CascadeRates {
    CascadeRates {
        profit_iva: PROFIT_IVA_RATE,
        ..CascadeRates::default()
    }
}
