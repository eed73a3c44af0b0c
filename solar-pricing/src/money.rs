//! Money helpers.
//!
//! Every monetary value in the workspace is a `Decimal` in Colombian pesos.
//! Rounding is commercial: two decimal places, midpoint away from zero, so
//! `32_248.125` becomes `32_248.13` and `-0.005` becomes `-0.01`.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places every published amount carries.
pub const CENT_SCALE: u32 = 2;

/// Round an amount to whole cents.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CENT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `round_cents(base × rate)`, the unit step of the markup cascade.
pub fn apply_rate(base: Decimal, rate: Decimal) -> Decimal {
    round_cents(base * rate)
}

/// Format an amount with comma thousands separators and two decimals.
///
/// `1322173.13` becomes `"1,322,173.13"`.
pub fn format_amount(amount: Decimal) -> String {
    let rounded = round_cents(amount);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let text = format!("{:.2}", rounded.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}{}.{}", sign, grouped, cents)
}
