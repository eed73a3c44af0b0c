//! Quotation pricing arithmetic.
//!
//! Three pure stages, each usable on its own:
//!
//! - [`valuation`]: cost and profit of a single row
//! - [`aggregate`]: rounded subtotal of all rows
//! - [`cascade`]: markup cascade from subtotal to total value
//!
//! Amounts are `rust_decimal::Decimal`, rounded with [`money::round_cents`].

pub mod aggregate;
pub mod cascade;
pub mod defaults;
pub mod money;
pub mod valuation;

pub use aggregate::{aggregate, Aggregate};
pub use cascade::{
    apply_cascade, apply_cascade_with, CascadeBreakdown, CascadeRates, RateOutOfRange,
    RoundingPolicy,
};
pub use money::{apply_rate, format_amount, round_cents};
pub use valuation::{value_line, LineInput, LineValuation};
