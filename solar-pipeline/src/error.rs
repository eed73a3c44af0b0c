//! Error types.
//!
//! Every failure mode has a named variant. Pipeline stages themselves report
//! plain `String` errors; these types cover what callers of the crate see.

use rust_decimal::Decimal;
use solar_pricing::RateOutOfRange;
use thiserror::Error;

use crate::types::{QuotationId, QuotationStatus};

/// Rejected input, caught before anything is priced or persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("line {line}: quantity must be positive, got {quantity}")]
    NonPositiveQuantity { line: usize, quantity: Decimal },

    #[error("line {line}: unit price must not be negative, got {unit_price}")]
    NegativeUnitPrice { line: usize, unit_price: Decimal },

    #[error("line {line}: profit percentage {value} is outside [0, 1]")]
    ProfitPercentageOutOfRange { line: usize, value: Decimal },

    #[error("line {line}: quantity {quantity} exceeds the maximum of {max}")]
    QuantityTooLarge {
        line: usize,
        quantity: Decimal,
        max: Decimal,
    },

    #[error("line {line}: unit price {unit_price} exceeds the maximum of {max}")]
    UnitPriceTooLarge {
        line: usize,
        unit_price: Decimal,
        max: Decimal,
    },

    #[error("{count} rows exceed the maximum of {max} per quotation")]
    TooManyLines { count: usize, max: usize },

    #[error("validity of {0} days is outside the supported range")]
    ValidityOutOfRange(i64),

    #[error("{0}")]
    Rate(#[from] RateOutOfRange),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("power must not be negative, got {0} kWp")]
    NegativePower(Decimal),
}

/// Failure of the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("unique constraint {constraint} violated")]
    UniqueViolation { constraint: &'static str },

    #[error("integrity error: {0}")]
    Integrity(String),

    /// Inputs of an approved, rejected or expired quotation are frozen.
    #[error("quotation {id} is {status}")]
    QuotationClosed { id: u64, status: QuotationStatus },
}

/// The pricing pipeline could not produce trustworthy totals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("{stage} {component} failed: {message}")]
    Stage {
        stage: &'static str,
        component: String,
        message: String,
    },

    #[error("line {line_id} was not valued")]
    Unvalued { line_id: u64 },

    #[error("pricing request was never timestamped")]
    NotTimestamped,
}

/// Errors surfaced by the quotation service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("pricing failed: {0}")]
    Pricing(#[from] PricingError),

    #[error("quotation {id} is {status} and can no longer be edited")]
    QuotationClosed {
        id: QuotationId,
        status: QuotationStatus,
    },
}

/// Failure while reading a CSV of quotation rows.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to open '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV parse error at line {line}: {source}")]
    Csv {
        line: usize,
        #[source]
        source: csv::Error,
    },
}

/// Failure while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type PricingResult<T> = Result<T, PricingError>;
pub type ServiceResult<T> = Result<T, ServiceError>;
pub type LoaderResult<T> = Result<T, LoaderError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
