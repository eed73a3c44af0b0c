use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solar_pricing::{CascadeBreakdown, CascadeRates, LineInput, LineValuation, RoundingPolicy};

use crate::candidate_pipeline::HasRequestId;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Primary key of a quotation.
    QuotationId
);
id_type!(LineId);
id_type!(ProjectId);
id_type!(CostCenterId);
id_type!(ProjectStateId);
id_type!(HistoryId);

/// The user on whose behalf an operation runs.
///
/// Passed explicitly to every mutating operation instead of being read
/// from ambient session state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user_id: u64,
}

impl Actor {
    pub fn new(user_id: u64) -> Self {
        Self { user_id }
    }
}

// ---------------------------------------------------------------------------
// Quotation lifecycle
// ---------------------------------------------------------------------------

/// Quotation status, in lifecycle order.
///
/// `Approved` is the "approved/contracted" status that provisions a project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Draft,
    Sent,
    UnderReview,
    Negotiation,
    Approved,
    Rejected,
    Expired,
}

impl QuotationStatus {
    pub const ALL: [QuotationStatus; 7] = [
        QuotationStatus::Draft,
        QuotationStatus::Sent,
        QuotationStatus::UnderReview,
        QuotationStatus::Negotiation,
        QuotationStatus::Approved,
        QuotationStatus::Rejected,
        QuotationStatus::Expired,
    ];

    /// Stable numeric id, as stored in the status table.
    pub fn id(self) -> u8 {
        match self {
            QuotationStatus::Draft => 1,
            QuotationStatus::Sent => 2,
            QuotationStatus::UnderReview => 3,
            QuotationStatus::Negotiation => 4,
            QuotationStatus::Approved => 5,
            QuotationStatus::Rejected => 6,
            QuotationStatus::Expired => 7,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    /// Approved, rejected and expired quotations are closed.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            QuotationStatus::Approved | QuotationStatus::Rejected | QuotationStatus::Expired
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuotationStatus::Draft => "draft",
            QuotationStatus::Sent => "sent",
            QuotationStatus::UnderReview => "under_review",
            QuotationStatus::Negotiation => "negotiation",
            QuotationStatus::Approved => "approved",
            QuotationStatus::Rejected => "rejected",
            QuotationStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for QuotationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuotationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        if let Ok(id) = normalized.parse::<u8>() {
            return Self::from_id(id).ok_or_else(|| format!("unknown quotation status id {}", id));
        }
        if normalized == "contracted" {
            return Ok(QuotationStatus::Approved);
        }
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("unknown quotation status '{}'", s))
    }
}

// ---------------------------------------------------------------------------
// Quotation rows
// ---------------------------------------------------------------------------

/// Product rows come from the catalog; item rows are complementary
/// materials and services. Both price the same way.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    #[default]
    Product,
    Item,
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineKind::Product => write!(f, "product"),
            LineKind::Item => write!(f, "item"),
        }
    }
}

/// A row as submitted by a caller, before it has an id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDraft {
    pub kind: LineKind,
    pub description: String,
    pub quantity: Decimal,
    /// Unit price in COP.
    pub unit_price: Decimal,
    /// Fraction, `0.15` for fifteen percent.
    pub profit_percentage: Decimal,
}

/// A persisted quotation row.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationLine {
    pub id: LineId,
    pub quotation_id: QuotationId,
    pub kind: LineKind,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub profit_percentage: Decimal,
    /// Order of the row within its quotation.
    pub position: u32,
}

impl QuotationLine {
    pub fn input(&self) -> LineInput {
        LineInput {
            quantity: self.quantity,
            unit_price: self.unit_price,
            profit_percentage: self.profit_percentage,
        }
    }
}

impl From<&QuotationLine> for LineDraft {
    fn from(line: &QuotationLine) -> Self {
        Self {
            kind: line.kind,
            description: line.description.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            profit_percentage: line.profit_percentage,
        }
    }
}

// ---------------------------------------------------------------------------
// Quotation
// ---------------------------------------------------------------------------

/// Fields of a quotation before the store assigns its id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewQuotation {
    pub number: String,
    pub client_id: u64,
    pub client_name: String,
    pub project_name: String,
    pub power_kwp: Decimal,
    pub rates: CascadeRates,
    pub valid_until: NaiveDate,
    pub created_by: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotation {
    pub id: QuotationId,
    /// Human-facing number, e.g. `COT-2026-0007`.
    pub number: String,
    pub client_id: u64,
    pub client_name: String,
    pub project_name: String,
    /// Installed power of the proposed system, in kWp.
    pub power_kwp: Decimal,
    pub status: QuotationStatus,
    pub rates: CascadeRates,
    /// Derived outputs. Always re-derived in full from rows and rates.
    pub totals: Option<CascadeBreakdown>,
    pub calculated_at: Option<DateTime<Utc>>,
    pub valid_until: NaiveDate,
    pub created_by: u64,
    pub created_at: DateTime<Utc>,
    pub updated_by: u64,
    pub updated_at: DateTime<Utc>,
}

impl Quotation {
    pub fn total_value(&self) -> Option<Decimal> {
        self.totals.map(|t| t.total_value)
    }
}

/// One row of the quotation status audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationStatusHistory {
    pub id: HistoryId,
    pub quotation_id: QuotationId,
    pub from: QuotationStatus,
    pub to: QuotationStatus,
    pub changed_by: u64,
    pub changed_at: DateTime<Utc>,
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    pub id: ProjectStateId,
    pub name: String,
    pub is_active: bool,
}

/// Fields of a project before the store assigns its id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewProject {
    pub quotation_id: QuotationId,
    pub code: String,
    pub name: String,
    pub client_id: u64,
    pub power_kwp: Decimal,
    pub state_id: ProjectStateId,
    pub created_by: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub quotation_id: QuotationId,
    pub code: String,
    pub name: String,
    pub client_id: u64,
    pub power_kwp: Decimal,
    pub state_id: ProjectStateId,
    pub created_by: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCostCenter {
    pub code: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostCenter {
    pub id: CostCenterId,
    pub project_id: ProjectId,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Time a project spent in one state. `left_at` is `None` while open.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStateHistory {
    pub id: HistoryId,
    pub project_id: ProjectId,
    pub state_id: ProjectStateId,
    pub entered_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub duration_days: Option<i64>,
    pub changed_by: u64,
}

// ---------------------------------------------------------------------------
// Pricing pipeline query and candidate
// ---------------------------------------------------------------------------

/// Request to price one quotation from its persisted rows.
#[derive(Clone, Debug)]
pub struct PricingQuery {
    pub request_id: String,
    pub quotation_id: QuotationId,
    pub rates: CascadeRates,
    pub rounding: RoundingPolicy,
    /// Filled in by the clock hydrator when absent.
    pub calculated_at: Option<DateTime<Utc>>,
}

impl HasRequestId for PricingQuery {
    fn request_id(&self) -> &str {
        &self.request_id
    }
}

/// A quotation row travelling through the pricing pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LineCandidate {
    pub line: QuotationLine,
    /// Populated by the valuation hydrator.
    pub valuation: Option<LineValuation>,
}

impl From<QuotationLine> for LineCandidate {
    fn from(line: QuotationLine) -> Self {
        Self {
            line,
            valuation: None,
        }
    }
}
