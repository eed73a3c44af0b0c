//! Persistence seam.
//!
//! The relational store is opaque to the rest of the crate: everything goes
//! through [`QuotationStore`]. Each method is atomic. Methods that touch more
//! than one table (quotation plus rows, status plus history, project plus cost
//! center plus first state entry) commit all of it or none of it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use solar_pricing::{CascadeBreakdown, CascadeRates};

use crate::error::StoreResult;
use crate::types::{
    CostCenter, HistoryId, LineDraft, LineKind, NewCostCenter, NewProject, NewQuotation, Project,
    ProjectId, ProjectState, ProjectStateHistory, ProjectStateId, Quotation, QuotationId,
    QuotationLine, QuotationStatus, QuotationStatusHistory,
};

/// A status change to record together with its audit row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub quotation_id: QuotationId,
    pub to: QuotationStatus,
    pub changed_by: u64,
    pub changed_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Fields derived by a pricing run. Writing them never touches the status
/// or the inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedTotals {
    pub totals: CascadeBreakdown,
    pub calculated_at: DateTime<Utc>,
    pub updated_by: u64,
    pub updated_at: DateTime<Utc>,
}

/// New inputs for a quotation that is still open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputEdit {
    pub rates: CascadeRates,
    /// Replaces every row when given.
    pub lines: Option<Vec<LineDraft>>,
    pub updated_by: u64,
    pub updated_at: DateTime<Utc>,
}

/// Inputs and totals as they were before an edit, put back when re-pricing
/// the edit fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputSnapshot {
    pub rates: CascadeRates,
    pub lines: Option<Vec<LineDraft>>,
    pub totals: Option<CascadeBreakdown>,
    pub calculated_at: Option<DateTime<Utc>>,
    pub updated_by: u64,
    pub updated_at: DateTime<Utc>,
}

/// Closing an open project state entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClosedStateEntry {
    pub id: HistoryId,
    pub left_at: DateTime<Utc>,
    pub duration_days: i64,
}

/// Moving a project into a new state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectStateChange {
    pub project_id: ProjectId,
    pub state_id: ProjectStateId,
    pub at: DateTime<Utc>,
    pub changed_by: u64,
    pub close: Option<ClosedStateEntry>,
}

#[async_trait]
pub trait QuotationStore: Send + Sync {
    /// Next value of the yearly quotation number sequence, starting at 1.
    async fn next_quotation_sequence(&self, year: i32) -> StoreResult<u32>;

    /// Insert a draft quotation and its rows.
    async fn insert_quotation(
        &self,
        quotation: NewQuotation,
        lines: Vec<LineDraft>,
    ) -> StoreResult<Quotation>;

    /// Replace the rates, and the rows when given, of an open quotation.
    ///
    /// The open check and the write happen together: a quotation that is
    /// approved, rejected or expired fails with `StoreError::QuotationClosed`.
    async fn edit_inputs(&self, id: QuotationId, edit: InputEdit) -> StoreResult<Quotation>;

    /// Put back inputs and totals captured before an edit. The status is
    /// left as it is.
    async fn restore_inputs(&self, id: QuotationId, snapshot: InputSnapshot) -> StoreResult<()>;

    /// Write the derived totals and return the quotation as stored.
    async fn save_totals(&self, id: QuotationId, totals: SavedTotals) -> StoreResult<Quotation>;

    async fn delete_quotation(&self, id: QuotationId) -> StoreResult<()>;

    async fn quotation(&self, id: QuotationId) -> StoreResult<Quotation>;

    async fn quotations(&self) -> StoreResult<Vec<Quotation>>;

    /// Rows of one kind, ordered by position.
    async fn lines(&self, id: QuotationId, kind: LineKind) -> StoreResult<Vec<QuotationLine>>;

    /// Set the status and append the audit row. Returns `None` without
    /// writing anything when the quotation already has that status.
    async fn change_status(
        &self,
        change: StatusChange,
    ) -> StoreResult<Option<QuotationStatusHistory>>;

    async fn status_history(&self, id: QuotationId) -> StoreResult<Vec<QuotationStatusHistory>>;

    async fn project_for_quotation(&self, id: QuotationId) -> StoreResult<Option<Project>>;

    async fn project(&self, id: ProjectId) -> StoreResult<Project>;

    /// Insert a project, its cost center and its first state entry.
    ///
    /// At most one project exists per quotation; a second insert fails with
    /// `StoreError::UniqueViolation`.
    async fn insert_project(
        &self,
        project: NewProject,
        cost_center: NewCostCenter,
    ) -> StoreResult<(Project, CostCenter)>;

    async fn cost_center_for_project(&self, id: ProjectId) -> StoreResult<Option<CostCenter>>;

    /// Project states ordered by id.
    async fn project_states(&self) -> StoreResult<Vec<ProjectState>>;

    /// State entries of a project, oldest first.
    async fn project_state_history(&self, id: ProjectId) -> StoreResult<Vec<ProjectStateHistory>>;

    /// Close the open entry (if any), move the project, open a new entry.
    async fn apply_project_state_change(
        &self,
        change: ProjectStateChange,
    ) -> StoreResult<ProjectStateHistory>;
}
