//! In-memory [`QuotationStore`].
//!
//! All tables live behind one `tokio::sync::Mutex`; each trait method holds
//! the lock for its whole body, which makes every method a transaction.
//! The `projects_by_quotation` index is the unique constraint that keeps
//! concurrent approvals from creating two projects.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::store::{
    InputEdit, InputSnapshot, ProjectStateChange, QuotationStore, SavedTotals, StatusChange,
};
use crate::types::{
    CostCenter, CostCenterId, HistoryId, LineDraft, LineId, LineKind, NewCostCenter, NewProject,
    NewQuotation, Project, ProjectId, ProjectState, ProjectStateHistory, ProjectStateId,
    Quotation, QuotationId, QuotationLine, QuotationStatus, QuotationStatusHistory,
};

#[derive(Default)]
struct Tables {
    next_id: u64,
    sequences: HashMap<i32, u32>,
    quotations: BTreeMap<QuotationId, Quotation>,
    lines: BTreeMap<QuotationId, Vec<QuotationLine>>,
    status_history: Vec<QuotationStatusHistory>,
    projects: BTreeMap<ProjectId, Project>,
    projects_by_quotation: HashMap<QuotationId, ProjectId>,
    cost_centers: BTreeMap<CostCenterId, CostCenter>,
    project_states: Vec<ProjectState>,
    state_history: Vec<ProjectStateHistory>,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn materialize_lines(&mut self, quotation_id: QuotationId, drafts: Vec<LineDraft>) -> Vec<QuotationLine> {
        drafts
            .into_iter()
            .enumerate()
            .map(|(position, draft)| QuotationLine {
                id: LineId(self.next_id()),
                quotation_id,
                kind: draft.kind,
                description: draft.description,
                quantity: draft.quantity,
                unit_price: draft.unit_price,
                profit_percentage: draft.profit_percentage,
                position: position as u32,
            })
            .collect()
    }

    fn quotation_mut(&mut self, id: QuotationId) -> StoreResult<&mut Quotation> {
        self.quotations.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "quotation",
            id: id.0,
        })
    }
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store with no project states.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }

    /// A store seeded with the given project states.
    pub fn with_project_states(states: Vec<ProjectState>) -> Self {
        Self {
            tables: Mutex::new(Tables {
                project_states: states,
                ..Tables::default()
            }),
        }
    }

    /// A store seeded with the standard installation workflow.
    pub fn with_default_project_states() -> Self {
        Self::with_project_states(default_project_states())
    }
}

/// The standard solar installation workflow, first state first.
pub fn default_project_states() -> Vec<ProjectState> {
    [
        ("Initiated", true),
        ("Engineering", true),
        ("Procurement", true),
        ("Installation", true),
        ("Commissioning", true),
        ("Closed", false),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, (name, is_active))| ProjectState {
        id: ProjectStateId(i as u64 + 1),
        name: name.to_string(),
        is_active,
    })
    .collect()
}

#[async_trait]
impl QuotationStore for MemoryStore {
    async fn next_quotation_sequence(&self, year: i32) -> StoreResult<u32> {
        let mut tables = self.tables.lock().await;
        let sequence = tables.sequences.entry(year).or_insert(0);
        *sequence += 1;
        Ok(*sequence)
    }

    async fn insert_quotation(
        &self,
        quotation: NewQuotation,
        lines: Vec<LineDraft>,
    ) -> StoreResult<Quotation> {
        let mut tables = self.tables.lock().await;
        if tables.quotations.values().any(|q| q.number == quotation.number) {
            return Err(StoreError::UniqueViolation {
                constraint: "quotations_number_unique",
            });
        }

        let id = QuotationId(tables.next_id());
        let row = Quotation {
            id,
            number: quotation.number,
            client_id: quotation.client_id,
            client_name: quotation.client_name,
            project_name: quotation.project_name,
            power_kwp: quotation.power_kwp,
            status: QuotationStatus::Draft,
            rates: quotation.rates,
            totals: None,
            calculated_at: None,
            valid_until: quotation.valid_until,
            created_by: quotation.created_by,
            created_at: quotation.created_at,
            updated_by: quotation.created_by,
            updated_at: quotation.created_at,
        };
        let lines = tables.materialize_lines(id, lines);
        tables.lines.insert(id, lines);
        tables.quotations.insert(id, row.clone());
        Ok(row)
    }

    async fn edit_inputs(&self, id: QuotationId, edit: InputEdit) -> StoreResult<Quotation> {
        let mut tables = self.tables.lock().await;
        let quotation = tables.quotation_mut(id)?;
        if quotation.status.is_final() {
            return Err(StoreError::QuotationClosed {
                id: id.0,
                status: quotation.status,
            });
        }
        quotation.rates = edit.rates;
        quotation.updated_by = edit.updated_by;
        quotation.updated_at = edit.updated_at;
        let row = quotation.clone();
        if let Some(drafts) = edit.lines {
            let lines = tables.materialize_lines(id, drafts);
            tables.lines.insert(id, lines);
        }
        Ok(row)
    }

    async fn restore_inputs(&self, id: QuotationId, snapshot: InputSnapshot) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        let quotation = tables.quotation_mut(id)?;
        quotation.rates = snapshot.rates;
        quotation.totals = snapshot.totals;
        quotation.calculated_at = snapshot.calculated_at;
        quotation.updated_by = snapshot.updated_by;
        quotation.updated_at = snapshot.updated_at;
        if let Some(drafts) = snapshot.lines {
            let lines = tables.materialize_lines(id, drafts);
            tables.lines.insert(id, lines);
        }
        Ok(())
    }

    async fn save_totals(&self, id: QuotationId, totals: SavedTotals) -> StoreResult<Quotation> {
        let mut tables = self.tables.lock().await;
        let quotation = tables.quotation_mut(id)?;
        quotation.totals = Some(totals.totals);
        quotation.calculated_at = Some(totals.calculated_at);
        quotation.updated_by = totals.updated_by;
        quotation.updated_at = totals.updated_at;
        Ok(quotation.clone())
    }

    async fn delete_quotation(&self, id: QuotationId) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.projects_by_quotation.contains_key(&id) {
            return Err(StoreError::Integrity(format!(
                "quotation {} has a project and cannot be deleted",
                id
            )));
        }
        tables.quotation_mut(id)?;
        tables.quotations.remove(&id);
        tables.lines.remove(&id);
        tables.status_history.retain(|h| h.quotation_id != id);
        Ok(())
    }

    async fn quotation(&self, id: QuotationId) -> StoreResult<Quotation> {
        let tables = self.tables.lock().await;
        tables.quotations.get(&id).cloned().ok_or(StoreError::NotFound {
            entity: "quotation",
            id: id.0,
        })
    }

    async fn quotations(&self) -> StoreResult<Vec<Quotation>> {
        let tables = self.tables.lock().await;
        Ok(tables.quotations.values().cloned().collect())
    }

    async fn lines(&self, id: QuotationId, kind: LineKind) -> StoreResult<Vec<QuotationLine>> {
        let tables = self.tables.lock().await;
        if !tables.quotations.contains_key(&id) {
            return Err(StoreError::NotFound {
                entity: "quotation",
                id: id.0,
            });
        }
        let mut lines: Vec<QuotationLine> = tables
            .lines
            .get(&id)
            .map(|lines| lines.iter().filter(|l| l.kind == kind).cloned().collect())
            .unwrap_or_default();
        lines.sort_by_key(|l| l.position);
        Ok(lines)
    }

    async fn change_status(
        &self,
        change: StatusChange,
    ) -> StoreResult<Option<QuotationStatusHistory>> {
        let mut tables = self.tables.lock().await;
        let history_id = HistoryId(tables.next_id());
        let quotation = tables.quotation_mut(change.quotation_id)?;
        let from = quotation.status;
        if from == change.to {
            return Ok(None);
        }
        quotation.status = change.to;
        quotation.updated_by = change.changed_by;
        quotation.updated_at = change.changed_at;

        let row = QuotationStatusHistory {
            id: history_id,
            quotation_id: change.quotation_id,
            from,
            to: change.to,
            changed_by: change.changed_by,
            changed_at: change.changed_at,
            note: change.note,
        };
        tables.status_history.push(row.clone());
        Ok(Some(row))
    }

    async fn status_history(&self, id: QuotationId) -> StoreResult<Vec<QuotationStatusHistory>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .status_history
            .iter()
            .filter(|h| h.quotation_id == id)
            .cloned()
            .collect())
    }

    async fn project_for_quotation(&self, id: QuotationId) -> StoreResult<Option<Project>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .projects_by_quotation
            .get(&id)
            .and_then(|project_id| tables.projects.get(project_id))
            .cloned())
    }

    async fn project(&self, id: ProjectId) -> StoreResult<Project> {
        let tables = self.tables.lock().await;
        tables.projects.get(&id).cloned().ok_or(StoreError::NotFound {
            entity: "project",
            id: id.0,
        })
    }

    async fn insert_project(
        &self,
        project: NewProject,
        cost_center: NewCostCenter,
    ) -> StoreResult<(Project, CostCenter)> {
        let mut tables = self.tables.lock().await;
        if tables.projects_by_quotation.contains_key(&project.quotation_id) {
            return Err(StoreError::UniqueViolation {
                constraint: "projects_quotation_id_unique",
            });
        }
        if !tables.quotations.contains_key(&project.quotation_id) {
            return Err(StoreError::NotFound {
                entity: "quotation",
                id: project.quotation_id.0,
            });
        }
        if !tables.project_states.iter().any(|s| s.id == project.state_id) {
            return Err(StoreError::NotFound {
                entity: "project_state",
                id: project.state_id.0,
            });
        }

        let project_id = ProjectId(tables.next_id());
        let row = Project {
            id: project_id,
            quotation_id: project.quotation_id,
            code: project.code,
            name: project.name,
            client_id: project.client_id,
            power_kwp: project.power_kwp,
            state_id: project.state_id,
            created_by: project.created_by,
            created_at: project.created_at,
        };
        let center = CostCenter {
            id: CostCenterId(tables.next_id()),
            project_id,
            code: cost_center.code,
            name: cost_center.name,
            created_at: project.created_at,
        };
        let entry = ProjectStateHistory {
            id: HistoryId(tables.next_id()),
            project_id,
            state_id: project.state_id,
            entered_at: project.created_at,
            left_at: None,
            duration_days: None,
            changed_by: project.created_by,
        };

        tables
            .projects_by_quotation
            .insert(project.quotation_id, project_id);
        tables.projects.insert(project_id, row.clone());
        tables.cost_centers.insert(center.id, center.clone());
        tables.state_history.push(entry);
        Ok((row, center))
    }

    async fn cost_center_for_project(&self, id: ProjectId) -> StoreResult<Option<CostCenter>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .cost_centers
            .values()
            .find(|c| c.project_id == id)
            .cloned())
    }

    async fn project_states(&self) -> StoreResult<Vec<ProjectState>> {
        let tables = self.tables.lock().await;
        let mut states = tables.project_states.clone();
        states.sort_by_key(|s| s.id);
        Ok(states)
    }

    async fn project_state_history(&self, id: ProjectId) -> StoreResult<Vec<ProjectStateHistory>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .state_history
            .iter()
            .filter(|h| h.project_id == id)
            .cloned()
            .collect())
    }

    async fn apply_project_state_change(
        &self,
        change: ProjectStateChange,
    ) -> StoreResult<ProjectStateHistory> {
        let mut tables = self.tables.lock().await;
        if !tables.project_states.iter().any(|s| s.id == change.state_id) {
            return Err(StoreError::NotFound {
                entity: "project_state",
                id: change.state_id.0,
            });
        }
        if !tables.projects.contains_key(&change.project_id) {
            return Err(StoreError::NotFound {
                entity: "project",
                id: change.project_id.0,
            });
        }

        if let Some(close) = &change.close {
            let entry = tables
                .state_history
                .iter_mut()
                .find(|h| h.id == close.id && h.project_id == change.project_id)
                .ok_or(StoreError::NotFound {
                    entity: "project_state_history",
                    id: close.id.0,
                })?;
            if entry.left_at.is_some() {
                return Err(StoreError::Integrity(format!(
                    "state entry {} is already closed",
                    close.id
                )));
            }
            entry.left_at = Some(close.left_at);
            entry.duration_days = Some(close.duration_days);
        }

        let entry = ProjectStateHistory {
            id: HistoryId(tables.next_id()),
            project_id: change.project_id,
            state_id: change.state_id,
            entered_at: change.at,
            left_at: None,
            duration_days: None,
            changed_by: change.changed_by,
        };
        if let Some(project) = tables.projects.get_mut(&change.project_id) {
            project.state_id = change.state_id;
        }
        tables.state_history.push(entry.clone());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use solar_pricing::CascadeRates;

    fn new_quotation(number: &str) -> NewQuotation {
        NewQuotation {
            number: number.into(),
            client_id: 7,
            client_name: "Finca La Esperanza".into(),
            project_name: "Rooftop 12 kWp".into(),
            power_kwp: dec!(12),
            rates: CascadeRates::default(),
            valid_until: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            created_by: 1,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        }
    }

    fn draft(kind: LineKind, description: &str) -> LineDraft {
        LineDraft {
            kind,
            description: description.into(),
            quantity: dec!(1),
            unit_price: dec!(100),
            profit_percentage: dec!(0.1),
        }
    }

    #[tokio::test]
    async fn sequences_are_per_year() {
        let store = MemoryStore::new();
        assert_eq!(store.next_quotation_sequence(2026).await.unwrap(), 1);
        assert_eq!(store.next_quotation_sequence(2026).await.unwrap(), 2);
        assert_eq!(store.next_quotation_sequence(2027).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lines_are_split_by_kind_in_position_order() {
        let store = MemoryStore::new();
        let q = store
            .insert_quotation(
                new_quotation("COT-2026-0001"),
                vec![
                    draft(LineKind::Product, "panel"),
                    draft(LineKind::Item, "cable"),
                    draft(LineKind::Product, "inverter"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(q.status, QuotationStatus::Draft);

        let products = store.lines(q.id, LineKind::Product).await.unwrap();
        let names: Vec<&str> = products.iter().map(|l| l.description.as_str()).collect();
        assert_eq!(names, vec!["panel", "inverter"]);
        assert_eq!(store.lines(q.id, LineKind::Item).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_quotation_number_is_rejected() {
        let store = MemoryStore::new();
        store
            .insert_quotation(new_quotation("COT-2026-0001"), Vec::new())
            .await
            .unwrap();
        let err = store
            .insert_quotation(new_quotation("COT-2026-0001"), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn same_status_change_writes_nothing() {
        let store = MemoryStore::new();
        let q = store
            .insert_quotation(new_quotation("COT-2026-0001"), Vec::new())
            .await
            .unwrap();
        let change = StatusChange {
            quotation_id: q.id,
            to: QuotationStatus::Draft,
            changed_by: 1,
            changed_at: q.created_at,
            note: None,
        };
        assert_eq!(store.change_status(change).await.unwrap(), None);
        assert!(store.status_history(q.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_project_for_quotation_violates_unique_constraint() {
        let store = MemoryStore::with_default_project_states();
        let q = store
            .insert_quotation(new_quotation("COT-2026-0001"), Vec::new())
            .await
            .unwrap();
        let project = NewProject {
            quotation_id: q.id,
            code: "PRJ-2026-0001".into(),
            name: q.project_name.clone(),
            client_id: q.client_id,
            power_kwp: q.power_kwp,
            state_id: ProjectStateId(1),
            created_by: 1,
            created_at: q.created_at,
        };
        let center = NewCostCenter {
            code: "CC-PRJ-2026-0001".into(),
            name: q.project_name.clone(),
        };

        let (created, cc) = store
            .insert_project(project.clone(), center.clone())
            .await
            .unwrap();
        assert_eq!(cc.project_id, created.id);
        assert_eq!(store.project_state_history(created.id).await.unwrap().len(), 1);

        let err = store.insert_project(project, center).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::UniqueViolation {
                constraint: "projects_quotation_id_unique"
            }
        );
    }

    #[tokio::test]
    async fn quotation_with_project_cannot_be_deleted() {
        let store = MemoryStore::with_default_project_states();
        let q = store
            .insert_quotation(new_quotation("COT-2026-0001"), Vec::new())
            .await
            .unwrap();
        store
            .insert_project(
                NewProject {
                    quotation_id: q.id,
                    code: "PRJ-1".into(),
                    name: "x".into(),
                    client_id: 1,
                    power_kwp: dec!(1),
                    state_id: ProjectStateId(1),
                    created_by: 1,
                    created_at: q.created_at,
                },
                NewCostCenter {
                    code: "CC-1".into(),
                    name: "x".into(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            store.delete_quotation(q.id).await,
            Err(StoreError::Integrity(_))
        ));
    }

    fn approve(q: &Quotation) -> StatusChange {
        StatusChange {
            quotation_id: q.id,
            to: QuotationStatus::Approved,
            changed_by: 2,
            changed_at: q.created_at,
            note: None,
        }
    }

    #[tokio::test]
    async fn saving_totals_keeps_status() {
        let store = MemoryStore::new();
        let q = store
            .insert_quotation(new_quotation("COT-2026-0001"), Vec::new())
            .await
            .unwrap();
        store.change_status(approve(&q)).await.unwrap();

        let saved = store
            .save_totals(
                q.id,
                SavedTotals {
                    totals: Default::default(),
                    calculated_at: q.created_at,
                    updated_by: 3,
                    updated_at: q.created_at,
                },
            )
            .await
            .unwrap();
        assert_eq!(saved.status, QuotationStatus::Approved);
        assert_eq!(saved.updated_by, 3);
        assert!(saved.totals.is_some());
    }

    #[tokio::test]
    async fn closed_quotation_inputs_cannot_be_edited() {
        let store = MemoryStore::new();
        let q = store
            .insert_quotation(new_quotation("COT-2026-0001"), vec![draft(LineKind::Product, "panel")])
            .await
            .unwrap();
        store.change_status(approve(&q)).await.unwrap();

        let err = store
            .edit_inputs(
                q.id,
                InputEdit {
                    rates: CascadeRates::default(),
                    lines: Some(Vec::new()),
                    updated_by: 2,
                    updated_at: q.created_at,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::QuotationClosed {
                id: q.id.0,
                status: QuotationStatus::Approved
            }
        );
        assert_eq!(store.lines(q.id, LineKind::Product).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn restoring_inputs_keeps_status() {
        let store = MemoryStore::new();
        let q = store
            .insert_quotation(new_quotation("COT-2026-0001"), vec![draft(LineKind::Product, "panel")])
            .await
            .unwrap();
        store
            .edit_inputs(
                q.id,
                InputEdit {
                    rates: CascadeRates {
                        profit: dec!(0.2),
                        ..CascadeRates::default()
                    },
                    lines: Some(vec![draft(LineKind::Item, "cable")]),
                    updated_by: 2,
                    updated_at: q.created_at,
                },
            )
            .await
            .unwrap();
        store.change_status(approve(&q)).await.unwrap();

        store
            .restore_inputs(
                q.id,
                InputSnapshot {
                    rates: q.rates,
                    lines: Some(vec![draft(LineKind::Product, "panel")]),
                    totals: None,
                    calculated_at: None,
                    updated_by: q.updated_by,
                    updated_at: q.updated_at,
                },
            )
            .await
            .unwrap();
        let restored = store.quotation(q.id).await.unwrap();
        assert_eq!(restored.status, QuotationStatus::Approved);
        assert_eq!(restored.rates, q.rates);
        let products = store.lines(q.id, LineKind::Product).await.unwrap();
        assert_eq!(products[0].description, "panel");
        assert!(store.lines(q.id, LineKind::Item).await.unwrap().is_empty());
    }

    #[test]
    fn default_states_start_with_initiated() {
        let states = default_project_states();
        assert_eq!(states[0].name, "Initiated");
        assert!(states[0].is_active);
        assert!(!states.last().unwrap().is_active);
    }
}
