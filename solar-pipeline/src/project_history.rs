//! Project state tracking.
//!
//! A project is always in exactly one state. Every move closes the open
//! history entry and opens a new one.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::ServiceResult;
use crate::store::{ClosedStateEntry, ProjectStateChange, QuotationStore};
use crate::types::{Actor, ProjectId, ProjectStateHistory, ProjectStateId};

/// Whole days spent in a state, never less than one.
///
/// A project that enters and leaves a state on the same day is still
/// reported as having spent a day in it.
pub fn state_duration_days(entered_at: DateTime<Utc>, left_at: DateTime<Utc>) -> i64 {
    (left_at - entered_at).num_days().max(1)
}

pub struct ProjectStateTracker {
    store: Arc<dyn QuotationStore>,
    clock: Arc<dyn Clock>,
}

impl ProjectStateTracker {
    pub fn new(store: Arc<dyn QuotationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Move a project into `state_id`.
    ///
    /// Returns the newly opened entry, or `None` when the project is already
    /// in that state.
    pub async fn change_project_state(
        &self,
        actor: &Actor,
        project_id: ProjectId,
        state_id: ProjectStateId,
    ) -> ServiceResult<Option<ProjectStateHistory>> {
        let project = self.store.project(project_id).await?;
        if project.state_id == state_id {
            return Ok(None);
        }

        let now = self.clock.now();
        let close = self
            .store
            .project_state_history(project_id)
            .await?
            .into_iter()
            .rev()
            .find(|entry| entry.left_at.is_none())
            .map(|open| ClosedStateEntry {
                id: open.id,
                left_at: now,
                duration_days: state_duration_days(open.entered_at, now),
            });

        let entry = self
            .store
            .apply_project_state_change(ProjectStateChange {
                project_id,
                state_id,
                at: now,
                changed_by: actor.user_id,
                close,
            })
            .await?;

        log::info!(
            "project_id={} moved from state {} to {} by user {}",
            project_id,
            project.state_id,
            state_id,
            actor.user_id
        );
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn duration_is_whole_days() {
        let entered = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(state_duration_days(entered, entered + Duration::days(10)), 10);
        assert_eq!(
            state_duration_days(entered, entered + Duration::days(3) + Duration::hours(23)),
            3
        );
    }

    #[test]
    fn same_day_counts_as_one() {
        let entered = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(state_duration_days(entered, entered), 1);
        assert_eq!(state_duration_days(entered, entered + Duration::hours(5)), 1);
    }
}
