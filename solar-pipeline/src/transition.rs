//! Quotation status transitions and project provisioning.
//!
//! This is the single place where a quotation changes status. Moving a
//! quotation to [`QuotationStatus::Approved`] provisions its project and cost
//! center. Provisioning never undoes the status change: whatever happens
//! there is reported in [`TransitionOutcome::provisioning`].

use serde::Serialize;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::PricingConfig;
use crate::error::{ServiceResult, StoreError};
use crate::store::{QuotationStore, StatusChange};
use crate::types::{
    Actor, CostCenter, NewCostCenter, NewProject, Project, ProjectId, ProjectState, Quotation,
    QuotationId, QuotationStatus, QuotationStatusHistory,
};
use crate::util;

/// What approval did about the quotation's project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProvisioningResult {
    /// The target status does not provision.
    NotApplicable,
    Created {
        project: Project,
        cost_center: CostCenter,
    },
    /// The quotation already had a project; nothing was written.
    AlreadyProvisioned { project_id: ProjectId },
    /// The status change stands but no project was created.
    Failed { reason: String },
}

impl ProvisioningResult {
    /// The quotation's project, whether created now or earlier.
    pub fn project_id(&self) -> Option<ProjectId> {
        match self {
            ProvisioningResult::Created { project, .. } => Some(project.id),
            ProvisioningResult::AlreadyProvisioned { project_id } => Some(*project_id),
            ProvisioningResult::NotApplicable | ProvisioningResult::Failed { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    /// The quotation as it is after the transition.
    pub quotation: Quotation,
    /// The audit row, `None` when the status did not change.
    pub change: Option<QuotationStatusHistory>,
    pub provisioning: ProvisioningResult,
}

pub struct StatusTransitionHandler {
    store: Arc<dyn QuotationStore>,
    clock: Arc<dyn Clock>,
    config: Arc<PricingConfig>,
}

impl StatusTransitionHandler {
    pub fn new(
        store: Arc<dyn QuotationStore>,
        clock: Arc<dyn Clock>,
        config: Arc<PricingConfig>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Move a quotation to `to` and provision its project on approval.
    ///
    /// Every transition is permitted. Re-approving an approved quotation
    /// writes no history but still runs provisioning, which is a no-op once
    /// the project exists and completes it if an earlier attempt failed.
    pub async fn transition_status(
        &self,
        actor: &Actor,
        quotation_id: QuotationId,
        to: QuotationStatus,
        note: Option<String>,
    ) -> ServiceResult<TransitionOutcome> {
        let change = self
            .store
            .change_status(StatusChange {
                quotation_id,
                to,
                changed_by: actor.user_id,
                changed_at: self.clock.now(),
                note,
            })
            .await?;

        match &change {
            Some(row) => log::info!(
                "quotation_id={} status {} -> {} by user {}",
                quotation_id,
                row.from,
                row.to,
                actor.user_id
            ),
            None => log::debug!("quotation_id={} already {}", quotation_id, to),
        }

        let quotation = self.store.quotation(quotation_id).await?;
        let provisioning = if to == QuotationStatus::Approved {
            self.provision(actor, &quotation).await
        } else {
            ProvisioningResult::NotApplicable
        };

        Ok(TransitionOutcome {
            quotation,
            change,
            provisioning,
        })
    }

    async fn provision(&self, actor: &Actor, quotation: &Quotation) -> ProvisioningResult {
        let result = self.try_provision(actor, quotation).await;
        match &result {
            ProvisioningResult::Created { project, cost_center } => log::info!(
                "quotation_id={} provisioned project {} ({}) with cost center {}",
                quotation.id,
                project.id,
                project.code,
                cost_center.code
            ),
            ProvisioningResult::AlreadyProvisioned { project_id } => log::info!(
                "quotation_id={} already has project {}",
                quotation.id,
                project_id
            ),
            ProvisioningResult::Failed { reason } => log::error!(
                "quotation_id={} project provisioning failed: {}",
                quotation.id,
                reason
            ),
            ProvisioningResult::NotApplicable => {}
        }
        result
    }

    async fn try_provision(&self, actor: &Actor, quotation: &Quotation) -> ProvisioningResult {
        match self.store.project_for_quotation(quotation.id).await {
            Ok(Some(project)) => {
                return ProvisioningResult::AlreadyProvisioned {
                    project_id: project.id,
                }
            }
            Ok(None) => {}
            Err(e) => return failed(e),
        }

        let states = match self.store.project_states().await {
            Ok(states) => states,
            Err(e) => return failed(e),
        };
        let Some(initial) = initial_state(&states, &self.config.initial_state_names) else {
            return failed("no project states are configured");
        };

        let code = util::reprefix_code(
            &quotation.number,
            &self.config.number_prefix,
            &self.config.project_prefix,
        );
        let project = NewProject {
            quotation_id: quotation.id,
            code: code.clone(),
            name: quotation.project_name.clone(),
            client_id: quotation.client_id,
            power_kwp: quotation.power_kwp,
            state_id: initial.id,
            created_by: actor.user_id,
            created_at: self.clock.now(),
        };
        let cost_center = NewCostCenter {
            code: format!("{}-{}", self.config.cost_center_prefix, code),
            name: quotation.project_name.clone(),
        };

        match self.store.insert_project(project, cost_center).await {
            Ok((project, cost_center)) => ProvisioningResult::Created {
                project,
                cost_center,
            },
            // A concurrent approval got there first.
            Err(StoreError::UniqueViolation { .. }) => {
                match self.store.project_for_quotation(quotation.id).await {
                    Ok(Some(project)) => ProvisioningResult::AlreadyProvisioned {
                        project_id: project.id,
                    },
                    Ok(None) => failed("unique violation but no project found"),
                    Err(e) => failed(e),
                }
            }
            Err(e) => failed(e),
        }
    }
}

fn failed(reason: impl ToString) -> ProvisioningResult {
    ProvisioningResult::Failed {
        reason: reason.to_string(),
    }
}

/// First active state with one of the preferred names, else the first active
/// state, else the first state.
pub fn initial_state<'a>(
    states: &'a [ProjectState],
    preferred_names: &[String],
) -> Option<&'a ProjectState> {
    let preferred = |s: &&ProjectState| {
        preferred_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(s.name.trim()))
    };
    states
        .iter()
        .filter(|s| s.is_active)
        .find(preferred)
        .or_else(|| states.iter().find(|s| s.is_active))
        .or_else(|| states.first())
}
