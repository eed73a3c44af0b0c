//! Quotation service.
//!
//! Validates input at the boundary, numbers new quotations, prices them
//! through [`QuotationPricingPipeline`] and persists the result. Totals are
//! always re-derived in full from the persisted rows and rates.
//!
//! Create and update are all-or-nothing: rows are written first so the
//! pipeline can read them, and if pricing fails the write is rolled back.

use chrono::{Datelike, Days};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use solar_pricing::defaults::{MAX_LINES, MAX_LINE_QUANTITY, MAX_UNIT_PRICE};
use solar_pricing::CascadeRates;

use crate::clock::Clock;
use crate::config::PricingConfig;
use crate::error::{ServiceError, ServiceResult, StoreError, ValidationError};
use crate::pipelines::quotation_pricing::{PricingOutcome, QuotationPricingPipeline};
use crate::project_history::ProjectStateTracker;
use crate::store::{InputEdit, InputSnapshot, QuotationStore, SavedTotals};
use crate::transition::{StatusTransitionHandler, TransitionOutcome};
use crate::types::{
    Actor, LineDraft, LineKind, NewQuotation, PricingQuery, ProjectId, ProjectStateHistory,
    ProjectStateId, Quotation, QuotationId, QuotationStatus,
};
use crate::util;

/// Everything a caller supplies to open a quotation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationDraft {
    pub client_id: u64,
    pub client_name: String,
    pub project_name: String,
    pub power_kwp: Decimal,
    /// Falls back to the configured default rates.
    pub rates: Option<CascadeRates>,
    pub lines: Vec<LineDraft>,
}

/// Replacement inputs. `None` keeps the current value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationUpdate {
    pub lines: Option<Vec<LineDraft>>,
    pub rates: Option<CascadeRates>,
}

/// A quotation together with the calculation that produced its totals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PricedQuotation {
    pub quotation: Quotation,
    pub pricing: PricingOutcome,
}

pub struct QuotationService {
    store: Arc<dyn QuotationStore>,
    clock: Arc<dyn Clock>,
    config: Arc<PricingConfig>,
    pipeline: QuotationPricingPipeline,
    transitions: StatusTransitionHandler,
    project_states: ProjectStateTracker,
}

impl QuotationService {
    pub fn new(
        store: Arc<dyn QuotationStore>,
        clock: Arc<dyn Clock>,
        config: PricingConfig,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            pipeline: QuotationPricingPipeline::new(Arc::clone(&store), Arc::clone(&clock)),
            transitions: StatusTransitionHandler::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                Arc::clone(&config),
            ),
            project_states: ProjectStateTracker::new(Arc::clone(&store), Arc::clone(&clock)),
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn QuotationStore> {
        &self.store
    }

    /// Open a new draft quotation and price it.
    pub async fn create_quotation(
        &self,
        actor: &Actor,
        draft: QuotationDraft,
    ) -> ServiceResult<PricedQuotation> {
        let rates = draft.rates.unwrap_or(self.config.default_rates);
        validate_header(&draft.client_name, &draft.project_name, draft.power_kwp)?;
        validate_lines(&draft.lines)?;
        rates.validate().map_err(ValidationError::from)?;

        let valid_until = u64::try_from(self.config.quotation_validity_days)
            .ok()
            .and_then(|days| self.clock.today().checked_add_days(Days::new(days)))
            .ok_or(ValidationError::ValidityOutOfRange(
                self.config.quotation_validity_days,
            ))?;

        let now = self.clock.now();
        let year = now.year();
        let sequence = self.store.next_quotation_sequence(year).await?;
        let number = util::sequence_code(&self.config.number_prefix, year, sequence);

        let inserted = self
            .store
            .insert_quotation(
                NewQuotation {
                    number,
                    client_id: draft.client_id,
                    client_name: draft.client_name.trim().to_string(),
                    project_name: draft.project_name.trim().to_string(),
                    power_kwp: draft.power_kwp,
                    rates,
                    valid_until,
                    created_by: actor.user_id,
                    created_at: now,
                },
                draft.lines,
            )
            .await?;

        match self.price_and_save(actor, &inserted).await {
            Ok(priced) => {
                log::info!(
                    "quotation_id={} created {} for client {} total={}",
                    priced.quotation.id,
                    priced.quotation.number,
                    priced.quotation.client_id,
                    priced.pricing.breakdown.total_value
                );
                Ok(priced)
            }
            Err(e) => {
                if let Err(cleanup) = self.store.delete_quotation(inserted.id).await {
                    log::error!(
                        "quotation_id={} rollback after failed create also failed: {}",
                        inserted.id,
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }

    /// Replace rows and/or rates of an open quotation and re-price it.
    pub async fn update_quotation(
        &self,
        actor: &Actor,
        id: QuotationId,
        update: QuotationUpdate,
    ) -> ServiceResult<PricedQuotation> {
        let current = self.store.quotation(id).await?;
        if current.status.is_final() {
            return Err(ServiceError::QuotationClosed {
                id,
                status: current.status,
            });
        }
        if let Some(lines) = &update.lines {
            validate_lines(lines)?;
        }
        if let Some(rates) = &update.rates {
            rates.validate().map_err(ValidationError::from)?;
        }

        let previous_lines = match &update.lines {
            Some(_) => Some(self.snapshot_lines(id).await?),
            None => None,
        };

        // The store re-checks the status; an approval may have landed since
        // `current` was read.
        let edited = self
            .store
            .edit_inputs(
                id,
                InputEdit {
                    rates: update.rates.unwrap_or(current.rates),
                    lines: update.lines,
                    updated_by: actor.user_id,
                    updated_at: self.clock.now(),
                },
            )
            .await
            .map_err(|e| match e {
                StoreError::QuotationClosed { status, .. } => {
                    ServiceError::QuotationClosed { id, status }
                }
                other => ServiceError::Store(other),
            })?;

        match self.price_and_save(actor, &edited).await {
            Ok(priced) => {
                log::info!(
                    "quotation_id={} updated by user {} total={}",
                    id,
                    actor.user_id,
                    priced.pricing.breakdown.total_value
                );
                Ok(priced)
            }
            Err(e) => {
                let snapshot = InputSnapshot {
                    rates: current.rates,
                    lines: previous_lines,
                    totals: current.totals,
                    calculated_at: current.calculated_at,
                    updated_by: current.updated_by,
                    updated_at: current.updated_at,
                };
                if let Err(cleanup) = self.store.restore_inputs(id, snapshot).await {
                    log::error!(
                        "quotation_id={} rollback after failed update also failed: {}",
                        id,
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }

    /// Recompute and persist totals from the stored rows and rates.
    ///
    /// Running it twice yields the same totals.
    pub async fn recalculate(&self, actor: &Actor, id: QuotationId) -> ServiceResult<PricedQuotation> {
        let quotation = self.store.quotation(id).await?;
        self.price_and_save(actor, &quotation).await
    }

    /// Price a quotation without persisting anything.
    pub async fn preview(&self, id: QuotationId) -> ServiceResult<PricingOutcome> {
        let quotation = self.store.quotation(id).await?;
        Ok(self.pipeline.price(self.pricing_query(&quotation)).await?)
    }

    pub async fn transition_status(
        &self,
        actor: &Actor,
        id: QuotationId,
        to: QuotationStatus,
        note: Option<String>,
    ) -> ServiceResult<TransitionOutcome> {
        self.transitions.transition_status(actor, id, to, note).await
    }

    pub async fn change_project_state(
        &self,
        actor: &Actor,
        project_id: ProjectId,
        state_id: ProjectStateId,
    ) -> ServiceResult<Option<ProjectStateHistory>> {
        self.project_states
            .change_project_state(actor, project_id, state_id)
            .await
    }

    /// Expire every open quotation whose validity ended before today.
    pub async fn expire_overdue(&self, actor: &Actor) -> ServiceResult<Vec<TransitionOutcome>> {
        let today = self.clock.today();
        let overdue: Vec<Quotation> = self
            .store
            .quotations()
            .await?
            .into_iter()
            .filter(|q| !q.status.is_final() && q.valid_until < today)
            .collect();

        let mut outcomes = Vec::with_capacity(overdue.len());
        for quotation in overdue {
            let note = format!("validity ended {}", quotation.valid_until);
            outcomes.push(
                self.transitions
                    .transition_status(actor, quotation.id, QuotationStatus::Expired, Some(note))
                    .await?,
            );
        }
        if !outcomes.is_empty() {
            log::info!("expired {} overdue quotations", outcomes.len());
        }
        Ok(outcomes)
    }

    async fn snapshot_lines(&self, id: QuotationId) -> ServiceResult<Vec<LineDraft>> {
        let mut lines = self.store.lines(id, LineKind::Product).await?;
        lines.extend(self.store.lines(id, LineKind::Item).await?);
        lines.sort_by_key(|l| l.position);
        Ok(lines.iter().map(LineDraft::from).collect())
    }

    fn pricing_query(&self, quotation: &Quotation) -> PricingQuery {
        PricingQuery {
            request_id: format!("{}@{}", quotation.number, self.clock.now().timestamp_millis()),
            quotation_id: quotation.id,
            rates: quotation.rates,
            rounding: self.config.rounding,
            calculated_at: None,
        }
    }

    /// Price from the stored rows and write back only the derived fields, so
    /// a status change committed meanwhile is kept.
    async fn price_and_save(
        &self,
        actor: &Actor,
        quotation: &Quotation,
    ) -> ServiceResult<PricedQuotation> {
        let pricing = self.pipeline.price(self.pricing_query(quotation)).await?;
        let quotation = self
            .store
            .save_totals(
                quotation.id,
                SavedTotals {
                    totals: pricing.breakdown,
                    calculated_at: pricing.calculated_at,
                    updated_by: actor.user_id,
                    updated_at: pricing.calculated_at,
                },
            )
            .await?;
        Ok(PricedQuotation { quotation, pricing })
    }
}

fn validate_header(
    client_name: &str,
    project_name: &str,
    power_kwp: Decimal,
) -> Result<(), ValidationError> {
    if client_name.trim().is_empty() {
        return Err(ValidationError::EmptyField("client_name"));
    }
    if project_name.trim().is_empty() {
        return Err(ValidationError::EmptyField("project_name"));
    }
    if power_kwp < Decimal::ZERO {
        return Err(ValidationError::NegativePower(power_kwp));
    }
    Ok(())
}

/// Rows are numbered from 1 in error messages.
pub fn validate_lines(lines: &[LineDraft]) -> Result<(), ValidationError> {
    if lines.len() > MAX_LINES {
        return Err(ValidationError::TooManyLines {
            count: lines.len(),
            max: MAX_LINES,
        });
    }
    for (i, line) in lines.iter().enumerate() {
        let n = i + 1;
        if line.quantity <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveQuantity {
                line: n,
                quantity: line.quantity,
            });
        }
        if line.quantity > MAX_LINE_QUANTITY {
            return Err(ValidationError::QuantityTooLarge {
                line: n,
                quantity: line.quantity,
                max: MAX_LINE_QUANTITY,
            });
        }
        if line.unit_price < Decimal::ZERO {
            return Err(ValidationError::NegativeUnitPrice {
                line: n,
                unit_price: line.unit_price,
            });
        }
        if line.unit_price > MAX_UNIT_PRICE {
            return Err(ValidationError::UnitPriceTooLarge {
                line: n,
                unit_price: line.unit_price,
                max: MAX_UNIT_PRICE,
            });
        }
        if line.profit_percentage < Decimal::ZERO || line.profit_percentage > Decimal::ONE {
            return Err(ValidationError::ProfitPercentageOutOfRange {
                line: n,
                value: line.profit_percentage,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(quantity: Decimal, unit_price: Decimal, profit: Decimal) -> LineDraft {
        LineDraft {
            kind: LineKind::Product,
            description: "panel".into(),
            quantity,
            unit_price,
            profit_percentage: profit,
        }
    }

    #[test]
    fn accepts_boundary_values() {
        let lines = vec![
            line(dec!(0.5), dec!(0), dec!(0)),
            line(dec!(1), dec!(100), dec!(1)),
        ];
        assert_eq!(validate_lines(&lines), Ok(()));
    }

    #[test]
    fn rejects_zero_quantity_with_row_number() {
        let lines = vec![line(dec!(1), dec!(1), dec!(0)), line(dec!(0), dec!(1), dec!(0))];
        assert_eq!(
            validate_lines(&lines),
            Err(ValidationError::NonPositiveQuantity {
                line: 2,
                quantity: dec!(0)
            })
        );
    }

    #[test]
    fn rejects_negative_price_and_profit_out_of_range() {
        assert!(matches!(
            validate_lines(&[line(dec!(1), dec!(-1), dec!(0))]),
            Err(ValidationError::NegativeUnitPrice { .. })
        ));
        assert!(matches!(
            validate_lines(&[line(dec!(1), dec!(1), dec!(1.01))]),
            Err(ValidationError::ProfitPercentageOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_rows_too_large_to_price() {
        assert_eq!(
            validate_lines(&[line(dec!(10000000000000000), dec!(1), dec!(0))]),
            Err(ValidationError::QuantityTooLarge {
                line: 1,
                quantity: dec!(10000000000000000),
                max: MAX_LINE_QUANTITY,
            })
        );
        assert!(matches!(
            validate_lines(&[
                line(dec!(1), dec!(1), dec!(0)),
                line(dec!(1), dec!(100000000000000), dec!(0)),
            ]),
            Err(ValidationError::UnitPriceTooLarge { line: 2, .. })
        ));
        assert_eq!(
            validate_lines(&[line(MAX_LINE_QUANTITY, MAX_UNIT_PRICE, dec!(1))]),
            Ok(())
        );
    }

    #[test]
    fn rejects_too_many_rows() {
        let lines = vec![line(dec!(1), dec!(1), dec!(0)); MAX_LINES + 1];
        assert_eq!(
            validate_lines(&lines),
            Err(ValidationError::TooManyLines {
                count: MAX_LINES + 1,
                max: MAX_LINES
            })
        );
    }

    #[test]
    fn header_requires_names() {
        assert_eq!(
            validate_header(" ", "Roof", dec!(10)),
            Err(ValidationError::EmptyField("client_name"))
        );
        assert_eq!(
            validate_header("ACME", "", dec!(10)),
            Err(ValidationError::EmptyField("project_name"))
        );
        assert_eq!(
            validate_header("ACME", "Roof", dec!(-1)),
            Err(ValidationError::NegativePower(dec!(-1)))
        );
        assert_eq!(validate_header("ACME", "Roof", dec!(0)), Ok(()));
    }
}
