use async_trait::async_trait;
use std::sync::Arc;

use solar_pricing::aggregate;

use crate::side_effect::{SideEffect, SideEffectInput};
use crate::types::{LineCandidate, PricingQuery};

/// Writes one audit line per recalculation.
pub struct RecalculationLogSideEffect;

#[async_trait]
impl SideEffect<PricingQuery, LineCandidate> for RecalculationLogSideEffect {
    async fn run(
        &self,
        input: Arc<SideEffectInput<PricingQuery, LineCandidate>>,
    ) -> Result<(), String> {
        let valued = input.candidates.iter().filter_map(|c| c.valuation.as_ref());
        let totals = aggregate(valued);
        if totals.line_count != input.candidates.len() {
            log::warn!(
                "request_id={} quotation_id={} recalculation incomplete: lines={} valued={}",
                input.query.request_id,
                input.query.quotation_id,
                input.candidates.len(),
                totals.line_count
            );
            return Ok(());
        }
        log::info!(
            "request_id={} quotation_id={} recalculated: lines={} valued={} subtotal={}",
            input.query.request_id,
            input.query.quotation_id,
            input.candidates.len(),
            totals.line_count,
            totals.subtotal
        );
        Ok(())
    }
}
