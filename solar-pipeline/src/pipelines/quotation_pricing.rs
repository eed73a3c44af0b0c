use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use solar_pricing::{aggregate, apply_cascade_with, Aggregate, CascadeBreakdown};

use crate::candidate_pipeline::{CandidatePipeline, PipelineResult};
use crate::clock::Clock;
use crate::components::clock_query_hydrator::ClockQueryHydrator;
use crate::components::line_valuation_hydrator::LineValuationHydrator;
use crate::components::quotation_line_source::QuotationLineSource;
use crate::components::recalculation_log_side_effect::RecalculationLogSideEffect;
use crate::error::{PricingError, PricingResult};
use crate::hydrator::Hydrator;
use crate::query_hydrator::QueryHydrator;
use crate::side_effect::SideEffect;
use crate::source::Source;
use crate::store::QuotationStore;
use crate::types::{LineCandidate, PricingQuery};

/// Totals of one priced quotation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PricingOutcome {
    /// Valued rows, product rows first, each kind in position order.
    pub lines: Vec<LineCandidate>,
    pub aggregate: Aggregate,
    pub breakdown: CascadeBreakdown,
    pub calculated_at: DateTime<Utc>,
}

/// Prices a quotation from its persisted rows.
///
/// Pipeline flow:
/// 1. ClockQueryHydrator stamps the request
/// 2. ProductLineSource and ItemLineSource load both kinds of row
/// 3. LineValuationHydrator values every row
/// 4. RecalculationLogSideEffect records the run
///
/// [`QuotationPricingPipeline::price`] then aggregates the valued rows and
/// runs the markup cascade over the subtotal.
pub struct QuotationPricingPipeline {
    query_hydrators: Vec<Box<dyn QueryHydrator<PricingQuery>>>,
    sources: Vec<Box<dyn Source<PricingQuery, LineCandidate>>>,
    hydrators: Vec<Box<dyn Hydrator<PricingQuery, LineCandidate>>>,
    side_effects: Arc<Vec<Box<dyn SideEffect<PricingQuery, LineCandidate>>>>,
}

impl QuotationPricingPipeline {
    pub fn new(store: Arc<dyn QuotationStore>, clock: Arc<dyn Clock>) -> Self {
        let query_hydrators: Vec<Box<dyn QueryHydrator<PricingQuery>>> =
            vec![Box::new(ClockQueryHydrator::new(clock))];

        let sources: Vec<Box<dyn Source<PricingQuery, LineCandidate>>> = vec![
            Box::new(QuotationLineSource::products(Arc::clone(&store))),
            Box::new(QuotationLineSource::items(store)),
        ];

        let hydrators: Vec<Box<dyn Hydrator<PricingQuery, LineCandidate>>> =
            vec![Box::new(LineValuationHydrator)];

        let side_effects: Arc<Vec<Box<dyn SideEffect<PricingQuery, LineCandidate>>>> =
            Arc::new(vec![Box::new(RecalculationLogSideEffect)]);

        Self {
            query_hydrators,
            sources,
            hydrators,
            side_effects,
        }
    }

    /// Run the pipeline and compute the quotation's totals.
    ///
    /// Any failed source or hydrator fails the whole calculation: a subtotal
    /// over a partial set of rows would be wrong, not approximate.
    pub async fn price(&self, query: PricingQuery) -> PricingResult<PricingOutcome> {
        let result = self.execute(query).await;
        Self::outcome(result)
    }

    fn outcome(
        result: PipelineResult<PricingQuery, LineCandidate>,
    ) -> PricingResult<PricingOutcome> {
        if let Some(error) = result.blocking_errors().next() {
            return Err(PricingError::Stage {
                stage: error.stage.as_str(),
                component: error.component.clone(),
                message: error.message.clone(),
            });
        }

        let calculated_at = result
            .query
            .calculated_at
            .ok_or(PricingError::NotTimestamped)?;

        let mut valuations = Vec::with_capacity(result.candidates.len());
        for candidate in &result.candidates {
            let valuation = candidate.valuation.ok_or(PricingError::Unvalued {
                line_id: candidate.line.id.0,
            })?;
            valuations.push(valuation);
        }

        let aggregate = aggregate(&valuations);
        let breakdown =
            apply_cascade_with(aggregate.subtotal, &result.query.rates, result.query.rounding);

        Ok(PricingOutcome {
            lines: result.candidates,
            aggregate,
            breakdown,
            calculated_at,
        })
    }
}

#[async_trait]
impl CandidatePipeline<PricingQuery, LineCandidate> for QuotationPricingPipeline {
    fn query_hydrators(&self) -> &[Box<dyn QueryHydrator<PricingQuery>>] {
        &self.query_hydrators
    }

    fn sources(&self) -> &[Box<dyn Source<PricingQuery, LineCandidate>>] {
        &self.sources
    }

    fn hydrators(&self) -> &[Box<dyn Hydrator<PricingQuery, LineCandidate>>] {
        &self.hydrators
    }

    fn side_effects(&self) -> Arc<Vec<Box<dyn SideEffect<PricingQuery, LineCandidate>>>> {
        Arc::clone(&self.side_effects)
    }
}
