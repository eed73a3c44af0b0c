use async_trait::async_trait;

use solar_pricing::value_line;

use crate::hydrator::Hydrator;
use crate::types::{LineCandidate, PricingQuery};

/// Values every row: cost, profit and row total, unrounded.
pub struct LineValuationHydrator;

#[async_trait]
impl Hydrator<PricingQuery, LineCandidate> for LineValuationHydrator {
    async fn hydrate(
        &self,
        _query: &PricingQuery,
        candidates: &[LineCandidate],
    ) -> Result<Vec<LineCandidate>, String> {
        Ok(candidates
            .iter()
            .map(|c| LineCandidate {
                valuation: Some(value_line(&c.line.input())),
                ..LineCandidate::default()
            })
            .collect())
    }

    fn update(&self, candidate: &mut LineCandidate, hydrated: LineCandidate) {
        candidate.valuation = hydrated.valuation;
    }
}
