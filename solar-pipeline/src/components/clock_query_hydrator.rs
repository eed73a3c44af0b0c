use async_trait::async_trait;
use std::sync::Arc;

use crate::clock::Clock;
use crate::query_hydrator::QueryHydrator;
use crate::types::PricingQuery;

/// Stamps the pricing request with the injected clock's "now".
///
/// Only runs when the caller left `calculated_at` open, so a caller that
/// replays a calculation can pin the timestamp.
pub struct ClockQueryHydrator {
    clock: Arc<dyn Clock>,
}

impl ClockQueryHydrator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl QueryHydrator<PricingQuery> for ClockQueryHydrator {
    fn enable(&self, query: &PricingQuery) -> bool {
        query.calculated_at.is_none()
    }

    async fn hydrate(&self, query: &PricingQuery) -> Result<PricingQuery, String> {
        Ok(PricingQuery {
            calculated_at: Some(self.clock.now()),
            ..query.clone()
        })
    }

    fn update(&self, query: &mut PricingQuery, hydrated: PricingQuery) {
        query.calculated_at = hydrated.calculated_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::types::QuotationId;
    use chrono::{TimeZone, Utc};
    use solar_pricing::{CascadeRates, RoundingPolicy};

    fn query() -> PricingQuery {
        PricingQuery {
            request_id: "req-1".into(),
            quotation_id: QuotationId(1),
            rates: CascadeRates::default(),
            rounding: RoundingPolicy::PerStep,
            calculated_at: None,
        }
    }

    #[tokio::test]
    async fn fills_timestamp_from_clock() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let hydrator = ClockQueryHydrator::new(Arc::new(FixedClock::new(now)));
        let q = query();
        assert!(hydrator.enable(&q));

        let hydrated = hydrator.hydrate(&q).await.unwrap();
        let mut merged = q.clone();
        hydrator.update(&mut merged, hydrated);
        assert_eq!(merged.calculated_at, Some(now));
    }

    #[test]
    fn pinned_timestamp_disables_hydrator() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let hydrator = ClockQueryHydrator::new(Arc::new(FixedClock::new(now)));
        let q = PricingQuery {
            calculated_at: Some(now),
            ..query()
        };
        assert!(!hydrator.enable(&q));
    }
}
