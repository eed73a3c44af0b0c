use async_trait::async_trait;
use std::sync::Arc;

use crate::source::Source;
use crate::store::QuotationStore;
use crate::types::{LineCandidate, LineKind, PricingQuery};

/// Loads one kind of quotation row from the store.
///
/// The pricing pipeline runs one source per [`LineKind`], so product rows
/// and complementary item rows are fetched concurrently and reported
/// separately in the logs.
pub struct QuotationLineSource {
    store: Arc<dyn QuotationStore>,
    kind: LineKind,
}

impl QuotationLineSource {
    pub fn products(store: Arc<dyn QuotationStore>) -> Self {
        Self {
            store,
            kind: LineKind::Product,
        }
    }

    pub fn items(store: Arc<dyn QuotationStore>) -> Self {
        Self {
            store,
            kind: LineKind::Item,
        }
    }
}

#[async_trait]
impl Source<PricingQuery, LineCandidate> for QuotationLineSource {
    async fn get_candidates(&self, query: &PricingQuery) -> Result<Vec<LineCandidate>, String> {
        let lines = self
            .store
            .lines(query.quotation_id, self.kind)
            .await
            .map_err(|e| e.to_string())?;
        Ok(lines.into_iter().map(LineCandidate::from).collect())
    }

    fn name(&self) -> &str {
        match self.kind {
            LineKind::Product => "ProductLineSource",
            LineKind::Item => "ItemLineSource",
        }
    }
}
