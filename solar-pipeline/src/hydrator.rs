use async_trait::async_trait;

use crate::util;

/// Hydrators enrich candidates with computed or fetched fields.
///
/// A hydrator returns exactly one value per input candidate, in input order.
/// The pipeline then merges each value back into its candidate through
/// [`Hydrator::update`], so a hydrator only ever touches the fields it owns.
#[async_trait]
pub trait Hydrator<Q, C>: Send + Sync
where
    Q: Clone + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    /// Decide if this hydrator should run for the given query.
    fn enable(&self, _query: &Q) -> bool {
        true
    }

    /// Compute the hydrated fields for every candidate.
    async fn hydrate(&self, query: &Q, candidates: &[C]) -> Result<Vec<C>, String>;

    /// Copy this hydrator's fields from `hydrated` into `candidate`.
    fn update(&self, candidate: &mut C, hydrated: C);

    /// Returns a stable name for logging.
    fn name(&self) -> &str {
        util::short_type_name(std::any::type_name::<Self>())
    }
}
