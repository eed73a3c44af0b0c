use async_trait::async_trait;

use crate::util;

/// Query hydrators run concurrently before any rows are fetched and fill in
/// query fields the caller left open (for example the pricing timestamp).
#[async_trait]
pub trait QueryHydrator<Q>: Send + Sync
where
    Q: Clone + Send + Sync + 'static,
{
    /// Decide if this query hydrator should run for the given query.
    fn enable(&self, _query: &Q) -> bool {
        true
    }

    /// Produce a copy of the query with this hydrator's fields populated.
    async fn hydrate(&self, query: &Q) -> Result<Q, String>;

    /// Copy only the fields this hydrator owns from `hydrated` into `query`.
    fn update(&self, query: &mut Q, hydrated: Q);

    /// Returns a stable name for logging.
    fn name(&self) -> &str {
        util::short_type_name(std::any::type_name::<Self>())
    }
}
