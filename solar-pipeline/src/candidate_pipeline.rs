//! Staged candidate pipeline.
//!
//! A pipeline is a fixed set of stage components run in this order:
//!
//! 1. query hydrators (concurrently), merged into the query
//! 2. sources (concurrently), outputs concatenated in source order
//! 3. hydrators (concurrently), each merged into the candidates in turn
//! 4. side effects (concurrently), awaited before `execute` returns, and
//!    skipped when an earlier stage failed
//!
//! A failing component never aborts the run. It is logged with the request
//! id, skipped, and reported in [`PipelineResult::errors`] so the caller can
//! decide whether a partial result is acceptable.

use async_trait::async_trait;
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;

use crate::hydrator::Hydrator;
use crate::query_hydrator::QueryHydrator;
use crate::side_effect::{SideEffect, SideEffectInput};
use crate::source::Source;

/// Queries carry a request id so every log line of a run can be correlated.
pub trait HasRequestId {
    fn request_id(&self) -> &str;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    QueryHydrator,
    Source,
    Hydrator,
    SideEffect,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::QueryHydrator => "query_hydrator",
            PipelineStage::Source => "source",
            PipelineStage::Hydrator => "hydrator",
            PipelineStage::SideEffect => "side_effect",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A component that failed during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageError {
    pub stage: PipelineStage,
    pub component: String,
    pub message: String,
}

pub struct PipelineResult<Q, C> {
    /// The query after hydration.
    pub query: Arc<Q>,
    /// Candidates as returned by the sources.
    pub retrieved_candidates: Vec<C>,
    /// Candidates after every hydrator has been merged in.
    pub candidates: Vec<C>,
    pub errors: Vec<StageError>,
}

impl<Q, C> PipelineResult<Q, C> {
    /// Errors from stages that feed the result. Side effect failures are
    /// excluded because they cannot change it.
    pub fn blocking_errors(&self) -> impl Iterator<Item = &StageError> {
        self.errors
            .iter()
            .filter(|e| e.stage != PipelineStage::SideEffect)
    }
}

#[async_trait]
pub trait CandidatePipeline<Q, C>: Send + Sync
where
    Q: HasRequestId + Clone + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    fn query_hydrators(&self) -> &[Box<dyn QueryHydrator<Q>>];

    fn sources(&self) -> &[Box<dyn Source<Q, C>>];

    fn hydrators(&self) -> &[Box<dyn Hydrator<Q, C>>];

    fn side_effects(&self) -> Arc<Vec<Box<dyn SideEffect<Q, C>>>>;

    /// Run every stage and collect the result.
    async fn execute(&self, query: Q) -> PipelineResult<Q, C> {
        let mut errors = Vec::new();

        let query = self.hydrate_query(query, &mut errors).await;
        let retrieved_candidates = self.fetch_candidates(&query, &mut errors).await;
        let candidates = self
            .hydrate(&query, retrieved_candidates.clone(), &mut errors)
            .await;

        let query = Arc::new(query);
        if errors.is_empty() {
            let input = Arc::new(SideEffectInput {
                query: Arc::clone(&query),
                candidates: candidates.clone(),
            });
            self.run_side_effects(input, &mut errors).await;
        } else {
            log::warn!(
                "request_id={} skipping side effects after {} stage failures",
                query.request_id(),
                errors.len()
            );
        }

        log::debug!(
            "request_id={} pipeline finished: retrieved={} hydrated={} errors={}",
            query.request_id(),
            retrieved_candidates.len(),
            candidates.len(),
            errors.len()
        );

        PipelineResult {
            query,
            retrieved_candidates,
            candidates,
            errors,
        }
    }

    async fn hydrate_query(&self, query: Q, errors: &mut Vec<StageError>) -> Q {
        let hydrators: Vec<&Box<dyn QueryHydrator<Q>>> = self
            .query_hydrators()
            .iter()
            .filter(|h| h.enable(&query))
            .collect();
        let results = join_all(hydrators.iter().map(|h| h.hydrate(&query))).await;

        let mut hydrated_query = query.clone();
        for (hydrator, result) in hydrators.iter().zip(results) {
            match result {
                Ok(hydrated) => hydrator.update(&mut hydrated_query, hydrated),
                Err(message) => record_failure(
                    errors,
                    query.request_id(),
                    PipelineStage::QueryHydrator,
                    hydrator.name(),
                    message,
                ),
            }
        }
        hydrated_query
    }

    async fn fetch_candidates(&self, query: &Q, errors: &mut Vec<StageError>) -> Vec<C> {
        let sources: Vec<&Box<dyn Source<Q, C>>> =
            self.sources().iter().filter(|s| s.enable(query)).collect();
        let results = join_all(sources.iter().map(|s| s.get_candidates(query))).await;

        let mut collected = Vec::new();
        for (source, result) in sources.iter().zip(results) {
            match result {
                Ok(mut candidates) => {
                    log::debug!(
                        "request_id={} source={} fetched {} candidates",
                        query.request_id(),
                        source.name(),
                        candidates.len()
                    );
                    collected.append(&mut candidates);
                }
                Err(message) => record_failure(
                    errors,
                    query.request_id(),
                    PipelineStage::Source,
                    source.name(),
                    message,
                ),
            }
        }
        collected
    }

    async fn hydrate(
        &self,
        query: &Q,
        mut candidates: Vec<C>,
        errors: &mut Vec<StageError>,
    ) -> Vec<C> {
        let hydrators: Vec<&Box<dyn Hydrator<Q, C>>> =
            self.hydrators().iter().filter(|h| h.enable(query)).collect();
        let results = join_all(hydrators.iter().map(|h| h.hydrate(query, &candidates))).await;

        for (hydrator, result) in hydrators.iter().zip(results) {
            match result {
                Ok(hydrated) if hydrated.len() == candidates.len() => {
                    for (candidate, value) in candidates.iter_mut().zip(hydrated) {
                        hydrator.update(candidate, value);
                    }
                }
                Ok(hydrated) => record_failure(
                    errors,
                    query.request_id(),
                    PipelineStage::Hydrator,
                    hydrator.name(),
                    format!(
                        "returned {} values for {} candidates",
                        hydrated.len(),
                        candidates.len()
                    ),
                ),
                Err(message) => record_failure(
                    errors,
                    query.request_id(),
                    PipelineStage::Hydrator,
                    hydrator.name(),
                    message,
                ),
            }
        }
        candidates
    }

    async fn run_side_effects(
        &self,
        input: Arc<SideEffectInput<Q, C>>,
        errors: &mut Vec<StageError>,
    ) {
        let side_effects = self.side_effects();
        let enabled: Vec<&Box<dyn SideEffect<Q, C>>> = side_effects
            .iter()
            .filter(|s| s.enable(&input.query))
            .collect();
        let results = join_all(enabled.iter().map(|s| s.run(Arc::clone(&input)))).await;

        for (side_effect, result) in enabled.iter().zip(results) {
            if let Err(message) = result {
                record_failure(
                    errors,
                    input.query.request_id(),
                    PipelineStage::SideEffect,
                    side_effect.name(),
                    message,
                );
            }
        }
    }
}

fn record_failure(
    errors: &mut Vec<StageError>,
    request_id: &str,
    stage: PipelineStage,
    component: &str,
    message: String,
) {
    log::error!(
        "request_id={} stage={} component={} failed: {}",
        request_id,
        stage,
        component,
        message
    );
    errors.push(StageError {
        stage,
        component: component.to_string(),
        message,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct TestQuery {
        request_id: String,
        tag: Option<String>,
    }

    impl HasRequestId for TestQuery {
        fn request_id(&self) -> &str {
            &self.request_id
        }
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Num {
        value: i64,
        doubled: Option<i64>,
    }

    struct TagHydrator;

    #[async_trait]
    impl QueryHydrator<TestQuery> for TagHydrator {
        async fn hydrate(&self, query: &TestQuery) -> Result<TestQuery, String> {
            Ok(TestQuery {
                tag: Some("tagged".into()),
                ..query.clone()
            })
        }

        fn update(&self, query: &mut TestQuery, hydrated: TestQuery) {
            query.tag = hydrated.tag;
        }
    }

    struct RangeSource(i64, i64);

    #[async_trait]
    impl Source<TestQuery, Num> for RangeSource {
        async fn get_candidates(&self, _query: &TestQuery) -> Result<Vec<Num>, String> {
            Ok((self.0..self.1)
                .map(|value| Num {
                    value,
                    doubled: None,
                })
                .collect())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl Source<TestQuery, Num> for BrokenSource {
        async fn get_candidates(&self, _query: &TestQuery) -> Result<Vec<Num>, String> {
            Err("connection refused".into())
        }
    }

    struct DoublingHydrator;

    #[async_trait]
    impl Hydrator<TestQuery, Num> for DoublingHydrator {
        async fn hydrate(&self, _query: &TestQuery, candidates: &[Num]) -> Result<Vec<Num>, String> {
            Ok(candidates
                .iter()
                .map(|c| Num {
                    doubled: Some(c.value * 2),
                    ..Num::default()
                })
                .collect())
        }

        fn update(&self, candidate: &mut Num, hydrated: Num) {
            candidate.doubled = hydrated.doubled;
        }
    }

    struct ShortHydrator;

    #[async_trait]
    impl Hydrator<TestQuery, Num> for ShortHydrator {
        async fn hydrate(&self, _query: &TestQuery, _candidates: &[Num]) -> Result<Vec<Num>, String> {
            Ok(vec![Num::default()])
        }

        fn update(&self, candidate: &mut Num, hydrated: Num) {
            candidate.value = hydrated.value;
        }
    }

    struct FailingSideEffect;

    #[async_trait]
    impl SideEffect<TestQuery, Num> for FailingSideEffect {
        async fn run(&self, _input: Arc<SideEffectInput<TestQuery, Num>>) -> Result<(), String> {
            Err("audit sink unavailable".into())
        }
    }

    #[derive(Default)]
    struct CountingSideEffect(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl SideEffect<TestQuery, Num> for Arc<CountingSideEffect> {
        async fn run(&self, _input: Arc<SideEffectInput<TestQuery, Num>>) -> Result<(), String> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    struct TestPipeline {
        query_hydrators: Vec<Box<dyn QueryHydrator<TestQuery>>>,
        sources: Vec<Box<dyn Source<TestQuery, Num>>>,
        hydrators: Vec<Box<dyn Hydrator<TestQuery, Num>>>,
        side_effects: Arc<Vec<Box<dyn SideEffect<TestQuery, Num>>>>,
    }

    #[async_trait]
    impl CandidatePipeline<TestQuery, Num> for TestPipeline {
        fn query_hydrators(&self) -> &[Box<dyn QueryHydrator<TestQuery>>] {
            &self.query_hydrators
        }

        fn sources(&self) -> &[Box<dyn Source<TestQuery, Num>>] {
            &self.sources
        }

        fn hydrators(&self) -> &[Box<dyn Hydrator<TestQuery, Num>>] {
            &self.hydrators
        }

        fn side_effects(&self) -> Arc<Vec<Box<dyn SideEffect<TestQuery, Num>>>> {
            Arc::clone(&self.side_effects)
        }
    }

    fn query() -> TestQuery {
        TestQuery {
            request_id: "req-1".into(),
            tag: None,
        }
    }

    #[tokio::test]
    async fn runs_every_stage_in_order() {
        let pipeline = TestPipeline {
            query_hydrators: vec![Box::new(TagHydrator)],
            sources: vec![Box::new(RangeSource(0, 2)), Box::new(RangeSource(10, 12))],
            hydrators: vec![Box::new(DoublingHydrator)],
            side_effects: Arc::new(Vec::new()),
        };
        let result = pipeline.execute(query()).await;

        assert_eq!(result.query.tag.as_deref(), Some("tagged"));
        let values: Vec<i64> = result.candidates.iter().map(|c| c.value).collect();
        assert_eq!(values, vec![0, 1, 10, 11]);
        assert!(result.candidates.iter().all(|c| c.doubled == Some(c.value * 2)));
        assert!(result.retrieved_candidates.iter().all(|c| c.doubled.is_none()));
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn failing_source_is_reported_not_fatal() {
        let pipeline = TestPipeline {
            query_hydrators: Vec::new(),
            sources: vec![Box::new(BrokenSource), Box::new(RangeSource(0, 3))],
            hydrators: Vec::new(),
            side_effects: Arc::new(Vec::new()),
        };
        let result = pipeline.execute(query()).await;

        assert_eq!(result.candidates.len(), 3);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].stage, PipelineStage::Source);
        assert_eq!(result.errors[0].component, "BrokenSource");
        assert_eq!(result.blocking_errors().count(), 1);
    }

    #[tokio::test]
    async fn mismatched_hydrator_output_is_discarded() {
        let pipeline = TestPipeline {
            query_hydrators: Vec::new(),
            sources: vec![Box::new(RangeSource(5, 8))],
            hydrators: vec![Box::new(ShortHydrator)],
            side_effects: Arc::new(Vec::new()),
        };
        let result = pipeline.execute(query()).await;

        let values: Vec<i64> = result.candidates.iter().map(|c| c.value).collect();
        assert_eq!(values, vec![5, 6, 7]);
        assert_eq!(result.errors[0].stage, PipelineStage::Hydrator);
    }

    #[tokio::test]
    async fn side_effect_failure_does_not_block() {
        let pipeline = TestPipeline {
            query_hydrators: Vec::new(),
            sources: vec![Box::new(RangeSource(0, 1))],
            hydrators: Vec::new(),
            side_effects: Arc::new(vec![Box::new(FailingSideEffect)]),
        };
        let result = pipeline.execute(query()).await;

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].stage, PipelineStage::SideEffect);
        assert_eq!(result.blocking_errors().count(), 0);
    }

    #[tokio::test]
    async fn side_effects_skipped_after_stage_failure() {
        let counter = Arc::new(CountingSideEffect::default());
        let pipeline = TestPipeline {
            query_hydrators: Vec::new(),
            sources: vec![Box::new(BrokenSource), Box::new(RangeSource(0, 3))],
            hydrators: Vec::new(),
            side_effects: Arc::new(vec![Box::new(Arc::clone(&counter))]),
        };
        let result = pipeline.execute(query()).await;
        assert_eq!(result.errors.len(), 1);
        assert_eq!(counter.0.load(std::sync::atomic::Ordering::SeqCst), 0);

        let pipeline = TestPipeline {
            query_hydrators: Vec::new(),
            sources: vec![Box::new(RangeSource(0, 3))],
            hydrators: Vec::new(),
            side_effects: Arc::new(vec![Box::new(Arc::clone(&counter))]),
        };
        pipeline.execute(query()).await;
        assert_eq!(counter.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
