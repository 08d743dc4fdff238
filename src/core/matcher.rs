use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use crate::core::aggregate::{MatchOrdering, ResultAggregator};
use crate::core::context::RunContext;
use crate::core::discovery::CandidateDiscoverer;
use crate::core::evaluator::CandidateEvaluator;
use crate::core::fanout::FanOutCoordinator;
use crate::core::resolver::ProfileResolver;
use crate::core::retry::{RetryGovernor, RetryPolicy, RetryState, DEFAULT_MAX_ATTEMPTS};
use crate::core::sources::{CatalogSource, ProfileSource, ReasoningOracle};
use crate::error::{ErrorKind, PipelineError};
use crate::models::{EvaluationOutcome, TrialMatch};
use crate::services::cache::CacheStore;

/// Tunables for the matching pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOptions {
    pub retry: RetryPolicy,
    /// Upper bound on concurrent oracle evaluations; `None` is unbounded
    pub max_in_flight: Option<usize>,
    pub ordering: MatchOrdering,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                call_timeout: Some(Duration::from_secs(30)),
                backoff: Duration::ZERO,
            },
            max_in_flight: None,
            ordering: MatchOrdering::Discovery,
        }
    }
}

/// Orchestrator states for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Resolving,
    Discovering,
    Evaluating,
    Aggregating,
    Done,
    Failed(ErrorKind),
}

/// Everything observable about a completed run
#[derive(Debug, Clone)]
pub struct MatchRun {
    pub run_id: Uuid,
    pub matches: Arc<Vec<TrialMatch>>,
    /// Per-candidate outcomes, in discovery order; empty when served from cache
    pub outcomes: Vec<EvaluationOutcome>,
    pub from_cache: bool,
    pub retries: Vec<(String, RetryState)>,
    /// States the orchestrator passed through, starting at `Start`
    pub states: Vec<PipelineState>,
}

impl MatchRun {
    pub fn degraded(&self) -> impl Iterator<Item = &EvaluationOutcome> {
        self.outcomes.iter().filter(|o| o.is_degraded())
    }
}

/// Pipeline orchestrator: resolve, discover, evaluate, aggregate
///
/// # Pipeline Stages
/// 1. Profile resolution
/// 2. Candidate discovery (condition + recruiting status)
/// 3. Concurrent oracle evaluation of every candidate
/// 4. Aggregation of accepted matches
pub struct TrialMatcher {
    resolver: ProfileResolver,
    discoverer: CandidateDiscoverer,
    fanout: FanOutCoordinator,
    aggregator: ResultAggregator,
    cache: CacheStore,
}

impl TrialMatcher {
    pub fn new(
        profiles: Arc<dyn ProfileSource>,
        catalog: Arc<dyn CatalogSource>,
        oracle: Arc<dyn ReasoningOracle>,
        options: PipelineOptions,
    ) -> Self {
        let governor = RetryGovernor::new(options.retry);
        let evaluator = Arc::new(CandidateEvaluator::new(oracle, governor));

        Self {
            resolver: ProfileResolver::new(profiles, governor),
            discoverer: CandidateDiscoverer::new(catalog, governor),
            fanout: FanOutCoordinator::new(evaluator, options.max_in_flight),
            aggregator: ResultAggregator::new(options.ordering),
            cache: CacheStore::new(),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Find matching trials for a patient
    ///
    /// Returns the ordered match list (possibly empty) or a single terminal error.
    pub async fn run_matching(
        &self,
        patient_id: &str,
        bypass_cache: bool,
    ) -> Result<Vec<TrialMatch>, PipelineError> {
        self.run_matching_detailed(patient_id, bypass_cache)
            .await
            .map(|run| Vec::clone(&run.matches))
    }

    /// Same as [`run_matching`](Self::run_matching) but keeps per-candidate diagnostics
    pub async fn run_matching_detailed(
        &self,
        patient_id: &str,
        bypass_cache: bool,
    ) -> Result<MatchRun, PipelineError> {
        let ctx = RunContext::new(patient_id, bypass_cache, self.cache.clone());
        let span = tracing::info_span!("match_run", run_id = %ctx.run_id(), patient_id = %patient_id);

        async {
            tracing::info!("Starting trial matching (bypass_cache: {})", bypass_cache);

            let result = self.execute(&ctx).await;

            match &result {
                Ok(run) => tracing::info!(
                    "Returning {} matches ({} degraded candidates, cached: {})",
                    run.matches.len(),
                    run.degraded().count(),
                    run.from_cache
                ),
                Err(err) if err.kind == ErrorKind::InternalInvariantViolation => tracing::error!(
                    "Invariant violation during trial matching: {} (retries: {:?})",
                    err.message,
                    ctx.retry_snapshot()
                ),
                Err(err) if err.kind.is_client_error() => {
                    tracing::info!("Trial matching stopped: {}", err)
                }
                Err(err) => tracing::error!("Trial matching failed: {}", err),
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, ctx: &RunContext) -> Result<MatchRun, PipelineError> {
        let mut state = vec![PipelineState::Start];

        if ctx.bypass_cache() {
            ctx.clear_patient().await;
        } else if let Some(matches) = ctx
            .cached_matches()
            .await
            .map_err(|e| fail(&mut state, e.into_pipeline_error(ErrorKind::InternalInvariantViolation)))?
        {
            transition(&mut state, PipelineState::Done);
            return Ok(self.finish(ctx, matches, Vec::new(), true, state));
        }

        transition(&mut state, PipelineState::Resolving);
        let profile = self
            .resolver
            .resolve(ctx)
            .await
            .map_err(|e| fail(&mut state, e.into_pipeline_error(ErrorKind::ProfileFetchFailed)))?;

        transition(&mut state, PipelineState::Discovering);
        let candidates = self
            .discoverer
            .discover(ctx, &profile)
            .await
            .map_err(|e| fail(&mut state, e.into_pipeline_error(ErrorKind::DiscoveryFailed)))?;

        if candidates.is_empty() {
            tracing::info!("No recruiting trials found for condition '{}'", profile.condition);
            let matches = Arc::new(Vec::new());
            ctx.commit_matches(Arc::clone(&matches)).await;
            transition(&mut state, PipelineState::Done);
            return Ok(self.finish(ctx, matches, Vec::new(), false, state));
        }

        transition(&mut state, PipelineState::Evaluating);
        let outcomes = self
            .fanout
            .evaluate_all(ctx, &profile, &candidates)
            .await
            .map_err(|e| fail(&mut state, e.into_pipeline_error(ErrorKind::InternalInvariantViolation)))?;

        transition(&mut state, PipelineState::Aggregating);
        let matches = self
            .aggregator
            .aggregate(ctx, &outcomes)
            .await
            .map_err(|e| fail(&mut state, e.into_pipeline_error(ErrorKind::InternalInvariantViolation)))?;

        transition(&mut state, PipelineState::Done);
        Ok(self.finish(ctx, matches, outcomes, false, state))
    }

    fn finish(
        &self,
        ctx: &RunContext,
        matches: Arc<Vec<TrialMatch>>,
        outcomes: Vec<EvaluationOutcome>,
        from_cache: bool,
        states: Vec<PipelineState>,
    ) -> MatchRun {
        MatchRun {
            run_id: ctx.run_id(),
            matches,
            outcomes,
            from_cache,
            retries: ctx.retry_snapshot(),
            states,
        }
    }
}

fn transition(states: &mut Vec<PipelineState>, next: PipelineState) {
    tracing::debug!("Pipeline state {:?} -> {:?}", states.last(), next);
    states.push(next);
}

fn fail(state: &mut Vec<PipelineState>, err: PipelineError) -> PipelineError {
    transition(state, PipelineState::Failed(err.kind));
    err
}
