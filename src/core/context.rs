use std::sync::Arc;

use uuid::Uuid;

use crate::core::retry::{RetryLedger, RetryState};
use crate::error::StageError;
use crate::models::{EvaluationOutcome, PatientProfile, Trial, TrialMatch};
use crate::services::cache::{CacheKey, CacheStore, CachedValue, StageKey};

/// Cache-and-retry context for one pipeline run
///
/// Created by the orchestrator and passed by reference into every stage.
/// Stages only touch the cache and retry ledger through these accessors.
pub struct RunContext {
    run_id: Uuid,
    patient_id: String,
    bypass_cache: bool,
    cache: CacheStore,
    retries: RetryLedger,
}

impl RunContext {
    pub fn new(patient_id: &str, bypass_cache: bool, cache: CacheStore) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            patient_id: patient_id.to_string(),
            bypass_cache,
            cache,
            retries: RetryLedger::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn bypass_cache(&self) -> bool {
        self.bypass_cache
    }

    pub fn retries(&self) -> &RetryLedger {
        &self.retries
    }

    pub fn retry_snapshot(&self) -> Vec<(String, RetryState)> {
        self.retries.snapshot().into_iter().collect()
    }

    fn key(&self, stage: StageKey) -> CacheKey {
        CacheKey {
            stage,
            patient_id: self.patient_id.clone(),
        }
    }

    async fn lookup(&self, stage: StageKey) -> Option<CachedValue> {
        if self.bypass_cache {
            return None;
        }
        self.cache.get(&self.key(stage)).await
    }

    pub async fn cached_profile(&self) -> Result<Option<Arc<PatientProfile>>, StageError> {
        match self.lookup(StageKey::Resolve).await {
            None => Ok(None),
            Some(CachedValue::Profile(profile)) => Ok(Some(profile)),
            Some(other) => Err(shape_mismatch(StageKey::Resolve, &other)),
        }
    }

    pub async fn cached_candidates(&self) -> Result<Option<Arc<Vec<Trial>>>, StageError> {
        match self.lookup(StageKey::Discover).await {
            None => Ok(None),
            Some(CachedValue::Candidates(trials)) => Ok(Some(trials)),
            Some(other) => Err(shape_mismatch(StageKey::Discover, &other)),
        }
    }

    pub async fn cached_outcome(
        &self,
        trial_id: &str,
    ) -> Result<Option<Arc<EvaluationOutcome>>, StageError> {
        let stage = StageKey::Evaluate(trial_id.to_string());
        match self.lookup(stage.clone()).await {
            None => Ok(None),
            Some(CachedValue::Outcome(outcome)) => Ok(Some(outcome)),
            Some(other) => Err(shape_mismatch(stage, &other)),
        }
    }

    pub async fn cached_matches(&self) -> Result<Option<Arc<Vec<TrialMatch>>>, StageError> {
        match self.lookup(StageKey::Final).await {
            None => Ok(None),
            Some(CachedValue::Matches(matches)) => Ok(Some(matches)),
            Some(other) => Err(shape_mismatch(StageKey::Final, &other)),
        }
    }

    pub async fn commit_profile(&self, profile: Arc<PatientProfile>) {
        self.cache
            .set(self.key(StageKey::Resolve), CachedValue::Profile(profile))
            .await;
    }

    pub async fn commit_candidates(&self, trials: Arc<Vec<Trial>>) {
        self.cache
            .set(self.key(StageKey::Discover), CachedValue::Candidates(trials))
            .await;
    }

    pub async fn commit_outcome(&self, outcome: Arc<EvaluationOutcome>) {
        let stage = StageKey::Evaluate(outcome.trial_id.clone());
        self.cache.set(self.key(stage), CachedValue::Outcome(outcome)).await;
    }

    pub async fn commit_matches(&self, matches: Arc<Vec<TrialMatch>>) {
        self.cache
            .set(self.key(StageKey::Final), CachedValue::Matches(matches))
            .await;
    }

    /// Forget everything cached for this run's patient
    pub async fn clear_patient(&self) {
        self.cache.invalidate_patient(&self.patient_id).await;
    }
}

fn shape_mismatch(stage: StageKey, found: &CachedValue) -> StageError {
    StageError::Invariant(format!(
        "cache entry for stage {} holds a {} value",
        stage,
        found.variant_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> PatientProfile {
        PatientProfile {
            patient_id: "P1".to_string(),
            condition: "Lung Cancer".to_string(),
            stage: None,
            age: 60,
            prior_therapies: vec![],
            biomarkers: Default::default(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_commit_then_lookup() {
        let ctx = RunContext::new("P1", false, CacheStore::new());
        assert!(ctx.cached_profile().await.unwrap().is_none());

        ctx.commit_profile(Arc::new(profile())).await;
        let cached = ctx.cached_profile().await.unwrap().unwrap();
        assert_eq!(cached.condition, "Lung Cancer");
    }

    #[tokio::test]
    async fn test_bypass_skips_reads() {
        let cache = CacheStore::new();
        RunContext::new("P1", false, cache.clone())
            .commit_profile(Arc::new(profile()))
            .await;

        let bypassing = RunContext::new("P1", true, cache);
        assert!(bypassing.cached_profile().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_shape_is_invariant_violation() {
        let cache = CacheStore::new();
        cache
            .set(CacheKey::resolve("P1"), CachedValue::Matches(Arc::new(vec![])))
            .await;

        let ctx = RunContext::new("P1", false, cache);
        assert!(matches!(ctx.cached_profile().await, Err(StageError::Invariant(_))));
    }
}
