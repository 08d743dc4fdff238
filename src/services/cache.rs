use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::models::{EvaluationOutcome, PatientProfile, Trial, TrialMatch};

/// Pipeline stage that owns a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StageKey {
    Resolve,
    Discover,
    Evaluate(String),
    Final,
}

impl std::fmt::Display for StageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKey::Resolve => f.write_str("resolve"),
            StageKey::Discover => f.write_str("discover"),
            StageKey::Evaluate(trial_id) => write!(f, "evaluate:{}", trial_id),
            StageKey::Final => f.write_str("final"),
        }
    }
}

/// Cache key: (stage, patient)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub stage: StageKey,
    pub patient_id: String,
}

impl CacheKey {
    pub fn resolve(patient_id: &str) -> Self {
        Self::new(StageKey::Resolve, patient_id)
    }

    pub fn discover(patient_id: &str) -> Self {
        Self::new(StageKey::Discover, patient_id)
    }

    pub fn evaluate(patient_id: &str, trial_id: &str) -> Self {
        Self::new(StageKey::Evaluate(trial_id.to_string()), patient_id)
    }

    pub fn final_matches(patient_id: &str) -> Self {
        Self::new(StageKey::Final, patient_id)
    }

    fn new(stage: StageKey, patient_id: &str) -> Self {
        Self {
            stage,
            patient_id: patient_id.to_string(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.stage, self.patient_id)
    }
}

/// Committed result of a stage
#[derive(Debug, Clone)]
pub enum CachedValue {
    Profile(Arc<PatientProfile>),
    Candidates(Arc<Vec<Trial>>),
    Outcome(Arc<EvaluationOutcome>),
    Matches(Arc<Vec<TrialMatch>>),
}

impl CachedValue {
    pub fn variant_name(&self) -> &'static str {
        match self {
            CachedValue::Profile(_) => "profile",
            CachedValue::Candidates(_) => "candidates",
            CachedValue::Outcome(_) => "outcome",
            CachedValue::Matches(_) => "matches",
        }
    }
}

/// Process-lifetime stage result cache
///
/// No capacity bound and no TTL: entries live until a cache-bypass run for the
/// same patient clears them.
#[derive(Clone)]
pub struct CacheStore {
    entries: moka::future::Cache<CacheKey, CachedValue>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl CacheStore {
    pub fn new() -> Self {
        let entries = moka::future::Cache::builder()
            .support_invalidation_closures()
            .build();

        Self {
            entries,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get a committed stage result
    pub async fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        match self.entries.get(key).await {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Cache hit: {}", key);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Cache miss: {}", key);
                None
            }
        }
    }

    /// Commit a stage result, replacing any previous value
    pub async fn set(&self, key: CacheKey, value: CachedValue) {
        tracing::trace!("Cache set: {} ({})", key, value.variant_name());
        self.entries.insert(key, value).await;
    }

    /// Drop every stage result held for a patient
    pub async fn invalidate_patient(&self, patient_id: &str) {
        let target = patient_id.to_string();
        if let Err(e) = self
            .entries
            .invalidate_entries_if(move |key, _| key.patient_id == target)
        {
            tracing::warn!("Failed to register invalidation for {}: {}", patient_id, e);
        }
        self.entries.run_pending_tasks().await;
        tracing::debug!("Invalidated cached stage results for {}", patient_id);
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStats {
            entries: self.entries.entry_count(),
            hit_count: hits,
            miss_count: misses,
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrialStatus;

    fn sample_match(id: &str) -> TrialMatch {
        TrialMatch {
            trial_id: id.to_string(),
            title: "Trial".to_string(),
            status: TrialStatus::Recruiting,
            phase: "3".to_string(),
            condition: "Breast Cancer".to_string(),
            locations: vec![],
            match_rationale: vec![],
            flags: vec![],
            details_url: None,
            contact_info: None,
            rank_score: 1.0,
        }
    }

    #[test]
    fn test_cache_key_builder() {
        assert_eq!(CacheKey::resolve("P1").to_string(), "resolve:P1");
        assert_eq!(CacheKey::discover("P1").to_string(), "discover:P1");
        assert_eq!(CacheKey::evaluate("P1", "NCT001").to_string(), "evaluate:NCT001:P1");
        assert_eq!(CacheKey::final_matches("P1").to_string(), "final:P1");
    }

    #[tokio::test]
    async fn test_cache_set_get() {
        let cache = CacheStore::new();
        let key = CacheKey::final_matches("P1");

        assert!(cache.get(&key).await.is_none());

        cache
            .set(key.clone(), CachedValue::Matches(Arc::new(vec![sample_match("NCT003")])))
            .await;

        match cache.get(&key).await {
            Some(CachedValue::Matches(matches)) => assert_eq!(matches[0].trial_id, "NCT003"),
            other => panic!("unexpected cache value: {:?}", other),
        }

        let stats = cache.stats();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
    }

    #[tokio::test]
    async fn test_invalidate_patient_only_touches_that_patient() {
        let cache = CacheStore::new();
        cache
            .set(CacheKey::final_matches("P1"), CachedValue::Matches(Arc::new(vec![])))
            .await;
        cache
            .set(CacheKey::final_matches("P2"), CachedValue::Matches(Arc::new(vec![])))
            .await;

        cache.invalidate_patient("P1").await;

        assert!(cache.get(&CacheKey::final_matches("P1")).await.is_none());
        assert!(cache.get(&CacheKey::final_matches("P2")).await.is_some());
    }
}
