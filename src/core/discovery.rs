use std::sync::Arc;

use crate::core::context::RunContext;
use crate::core::filters::filter_candidates;
use crate::core::retry::{RetryError, RetryGovernor};
use crate::core::sources::CatalogSource;
use crate::error::StageError;
use crate::models::{PatientProfile, Trial};

/// Stage 2: find recruiting trials relevant to the patient's condition
pub struct CandidateDiscoverer {
    catalog: Arc<dyn CatalogSource>,
    governor: RetryGovernor,
}

impl CandidateDiscoverer {
    pub fn new(catalog: Arc<dyn CatalogSource>, governor: RetryGovernor) -> Self {
        Self { catalog, governor }
    }

    /// Discover candidates in catalog order. An empty list is a valid result.
    pub async fn discover(
        &self,
        ctx: &RunContext,
        profile: &PatientProfile,
    ) -> Result<Arc<Vec<Trial>>, StageError> {
        let condition = profile.condition.trim();
        if condition.is_empty() {
            return Err(StageError::DataQuality(format!(
                "Patient profile {} is missing a condition",
                profile.patient_id
            )));
        }

        if let Some(trials) = ctx.cached_candidates().await? {
            tracing::debug!("Using {} cached candidates for {}", trials.len(), ctx.patient_id());
            return Ok(trials);
        }

        let queried = self
            .governor
            .run("discover", ctx.retries(), |_| self.catalog.query(condition))
            .await;

        let catalog = match queried {
            Ok(trials) => trials,
            Err(RetryError::Fatal(err)) => {
                return Err(StageError::Transient {
                    attempts: 1,
                    message: err.to_string(),
                });
            }
            Err(RetryError::Exhausted { attempts, last_failure }) => {
                tracing::error!(
                    "Failed to query catalog for '{}' after {} attempt(s): {}",
                    condition,
                    attempts,
                    last_failure
                );
                return Err(StageError::Transient {
                    attempts,
                    message: last_failure,
                });
            }
        };

        let total = catalog.len();
        let candidates = Arc::new(filter_candidates(catalog, condition));

        tracing::debug!(
            "Discovered {} candidates for condition '{}' (from {} catalog entries)",
            candidates.len(),
            condition,
            total
        );

        ctx.commit_candidates(Arc::clone(&candidates)).await;

        Ok(candidates)
    }
}
