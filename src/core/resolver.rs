use std::sync::Arc;

use crate::core::context::RunContext;
use crate::core::retry::{RetryError, RetryGovernor};
use crate::core::sources::{ProfileSource, ProfileSourceError};
use crate::error::StageError;
use crate::models::PatientProfile;

/// Stage 1: fetch the patient profile
pub struct ProfileResolver {
    source: Arc<dyn ProfileSource>,
    governor: RetryGovernor,
}

impl ProfileResolver {
    pub fn new(source: Arc<dyn ProfileSource>, governor: RetryGovernor) -> Self {
        Self { source, governor }
    }

    /// Resolve the run's patient, reading through the stage cache
    pub async fn resolve(&self, ctx: &RunContext) -> Result<Arc<PatientProfile>, StageError> {
        let patient_id = ctx.patient_id();

        if let Some(profile) = ctx.cached_profile().await? {
            tracing::debug!("Using cached profile for {}", patient_id);
            return Ok(profile);
        }

        let fetched = self
            .governor
            .run("resolve", ctx.retries(), |_| self.source.fetch(patient_id))
            .await;

        let profile = match fetched {
            Ok(profile) => Arc::new(profile),
            Err(RetryError::Fatal(ProfileSourceError::NotFound(message))) => {
                tracing::info!("Patient {} not found: {}", patient_id, message);
                return Err(StageError::NotFound(format!(
                    "Patient with ID '{}' not found",
                    patient_id
                )));
            }
            Err(RetryError::Fatal(err)) => {
                tracing::error!("Profile fetch for {} failed without retry: {}", patient_id, err);
                return Err(StageError::Transient {
                    attempts: 1,
                    message: err.to_string(),
                });
            }
            Err(RetryError::Exhausted { attempts, last_failure }) => {
                tracing::error!(
                    "Failed to fetch profile for {} after {} attempt(s): {}",
                    patient_id,
                    attempts,
                    last_failure
                );
                return Err(StageError::Transient {
                    attempts,
                    message: last_failure,
                });
            }
        };

        if profile.patient_id != patient_id {
            return Err(StageError::Invariant(format!(
                "profile source returned patient {} for {}",
                profile.patient_id, patient_id
            )));
        }

        ctx.commit_profile(Arc::clone(&profile)).await;
        tracing::debug!("Resolved profile for {} ({})", patient_id, profile.condition);

        Ok(profile)
    }
}
