use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;

use crate::core::context::RunContext;
use crate::core::evaluator::CandidateEvaluator;
use crate::error::{ErrorKind, StageError};
use crate::models::{EvaluationOutcome, PatientProfile, Trial};

/// Stage 3 driver: evaluates every candidate concurrently
///
/// Evaluations run as futures on the caller's task, so dropping the run
/// cancels whatever is still in flight.
pub struct FanOutCoordinator {
    evaluator: Arc<CandidateEvaluator>,
    max_in_flight: Option<usize>,
}

impl FanOutCoordinator {
    /// `max_in_flight = None` evaluates all candidates at once
    pub fn new(evaluator: Arc<CandidateEvaluator>, max_in_flight: Option<usize>) -> Self {
        Self {
            evaluator,
            max_in_flight,
        }
    }

    /// Evaluate all candidates.
    ///
    /// Output has the same length and order as `candidates`, whatever the
    /// completion order. Per-candidate failures become degraded outcomes; only
    /// an invariant violation aborts the batch.
    pub async fn evaluate_all(
        &self,
        ctx: &RunContext,
        profile: &PatientProfile,
        candidates: &[Trial],
    ) -> Result<Vec<EvaluationOutcome>, StageError> {
        let evaluations = candidates
            .iter()
            .map(|trial| self.evaluate_one(ctx, profile, trial));

        let outcomes = match self.max_in_flight {
            Some(limit) => {
                stream::iter(evaluations)
                    .buffered(limit.max(1))
                    .try_collect::<Vec<_>>()
                    .await?
            }
            None => futures::future::try_join_all(evaluations).await?,
        };

        if outcomes.len() != candidates.len() {
            return Err(StageError::Invariant(format!(
                "fan-out produced {} outcomes for {} candidates",
                outcomes.len(),
                candidates.len()
            )));
        }

        let degraded = outcomes.iter().filter(|o| o.is_degraded()).count();
        if degraded > 0 {
            tracing::warn!(
                "{} of {} candidate evaluations degraded for {}",
                degraded,
                outcomes.len(),
                ctx.patient_id()
            );
        }

        Ok(outcomes)
    }

    async fn evaluate_one(
        &self,
        ctx: &RunContext,
        profile: &PatientProfile,
        trial: &Trial,
    ) -> Result<EvaluationOutcome, StageError> {
        match self.evaluator.evaluate(ctx, profile, trial).await {
            Ok(outcome) => Ok(outcome),
            Err(StageError::Invariant(message)) => Err(StageError::Invariant(message)),
            Err(StageError::Transient { attempts, message }) => {
                tracing::warn!(
                    "Evaluation of {} degraded after {} attempt(s): {}",
                    trial.id,
                    attempts,
                    message
                );
                Ok(EvaluationOutcome::degraded(&trial.id, attempts, message))
            }
            Err(StageError::Malformed { attempts, message }) => {
                tracing::warn!(
                    "Evaluation of {} degraded after {} malformed attempt(s): {}",
                    trial.id,
                    attempts,
                    message
                );
                Ok(EvaluationOutcome::degraded(&trial.id, attempts, message)
                    .caused_by(ErrorKind::MalformedOracleResponse))
            }
            Err(err @ (StageError::NotFound(_) | StageError::DataQuality(_))) => {
                tracing::warn!("Evaluation of {} degraded: {}", trial.id, err);
                Ok(EvaluationOutcome::degraded(&trial.id, 1, err.to_string()))
            }
        }
    }
}
