use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::context::RunContext;
use crate::core::retry::{RetryError, RetryGovernor};
use crate::core::scoring::build_match;
use crate::core::sources::{OracleError, ReasoningOracle};
use crate::error::StageError;
use crate::models::{
    CandidateSnapshot, Decision, EvaluationOutcome, PatientProfile, ProfileSnapshot, RawVerdict,
    Trial, Verdict,
};

/// Stage 3: ask the reasoning oracle whether one trial fits the patient
pub struct CandidateEvaluator {
    oracle: Arc<dyn ReasoningOracle>,
    governor: RetryGovernor,
}

impl CandidateEvaluator {
    pub fn new(oracle: Arc<dyn ReasoningOracle>, governor: RetryGovernor) -> Self {
        Self { oracle, governor }
    }

    /// Evaluate a single candidate under its own retry budget
    pub async fn evaluate(
        &self,
        ctx: &RunContext,
        profile: &PatientProfile,
        trial: &Trial,
    ) -> Result<EvaluationOutcome, StageError> {
        if let Some(outcome) = ctx.cached_outcome(&trial.id).await? {
            tracing::debug!("Using cached evaluation of {} for {}", trial.id, ctx.patient_id());
            return Ok(EvaluationOutcome::clone(&outcome));
        }

        let profile_snapshot = ProfileSnapshot::from(profile);
        let candidate_snapshot = CandidateSnapshot::from(trial);
        let retry_key = format!("evaluate:{}", trial.id);
        // Reset per attempt; a timed-out attempt leaves it false
        let last_malformed = AtomicBool::new(false);

        let verdict = self
            .governor
            .run(&retry_key, ctx.retries(), |attempt| {
                let profile_snapshot = &profile_snapshot;
                let candidate_snapshot = &candidate_snapshot;
                let last_malformed = &last_malformed;
                async move {
                    tracing::trace!("Evaluating {} (attempt {})", trial.id, attempt);
                    last_malformed.store(false, Ordering::Relaxed);
                    let result = self
                        .oracle
                        .evaluate(profile_snapshot, candidate_snapshot)
                        .await
                        .and_then(validate_verdict);
                    if let Err(OracleError::Malformed(_)) = &result {
                        last_malformed.store(true, Ordering::Relaxed);
                    }
                    result
                }
            })
            .await;

        let (attempts, message) = match verdict {
            Ok((decision, raw)) => return Ok(self.commit(ctx, trial, decision, raw).await),
            Err(RetryError::Fatal(err)) => (1, err.to_string()),
            Err(RetryError::Exhausted { attempts, last_failure }) => (attempts, last_failure),
        };

        if last_malformed.load(Ordering::Relaxed) {
            Err(StageError::Malformed { attempts, message })
        } else {
            Err(StageError::Transient { attempts, message })
        }
    }

    async fn commit(
        &self,
        ctx: &RunContext,
        trial: &Trial,
        decision: Decision,
        raw: RawVerdict,
    ) -> EvaluationOutcome {
        let outcome = Arc::new(classify(trial, decision, raw));
        tracing::debug!(
            "Trial {} for {}: {:?} ({} flags)",
            trial.id,
            ctx.patient_id(),
            decision,
            outcome.flags.len()
        );

        ctx.commit_outcome(Arc::clone(&outcome)).await;

        EvaluationOutcome::clone(&outcome)
    }
}

/// Reject replies without a recognised decision label
pub fn validate_verdict(raw: RawVerdict) -> Result<(Decision, RawVerdict), OracleError> {
    let label = raw
        .decision
        .as_deref()
        .ok_or_else(|| OracleError::Malformed("response is missing the decision field".into()))?;

    let decision = Decision::from_label(label)
        .ok_or_else(|| OracleError::Malformed(format!("unrecognised decision label '{}'", label)))?;

    Ok((decision, raw))
}

/// Build the outcome; only accepted decisions carry a match
pub fn classify(trial: &Trial, decision: Decision, raw: RawVerdict) -> EvaluationOutcome {
    let matched = match decision {
        Decision::Accepted => Some(build_match(
            trial,
            raw.match_rationale.clone(),
            raw.flags.clone(),
        )),
        Decision::Rejected | Decision::Indeterminate => None,
    };

    EvaluationOutcome {
        trial_id: trial.id.clone(),
        verdict: Verdict::Decided { decision },
        reasoning_steps: raw.reasoning_steps,
        match_rationale: raw.match_rationale,
        flags: raw.flags,
        matched,
    }
}
