use std::sync::Arc;

use crate::core::context::RunContext;
use crate::core::scoring::sort_by_rank;
use crate::error::StageError;
use crate::models::{Decision, EvaluationOutcome, TrialMatch, Verdict};

/// Order applied to the final match list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchOrdering {
    /// Keep discovery order
    #[default]
    Discovery,
    /// Stable sort by rank score, best first
    RankScore,
}

/// Stage 4: keep accepted outcomes and commit the final list
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAggregator {
    ordering: MatchOrdering,
}

impl ResultAggregator {
    pub fn new(ordering: MatchOrdering) -> Self {
        Self { ordering }
    }

    /// Select accepted matches and commit them under the final cache key, even when empty
    pub async fn aggregate(
        &self,
        ctx: &RunContext,
        outcomes: &[EvaluationOutcome],
    ) -> Result<Arc<Vec<TrialMatch>>, StageError> {
        let mut matches = select_matches(outcomes)?;

        if self.ordering == MatchOrdering::RankScore {
            sort_by_rank(&mut matches);
        }

        let matches = Arc::new(matches);
        ctx.commit_matches(Arc::clone(&matches)).await;

        Ok(matches)
    }
}

/// Accepted matches in outcome order
pub fn select_matches(outcomes: &[EvaluationOutcome]) -> Result<Vec<TrialMatch>, StageError> {
    let mut matches = Vec::new();

    for outcome in outcomes {
        match (&outcome.verdict, &outcome.matched) {
            (Verdict::Decided { decision: Decision::Accepted }, Some(m)) => {
                matches.push(m.clone());
            }
            (Verdict::Decided { decision: Decision::Accepted }, None) => {
                return Err(StageError::Invariant(format!(
                    "accepted outcome for {} has no match record",
                    outcome.trial_id
                )));
            }
            (_, Some(_)) => {
                return Err(StageError::Invariant(format!(
                    "non-accepted outcome for {} carries a match record",
                    outcome.trial_id
                )));
            }
            (Verdict::Decided { .. }, None) | (Verdict::Degraded { .. }, None) => {}
        }
    }

    Ok(matches)
}
