// Core pipeline exports
pub mod aggregate;
pub mod context;
pub mod discovery;
pub mod evaluator;
pub mod fanout;
pub mod filters;
pub mod matcher;
pub mod resolver;
pub mod retry;
pub mod scoring;
pub mod sources;

pub use aggregate::{MatchOrdering, ResultAggregator};
pub use context::RunContext;
pub use discovery::CandidateDiscoverer;
pub use evaluator::CandidateEvaluator;
pub use fanout::FanOutCoordinator;
pub use filters::{condition_matches, filter_candidates, is_eligible_candidate};
pub use matcher::{MatchRun, PipelineOptions, PipelineState, TrialMatcher};
pub use resolver::ProfileResolver;
pub use retry::{RetryError, RetryGovernor, RetryLedger, RetryPolicy, RetryState, Retryable};
pub use scoring::{build_match, rank_score};
pub use sources::{
    CatalogError, CatalogSource, OracleError, ProfileSource, ProfileSourceError, ReasoningOracle,
};
