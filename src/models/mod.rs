// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    CandidateSnapshot, Decision, EvaluationOutcome, PatientProfile, ProfileSnapshot, RawVerdict,
    Trial, TrialMatch, TrialStatus, Verdict,
};
pub use requests::{TrialSearchContext, TrialSearchRequest};
pub use responses::{ErrorResponse, HealthResponse, NoMatchesResponse, TrialMatchView, TrialSearchResponse};
