use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discriminated error kinds surfaced by the matching pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Subject unknown to the profile source. Never retried.
    PatientNotFound,
    /// Profile fetch exhausted its retry budget.
    ProfileFetchFailed,
    /// Candidate discovery exhausted its retry budget or got unusable input.
    DiscoveryFailed,
    /// A single candidate could not be evaluated. Never fails the run.
    CandidateEvaluationDegraded,
    /// The oracle answered with something other than the agreed structure.
    MalformedOracleResponse,
    /// A state the pipeline declares impossible was reached.
    InternalInvariantViolation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PatientNotFound => "PATIENT_NOT_FOUND",
            ErrorKind::ProfileFetchFailed => "PROFILE_FETCH_FAILED",
            ErrorKind::DiscoveryFailed => "DISCOVERY_FAILED",
            ErrorKind::CandidateEvaluationDegraded => "CANDIDATE_EVALUATION_DEGRADED",
            ErrorKind::MalformedOracleResponse => "MALFORMED_ORACLE_RESPONSE",
            ErrorKind::InternalInvariantViolation => "INTERNAL_INVARIANT_VIOLATION",
        }
    }

    /// Whether the caller is at fault (maps to a "not found" response)
    pub fn is_client_error(&self) -> bool {
        matches!(self, ErrorKind::PatientNotFound)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal pipeline failure: the only error surface callers of the pipeline see
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Failure of a single pipeline stage, after retries have been applied
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transient failure after {attempts} attempt(s): {message}")]
    Transient { attempts: u32, message: String },

    /// The collaborator kept answering, but never with a usable structure
    #[error("Malformed reply after {attempts} attempt(s): {message}")]
    Malformed { attempts: u32, message: String },

    #[error("Data quality error: {0}")]
    DataQuality(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl StageError {
    /// Translate a stage failure into the terminal kind for the stage that raised it.
    ///
    /// `exhausted` is the kind reported when the stage ran out of retries.
    pub fn into_pipeline_error(self, exhausted: ErrorKind) -> PipelineError {
        match self {
            StageError::NotFound(message) => PipelineError::new(ErrorKind::PatientNotFound, message),
            StageError::Transient { attempts, message } => PipelineError::new(
                exhausted,
                format!("{} (after {} attempt(s))", message, attempts),
            ),
            StageError::Malformed { attempts, message } => PipelineError::new(
                ErrorKind::MalformedOracleResponse,
                format!("{} (after {} attempt(s))", message, attempts),
            ),
            StageError::DataQuality(message) => PipelineError::new(exhausted, message),
            StageError::Invariant(message) => {
                PipelineError::new(ErrorKind::InternalInvariantViolation, message)
            }
        }
    }
}
