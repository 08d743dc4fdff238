//! Trial Match - clinical trial matching pipeline
//!
//! Resolves a patient profile, discovers recruiting trials for the patient's
//! condition, asks a reasoning oracle to evaluate every candidate concurrently,
//! and aggregates the accepted candidates into ranked match records.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{MatchOrdering, MatchRun, PipelineOptions, TrialMatcher};
pub use crate::error::{ErrorKind, PipelineError};
pub use crate::models::{EvaluationOutcome, PatientProfile, Trial, TrialMatch, TrialSearchRequest};
