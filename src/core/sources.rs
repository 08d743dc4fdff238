//! Collaborator capabilities consumed by the pipeline.
//!
//! The pipeline only sees these traits; concrete backends live in `services`.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::retry::Retryable;
use crate::models::{CandidateSnapshot, PatientProfile, ProfileSnapshot, RawVerdict, Trial};

/// Errors from a profile source
#[derive(Debug, Clone, Error)]
pub enum ProfileSourceError {
    #[error("Patient not found: {0}")]
    NotFound(String),

    #[error("Profile source unavailable: {0}")]
    Unavailable(String),

    /// The source refused the request; repeating it gives the same answer
    #[error("Profile source rejected request: {0}")]
    Rejected(String),
}

impl Retryable for ProfileSourceError {
    fn is_transient(&self) -> bool {
        matches!(self, ProfileSourceError::Unavailable(_))
    }
}

/// Errors from a trial catalog
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

impl Retryable for CatalogError {
    fn is_transient(&self) -> bool {
        true
    }
}

/// Errors from the reasoning oracle
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed oracle response: {0}")]
    Malformed(String),
}

impl Retryable for OracleError {
    fn is_transient(&self) -> bool {
        true
    }
}

/// System of record for patient profiles
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch(&self, patient_id: &str) -> Result<PatientProfile, ProfileSourceError>;
}

/// Trial catalog
///
/// Sources may pre-filter by condition; the discoverer re-applies its own
/// condition and status filters on whatever comes back.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn query(&self, condition: &str) -> Result<Vec<Trial>, CatalogError>;
}

/// Opaque eligibility reasoning capability
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn evaluate(
        &self,
        profile: &ProfileSnapshot,
        candidate: &CandidateSnapshot,
    ) -> Result<RawVerdict, OracleError>;
}
