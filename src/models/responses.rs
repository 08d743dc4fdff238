use serde::{Deserialize, Serialize};
use crate::models::domain::{TrialMatch, TrialStatus};

/// Public view of a match; the internal rank score is not exposed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialMatchView {
    #[serde(rename = "trialId")]
    pub trial_id: String,
    pub title: String,
    pub status: TrialStatus,
    pub phase: String,
    pub condition: String,
    pub locations: Vec<String>,
    #[serde(rename = "matchRationale")]
    pub match_rationale: Vec<String>,
    pub flags: Vec<String>,
    #[serde(rename = "detailsUrl")]
    pub details_url: Option<String>,
    #[serde(rename = "contactInfo")]
    pub contact_info: Option<String>,
}

impl From<TrialMatch> for TrialMatchView {
    fn from(m: TrialMatch) -> Self {
        Self {
            trial_id: m.trial_id,
            title: m.title,
            status: m.status,
            phase: m.phase,
            condition: m.condition,
            locations: m.locations,
            match_rationale: m.match_rationale,
            flags: m.flags,
            details_url: m.details_url,
            contact_info: m.contact_info,
        }
    }
}

/// Response when at least one trial matched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialSearchResponse {
    pub status: String,
    pub matches: Vec<TrialMatchView>,
    #[serde(rename = "searchTimestamp")]
    pub search_timestamp: chrono::DateTime<chrono::Utc>,
}

/// Response when the pipeline completed without any match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoMatchesResponse {
    pub status: String,
    pub matches: Vec<TrialMatchView>,
    pub message: String,
    #[serde(rename = "searchTimestamp")]
    pub search_timestamp: chrono::DateTime<chrono::Utc>,
}

impl NoMatchesResponse {
    pub fn new(search_timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            status: "no_matches_found".to_string(),
            matches: Vec::new(),
            message: "No suitable recruiting trials found based on current criteria.".to_string(),
            search_timestamp,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
