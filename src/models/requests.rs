use serde::{Deserialize, Serialize};
use validator::Validate;

/// Optional caller context attached to a trial search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialSearchContext {
    #[serde(alias = "requesting_clinician_id", rename = "requestingClinicianId", default)]
    pub requesting_clinician_id: Option<String>,
    #[serde(alias = "search_radius_km", rename = "searchRadiusKm", default)]
    pub search_radius_km: Option<u32>,
}

/// Request to find trials for a patient
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TrialSearchRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "patient_id", rename = "patientId")]
    pub patient_id: String,
    #[serde(alias = "bypass_cache", rename = "bypassCache", default)]
    pub bypass_cache: bool,
    #[serde(default)]
    pub context: Option<TrialSearchContext>,
}
