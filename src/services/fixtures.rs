//! In-memory profile and catalog sources for demos and tests.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::core::sources::{CatalogError, CatalogSource, ProfileSource, ProfileSourceError};
use crate::models::{PatientProfile, Trial, TrialStatus};

/// Errors that can occur while loading a fixture file
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse fixture file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Fixture file layout
#[derive(Debug, Default, Deserialize)]
pub struct FixtureFile {
    #[serde(default)]
    pub patients: Vec<PatientProfile>,
    #[serde(default)]
    pub trials: Vec<Trial>,
    /// Patient IDs whose lookups always fail as if the registry were down
    #[serde(default)]
    pub unavailable_patients: Vec<String>,
}

impl FixtureFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FixtureError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

/// Profile source backed by a map
#[derive(Debug, Clone, Default)]
pub struct FixtureProfileSource {
    patients: HashMap<String, PatientProfile>,
    unavailable: Vec<String>,
}

impl FixtureProfileSource {
    pub fn new(patients: Vec<PatientProfile>) -> Self {
        Self {
            patients: patients
                .into_iter()
                .map(|p| (p.patient_id.clone(), p))
                .collect(),
            unavailable: Vec::new(),
        }
    }

    /// Lookups for `patient_id` fail with a transient error
    pub fn with_unavailable(mut self, patient_id: impl Into<String>) -> Self {
        self.unavailable.push(patient_id.into());
        self
    }

    /// Demo registry, including one patient whose lookup always errors
    pub fn demo() -> Self {
        Self::new(demo_patients()).with_unavailable("PATIENT_ERROR")
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }
}

#[async_trait]
impl ProfileSource for FixtureProfileSource {
    async fn fetch(&self, patient_id: &str) -> Result<PatientProfile, ProfileSourceError> {
        if self.unavailable.iter().any(|id| id == patient_id) {
            tracing::error!("Simulated database error fetching patient profile");
            return Err(ProfileSourceError::Unavailable(
                "Simulated database connection error".to_string(),
            ));
        }

        self.patients
            .get(patient_id)
            .cloned()
            .ok_or_else(|| ProfileSourceError::NotFound(format!("Patient ID {} not found.", patient_id)))
    }
}

/// Trial catalog backed by a list, returned in insertion order
#[derive(Debug, Clone, Default)]
pub struct FixtureCatalog {
    trials: Vec<Trial>,
}

impl FixtureCatalog {
    pub fn new(trials: Vec<Trial>) -> Self {
        Self { trials }
    }

    pub fn demo() -> Self {
        Self::new(demo_trials())
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }
}

#[async_trait]
impl CatalogSource for FixtureCatalog {
    async fn query(&self, _condition: &str) -> Result<Vec<Trial>, CatalogError> {
        Ok(self.trials.clone())
    }
}

/// Build both sources from a fixture file
pub fn load_sources<P: AsRef<Path>>(
    path: P,
) -> Result<(FixtureProfileSource, FixtureCatalog), FixtureError> {
    let file = FixtureFile::load(path)?;

    let profiles = file
        .unavailable_patients
        .into_iter()
        .fold(FixtureProfileSource::new(file.patients), |source, id| {
            source.with_unavailable(id)
        });

    Ok((profiles, FixtureCatalog::new(file.trials)))
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn demo_patients() -> Vec<PatientProfile> {
    vec![
        PatientProfile {
            patient_id: "PATIENT_001".to_string(),
            condition: "Lung Cancer".to_string(),
            stage: Some("III".to_string()),
            age: 65,
            prior_therapies: strings(&["Chemo X"]),
            biomarkers: strings(&["EGFR+"]).into_iter().collect(),
            notes: Some("ECOG 1".to_string()),
        },
        PatientProfile {
            patient_id: "PATIENT_002".to_string(),
            condition: "Breast Cancer".to_string(),
            stage: Some("II".to_string()),
            age: 52,
            prior_therapies: vec![],
            biomarkers: strings(&["HER2+"]).into_iter().collect(),
            notes: Some("No major comorbidities".to_string()),
        },
        PatientProfile {
            patient_id: "PATIENT_003".to_string(),
            condition: "Diabetes Type 2".to_string(),
            stage: None,
            age: 70,
            prior_therapies: strings(&["Metformin"]),
            biomarkers: Default::default(),
            notes: Some("HbA1c 8.1%, Mild CKD Stage 2".to_string()),
        },
        PatientProfile {
            patient_id: "PATIENT_NO_MATCH".to_string(),
            condition: "Rare Condition Y".to_string(),
            stage: None,
            age: 40,
            prior_therapies: vec![],
            biomarkers: Default::default(),
            notes: None,
        },
    ]
}

pub fn demo_trials() -> Vec<Trial> {
    vec![
        Trial {
            id: "NCT001".to_string(),
            title: "Lung Cancer Trial A (EGFR+)".to_string(),
            condition: "Non-Small Cell Lung Cancer".to_string(),
            phase: "3".to_string(),
            status: TrialStatus::Recruiting,
            min_age: Some(50),
            max_age: Some(75),
            required_markers: strings(&["EGFR+"]).into_iter().collect(),
            inclusions: strings(&["Stage III or IV", "ECOG 0-1"]),
            exclusions: strings(&["Prior immunotherapy", "Brain metastases"]),
            eligibility_text: Some(
                "Must have documented EGFR mutation. No prior treatment with EGFR TKIs. Adequate organ function required."
                    .to_string(),
            ),
            url: Some("http://example.com/nct001".to_string()),
        },
        Trial {
            id: "NCT002".to_string(),
            title: "Lung Cancer Trial B (General)".to_string(),
            condition: "Non-Small Cell Lung Cancer".to_string(),
            phase: "2".to_string(),
            status: TrialStatus::Recruiting,
            min_age: Some(18),
            max_age: None,
            required_markers: Default::default(),
            inclusions: strings(&["Advanced or metastatic NSCLC", "At least one prior line of therapy"]),
            exclusions: strings(&["Active autoimmune disease"]),
            eligibility_text: Some("Patients with measurable disease per RECIST v1.1.".to_string()),
            url: Some("http://example.com/nct002".to_string()),
        },
        Trial {
            id: "NCT003".to_string(),
            title: "Breast Cancer Trial C (HER2+)".to_string(),
            condition: "Breast Cancer".to_string(),
            phase: "3".to_string(),
            status: TrialStatus::Recruiting,
            min_age: Some(40),
            max_age: Some(70),
            required_markers: strings(&["HER2+"]).into_iter().collect(),
            inclusions: strings(&["Metastatic HER2+ Breast Cancer", "Prior taxane therapy"]),
            exclusions: strings(&["Significant cardiovascular disease"]),
            eligibility_text: Some("Confirmation of HER2 status by central lab required.".to_string()),
            url: Some("http://example.com/nct003".to_string()),
        },
        Trial {
            id: "NCT004".to_string(),
            title: "Diabetes Study D".to_string(),
            condition: "Diabetes Type 2".to_string(),
            phase: "4".to_string(),
            status: TrialStatus::Recruiting,
            min_age: Some(60),
            max_age: Some(80),
            required_markers: Default::default(),
            inclusions: strings(&["Diagnosed Type 2 Diabetes > 5 years", "HbA1c between 7.5% and 9.5%"]),
            exclusions: strings(&["eGFR < 45 ml/min", "Recent cardiovascular event"]),
            eligibility_text: Some("Stable dose of metformin allowed.".to_string()),
            url: Some("http://example.com/nct004".to_string()),
        },
        Trial {
            id: "NCT005".to_string(),
            title: "Old Lung Cancer Trial".to_string(),
            condition: "Non-Small Cell Lung Cancer".to_string(),
            phase: "3".to_string(),
            status: TrialStatus::Completed,
            min_age: Some(50),
            max_age: Some(75),
            required_markers: strings(&["EGFR+"]).into_iter().collect(),
            inclusions: vec![],
            exclusions: vec![],
            eligibility_text: None,
            url: Some("http://example.com/nct005".to_string()),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_registry() {
        let source = FixtureProfileSource::demo();

        let profile = source.fetch("PATIENT_001").await.unwrap();
        assert_eq!(profile.condition, "Lung Cancer");

        assert!(matches!(
            source.fetch("PATIENT_999").await,
            Err(ProfileSourceError::NotFound(_))
        ));
        assert!(matches!(
            source.fetch("PATIENT_ERROR").await,
            Err(ProfileSourceError::Unavailable(_))
        ));
    }

    #[test]
    fn test_fixture_file_parses() {
        let raw = r#"
            unavailable_patients = ["P_DOWN"]

            [[patients]]
            patientId = "P1"
            condition = "Melanoma"
            age = 48
            biomarkers = ["BRAF V600E"]

            [[trials]]
            id = "NCT900"
            title = "Melanoma Trial"
            condition = "Advanced Melanoma"
            phase = "2"
            status = "Recruiting"
            min_age = 18
        "#;

        let file: FixtureFile = toml::from_str(raw).unwrap();
        assert_eq!(file.patients[0].patient_id, "P1");
        assert_eq!(file.trials[0].status, TrialStatus::Recruiting);
        assert_eq!(file.trials[0].max_age, None);
        assert_eq!(file.unavailable_patients, vec!["P_DOWN"]);
    }
}
