use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::ErrorKind;

/// Patient profile as held by the system of record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    #[serde(rename = "patientId")]
    pub patient_id: String,
    pub condition: String,
    #[serde(default)]
    pub stage: Option<String>,
    pub age: u32,
    #[serde(rename = "priorTherapies", default)]
    pub prior_therapies: Vec<String>,
    #[serde(default)]
    pub biomarkers: BTreeSet<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Recruitment status of a trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialStatus {
    #[serde(rename = "Recruiting")]
    Recruiting,
    #[serde(rename = "Not yet recruiting")]
    NotYetRecruiting,
    #[serde(rename = "Active, not recruiting")]
    ActiveNotRecruiting,
    #[serde(rename = "Enrolling by invitation")]
    EnrollingByInvitation,
    #[serde(rename = "Suspended")]
    Suspended,
    #[serde(rename = "Terminated")]
    Terminated,
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "Withdrawn")]
    Withdrawn,
    #[serde(other)]
    Unknown,
}

impl TrialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialStatus::Recruiting => "Recruiting",
            TrialStatus::NotYetRecruiting => "Not yet recruiting",
            TrialStatus::ActiveNotRecruiting => "Active, not recruiting",
            TrialStatus::EnrollingByInvitation => "Enrolling by invitation",
            TrialStatus::Suspended => "Suspended",
            TrialStatus::Terminated => "Terminated",
            TrialStatus::Completed => "Completed",
            TrialStatus::Withdrawn => "Withdrawn",
            TrialStatus::Unknown => "Unknown",
        }
    }

    /// Only recruiting trials are open for matching
    pub fn is_open(&self) -> bool {
        matches!(self, TrialStatus::Recruiting)
    }
}

impl std::fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrialStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.trim().to_lowercase().as_str() {
            "recruiting" => TrialStatus::Recruiting,
            "not yet recruiting" => TrialStatus::NotYetRecruiting,
            "active, not recruiting" => TrialStatus::ActiveNotRecruiting,
            "enrolling by invitation" => TrialStatus::EnrollingByInvitation,
            "suspended" => TrialStatus::Suspended,
            "terminated" => TrialStatus::Terminated,
            "completed" => TrialStatus::Completed,
            "withdrawn" => TrialStatus::Withdrawn,
            _ => TrialStatus::Unknown,
        };
        Ok(status)
    }
}

/// Catalog entry for a clinical trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: String,
    pub title: String,
    pub condition: String,
    pub phase: String,
    pub status: TrialStatus,
    #[serde(default)]
    pub min_age: Option<u32>,
    #[serde(default)]
    pub max_age: Option<u32>,
    #[serde(default)]
    pub required_markers: BTreeSet<String>,
    #[serde(default)]
    pub inclusions: Vec<String>,
    #[serde(default)]
    pub exclusions: Vec<String>,
    #[serde(default)]
    pub eligibility_text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Evidence about the patient handed to the reasoning oracle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSnapshot {
    pub age: u32,
    pub condition: String,
    pub stage: Option<String>,
    pub biomarkers: Vec<String>,
    pub notes: Option<String>,
}

impl From<&PatientProfile> for ProfileSnapshot {
    fn from(profile: &PatientProfile) -> Self {
        Self {
            age: profile.age,
            condition: profile.condition.clone(),
            stage: profile.stage.clone(),
            biomarkers: profile.biomarkers.iter().cloned().collect(),
            notes: profile.notes.clone(),
        }
    }
}

/// Evidence about the trial handed to the reasoning oracle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSnapshot {
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub condition: String,
    pub required_markers: Vec<String>,
    pub inclusions: Vec<String>,
    pub exclusions: Vec<String>,
}

impl From<&Trial> for CandidateSnapshot {
    fn from(trial: &Trial) -> Self {
        Self {
            min_age: trial.min_age,
            max_age: trial.max_age,
            condition: trial.condition.clone(),
            required_markers: trial.required_markers.iter().cloned().collect(),
            inclusions: trial.inclusions.clone(),
            exclusions: trial.exclusions.clone(),
        }
    }
}

/// Eligibility decision returned by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Rejected,
    Indeterminate,
}

impl Decision {
    /// Map an oracle decision label onto a decision.
    ///
    /// Accepts both the canonical names and the phrasing the analysis prompt asks for.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "accepted" | "potential match" => Some(Decision::Accepted),
            "rejected" | "likely not a match" => Some(Decision::Rejected),
            "indeterminate" | "uncertain" => Some(Decision::Indeterminate),
            _ => None,
        }
    }
}

/// Structured reply from the oracle, before the decision label is validated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawVerdict {
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default)]
    pub reasoning_steps: Vec<String>,
    #[serde(default)]
    pub match_rationale: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

/// How a single candidate's evaluation ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Verdict {
    Decided {
        decision: Decision,
    },
    Degraded {
        kind: ErrorKind,
        attempts: u32,
        message: String,
        /// Kind of the last failure, when more specific than `kind`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<ErrorKind>,
    },
}

/// Result of evaluating one trial for one patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub trial_id: String,
    pub verdict: Verdict,
    pub reasoning_steps: Vec<String>,
    pub match_rationale: Vec<String>,
    pub flags: Vec<String>,
    /// Present exactly when the decision is `Accepted`
    pub matched: Option<TrialMatch>,
}

impl EvaluationOutcome {
    /// Outcome for a candidate whose evaluation could not be completed
    pub fn degraded(trial_id: impl Into<String>, attempts: u32, message: impl Into<String>) -> Self {
        Self {
            trial_id: trial_id.into(),
            verdict: Verdict::Degraded {
                kind: ErrorKind::CandidateEvaluationDegraded,
                attempts,
                message: message.into(),
                cause: None,
            },
            reasoning_steps: Vec::new(),
            match_rationale: Vec::new(),
            flags: Vec::new(),
            matched: None,
        }
    }

    /// Record what the last failed attempt ran into
    pub fn caused_by(mut self, kind: ErrorKind) -> Self {
        if let Verdict::Degraded { cause, .. } = &mut self.verdict {
            *cause = Some(kind);
        }
        self
    }

    /// Kind of the last failure behind a degraded outcome
    pub fn degraded_cause(&self) -> Option<ErrorKind> {
        match &self.verdict {
            Verdict::Degraded { cause, .. } => *cause,
            Verdict::Decided { .. } => None,
        }
    }

    pub fn decision(&self) -> Option<Decision> {
        match &self.verdict {
            Verdict::Decided { decision } => Some(*decision),
            Verdict::Degraded { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.verdict, Verdict::Degraded { .. })
    }
}

/// Accepted trial, ready to be shown to the clinician
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialMatch {
    #[serde(rename = "trialId")]
    pub trial_id: String,
    pub title: String,
    pub status: TrialStatus,
    pub phase: String,
    pub condition: String,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(rename = "matchRationale", default)]
    pub match_rationale: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(rename = "detailsUrl", default)]
    pub details_url: Option<String>,
    #[serde(rename = "contactInfo", default)]
    pub contact_info: Option<String>,
    pub rank_score: f64,
}
