use crate::models::Trial;

/// Case-insensitive containment in either direction
///
/// A patient with "Lung Cancer" matches a trial for "Non-Small Cell Lung Cancer",
/// and a patient with "Non-Small Cell Lung Cancer" matches a trial for "Lung Cancer".
#[inline]
pub fn condition_matches(trial_condition: &str, patient_condition: &str) -> bool {
    let trial = trial_condition.trim().to_lowercase();
    let patient = patient_condition.trim().to_lowercase();

    if trial.is_empty() || patient.is_empty() {
        return false;
    }

    trial.contains(&patient) || patient.contains(&trial)
}

/// Check if a trial is open and relevant to the patient's condition
#[inline]
pub fn is_eligible_candidate(trial: &Trial, patient_condition: &str) -> bool {
    trial.status.is_open() && condition_matches(&trial.condition, patient_condition)
}

/// Keep eligible candidates, preserving catalog order
pub fn filter_candidates(trials: Vec<Trial>, patient_condition: &str) -> Vec<Trial> {
    trials
        .into_iter()
        .filter(|trial| is_eligible_candidate(trial, patient_condition))
        .collect()
}
