use crate::models::{Trial, TrialMatch};

/// Placeholder until a location sourcing collaborator is wired in
pub const LOCATION_PENDING: &str = "Location Pending API";
/// Placeholder until a contact sourcing collaborator is wired in
pub const CONTACT_PENDING: &str = "Contact Pending API";

/// Rank score for an accepted trial
///
/// score = 1.0 - 0.1 * flags
///
/// Not clamped: ten or more flags yield a score of zero or below.
#[inline]
pub fn rank_score(flag_count: usize) -> f64 {
    1.0 - 0.1 * flag_count as f64
}

/// Join an accepted verdict with its trial
pub fn build_match(trial: &Trial, match_rationale: Vec<String>, flags: Vec<String>) -> TrialMatch {
    TrialMatch {
        trial_id: trial.id.clone(),
        title: trial.title.clone(),
        status: trial.status,
        phase: trial.phase.clone(),
        condition: trial.condition.clone(),
        locations: vec![LOCATION_PENDING.to_string()],
        rank_score: rank_score(flags.len()),
        match_rationale,
        flags,
        details_url: trial.url.clone(),
        contact_info: Some(CONTACT_PENDING.to_string()),
    }
}

/// Stable sort by rank score, best first
pub fn sort_by_rank(matches: &mut [TrialMatch]) {
    matches.sort_by(|a, b| {
        b.rank_score
            .partial_cmp(&a.rank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrialStatus;

    fn create_test_trial() -> Trial {
        Trial {
            id: "NCT001".to_string(),
            title: "Lung Cancer Trial A (EGFR+)".to_string(),
            condition: "Non-Small Cell Lung Cancer".to_string(),
            phase: "3".to_string(),
            status: TrialStatus::Recruiting,
            min_age: Some(50),
            max_age: Some(75),
            required_markers: ["EGFR+".to_string()].into_iter().collect(),
            inclusions: vec![],
            exclusions: vec![],
            eligibility_text: None,
            url: Some("http://example.com/nct001".to_string()),
        }
    }

    fn flags(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("flag {}", i)).collect()
    }

    #[test]
    fn test_rank_score_formula() {
        assert!((rank_score(0) - 1.0).abs() < 0.005);
        assert!((rank_score(1) - 0.9).abs() < 0.005);
        assert!((rank_score(3) - 0.7).abs() < 0.005);
    }

    #[test]
    fn test_rank_score_is_not_clamped() {
        assert!(rank_score(12) < 0.0);
    }

    #[test]
    fn test_build_match_copies_trial_fields() {
        let trial = create_test_trial();
        let m = build_match(&trial, vec!["EGFR+ present".to_string()], flags(2));

        assert_eq!(m.trial_id, "NCT001");
        assert_eq!(m.status, TrialStatus::Recruiting);
        assert_eq!(m.details_url.as_deref(), Some("http://example.com/nct001"));
        assert_eq!(m.locations, vec![LOCATION_PENDING]);
        assert_eq!(m.contact_info.as_deref(), Some(CONTACT_PENDING));
        assert!((m.rank_score - 0.8).abs() < 0.005);
    }

    #[test]
    fn test_sort_by_rank_is_stable() {
        let trial = create_test_trial();
        let mut matches = vec![
            build_match(&trial, vec!["a".to_string()], flags(2)),
            build_match(&trial, vec!["b".to_string()], flags(0)),
            build_match(&trial, vec!["c".to_string()], flags(2)),
        ];

        sort_by_rank(&mut matches);

        let order: Vec<&str> = matches.iter().map(|m| m.match_rationale[0].as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }
}
