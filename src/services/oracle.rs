use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::core::sources::{OracleError, ReasoningOracle};
use crate::models::{CandidateSnapshot, ProfileSnapshot, RawVerdict};

const SYSTEM_PROMPT: &str = "You output ONLY valid JSON.";

/// Azure OpenAI chat-completions client used as the eligibility oracle
pub struct AzureOpenAiOracle {
    endpoint: String,
    api_key: String,
    deployment: String,
    api_version: String,
    temperature: f32,
    client: Client,
}

impl AzureOpenAiOracle {
    pub fn new(
        endpoint: String,
        api_key: String,
        deployment: String,
        api_version: String,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint,
            api_key,
            deployment,
            api_version,
            temperature,
            client,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            urlencoding::encode(&self.deployment),
            urlencoding::encode(&self.api_version)
        )
    }
}

#[async_trait]
impl ReasoningOracle for AzureOpenAiOracle {
    async fn evaluate(
        &self,
        profile: &ProfileSnapshot,
        candidate: &CandidateSnapshot,
    ) -> Result<RawVerdict, OracleError> {
        let prompt = build_prompt(profile, candidate)?;

        let body = json!({
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "temperature": self.temperature,
            "response_format": {"type": "json_object"},
        });

        let response = self
            .client
            .post(self.completions_url())
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Unavailable(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(OracleError::Unavailable(format!(
                "LLM API returned {}: {}",
                status, detail
            )));
        }

        let completion: Value = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(format!("completion is not JSON: {}", e)))?;

        let content = completion
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OracleError::Malformed("LLM returned empty content".into()))?;

        parse_verdict(content)
    }
}

/// Parse the model's JSON answer
pub fn parse_verdict(content: &str) -> Result<RawVerdict, OracleError> {
    serde_json::from_str::<RawVerdict>(content).map_err(|e| {
        tracing::debug!("Unparseable oracle output: {}", content);
        OracleError::Malformed(format!("LLM output parsing failed: {}", e))
    })
}

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
}

/// Analysis prompt: step-by-step comparison of patient evidence against trial criteria
pub fn build_prompt(
    profile: &ProfileSnapshot,
    candidate: &CandidateSnapshot,
) -> Result<String, OracleError> {
    let profile_json = serde_json::to_string(profile)
        .map_err(|e| OracleError::Unavailable(format!("Failed to encode profile: {}", e)))?;
    let candidate_json = serde_json::to_string(candidate)
        .map_err(|e| OracleError::Unavailable(format!("Failed to encode trial: {}", e)))?;

    Ok(format!(
        "You are an expert assistant specialized in clinical trial matching.\n\
         Analyze the patient against the trial criteria meticulously.\n\
         Think step-by-step comparing patient details (Age: {age}, Condition: {condition}, \
         Stage: {stage}, Biomarkers: {biomarkers}, Notes: {notes})\n\
         against trial criteria (Min Age: {min_age}, Max Age: {max_age}, Condition: {trial_condition}, \
         Biomarkers: {markers}, Key Inclusions: {inclusions}, Key Exclusions: {exclusions}).\n\
         Decision: Conclude if this is a 'Potential Match', 'Likely Not a Match', or 'Uncertain'.\n\
         Rationale: List specific points supporting a match.\n\
         Flags: List specific points against a match or needing review.\n\
         Output ONLY a JSON object with keys: \"decision\", \"reasoning_steps\", \"match_rationale\", \"flags\".\n\n\
         Patient Profile Snippet: {profile_json}\n\
         Trial Details Snippet: {candidate_json}\n\n\
         Perform the analysis and provide the JSON output:",
        age = profile.age,
        condition = profile.condition,
        stage = or_na(profile.stage.as_deref()),
        biomarkers = profile.biomarkers.join(", "),
        notes = or_na(profile.notes.as_deref()),
        min_age = or_na(candidate.min_age),
        max_age = or_na(candidate.max_age),
        trial_condition = candidate.condition,
        markers = candidate.required_markers.join(", "),
        inclusions = candidate.inclusions.join(", "),
        exclusions = candidate.exclusions.join(", "),
        profile_json = profile_json,
        candidate_json = candidate_json,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn profile() -> ProfileSnapshot {
        ProfileSnapshot {
            age: 65,
            condition: "Lung Cancer".to_string(),
            stage: Some("III".to_string()),
            biomarkers: vec!["EGFR+".to_string()],
            notes: Some("ECOG 1".to_string()),
        }
    }

    fn candidate() -> CandidateSnapshot {
        CandidateSnapshot {
            min_age: Some(50),
            max_age: None,
            condition: "Non-Small Cell Lung Cancer".to_string(),
            required_markers: vec!["EGFR+".to_string()],
            inclusions: vec!["Stage III or IV".to_string()],
            exclusions: vec!["Brain metastases".to_string()],
        }
    }

    fn oracle(endpoint: String) -> AzureOpenAiOracle {
        AzureOpenAiOracle::new(
            endpoint,
            "secret".to_string(),
            "gpt-4o".to_string(),
            "2024-02-01".to_string(),
            0.2,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_prompt_includes_evidence() {
        let prompt = build_prompt(&profile(), &candidate()).unwrap();
        assert!(prompt.contains("Age: 65"));
        assert!(prompt.contains("Max Age: N/A"));
        assert!(prompt.contains("Key Exclusions: Brain metastases"));
        assert!(prompt.contains("\"reasoning_steps\""));
    }

    #[test]
    fn test_parse_verdict_defaults_missing_lists() {
        let verdict = parse_verdict(r#"{"decision": "Uncertain"}"#).unwrap();
        assert_eq!(verdict.decision.as_deref(), Some("Uncertain"));
        assert!(verdict.flags.is_empty());
    }

    #[test]
    fn test_parse_verdict_rejects_prose() {
        assert!(matches!(
            parse_verdict("The patient looks eligible."),
            Err(OracleError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_evaluate_against_mock_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let content = r#"{"decision": "Potential Match", "reasoning_steps": ["Age ok"], "match_rationale": ["EGFR+"], "flags": ["Brain mets unknown"]}"#;
        let mock = server
            .mock("POST", "/openai/deployments/gpt-4o/chat/completions")
            .match_query(Matcher::UrlEncoded("api-version".into(), "2024-02-01".into()))
            .match_header("api-key", "secret")
            .with_status(200)
            .with_body(json!({"choices": [{"message": {"content": content}}]}).to_string())
            .create_async()
            .await;

        let verdict = oracle(server.url()).evaluate(&profile(), &candidate()).await.unwrap();

        assert_eq!(verdict.decision.as_deref(), Some("Potential Match"));
        assert_eq!(verdict.flags, vec!["Brain mets unknown"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_content_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/openai/deployments/gpt-4o/chat/completions")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"content": ""}}]}"#)
            .create_async()
            .await;

        let err = oracle(server.url()).evaluate(&profile(), &candidate()).await.unwrap_err();
        assert!(matches!(err, OracleError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/openai/deployments/gpt-4o/chat/completions")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let err = oracle(server.url()).evaluate(&profile(), &candidate()).await.unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(_)));
    }
}
