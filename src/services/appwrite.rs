use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::core::sources::{ProfileSource, ProfileSourceError};
use crate::models::PatientProfile;

/// Errors that can occur when interacting with Appwrite
#[derive(Debug, Error)]
pub enum AppwriteError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: invalid API key or token")]
    Unauthorized,

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

impl From<AppwriteError> for ProfileSourceError {
    fn from(err: AppwriteError) -> Self {
        match err {
            AppwriteError::NotFound(message) => ProfileSourceError::NotFound(message),
            rejected @ (AppwriteError::Unauthorized
            | AppwriteError::Rejected(_)
            | AppwriteError::InvalidResponse(_)) => ProfileSourceError::Rejected(rejected.to_string()),
            other @ (AppwriteError::RequestError(_) | AppwriteError::ApiError(_)) => {
                ProfileSourceError::Unavailable(other.to_string())
            }
        }
    }
}

/// Appwrite API client for the patient registry
///
/// Patients are stored as documents in a single collection, keyed by `patientId`.
pub struct AppwriteClient {
    base_url: String,
    api_key: String,
    project_id: String,
    database_id: String,
    patients_collection: String,
    client: Client,
}

impl AppwriteClient {
    /// Create a new Appwrite client
    pub fn new(
        base_url: String,
        api_key: String,
        project_id: String,
        database_id: String,
        patients_collection: String,
        timeout: Duration,
    ) -> Result<Self, AppwriteError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key,
            project_id,
            database_id,
            patients_collection,
            client,
        })
    }

    /// Get a single patient profile by ID
    pub async fn get_patient(&self, patient_id: &str) -> Result<PatientProfile, AppwriteError> {
        // Appwrite query format: JSON array of query strings
        let id_literal = serde_json::to_string(patient_id)
            .map_err(|e| AppwriteError::Rejected(e.to_string()))?;
        let query_json = serde_json::to_string(&[format!("equal(\"patientId\", [{}])", id_literal)])
            .map_err(|e| AppwriteError::Rejected(e.to_string()))?;
        let encoded_query = urlencoding::encode(&query_json);

        let url = format!(
            "{}/databases/{}/collections/{}/documents?queries[]={}",
            self.base_url.trim_end_matches('/'),
            self.database_id,
            self.patients_collection,
            encoded_query
        );

        tracing::debug!("Fetching patient profile: {}", patient_id);

        let response = self
            .client
            .get(&url)
            .header("X-Appwrite-Key", &self.api_key)
            .header("X-Appwrite-Project", &self.project_id)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AppwriteError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unable to read body".to_string());
            tracing::error!("Failed to fetch patient {}: {} - {}", patient_id, status, body);
            let message = format!("Failed to fetch patient: {}", status);
            return Err(if is_retryable_status(status) {
                AppwriteError::ApiError(message)
            } else {
                AppwriteError::Rejected(message)
            });
        }

        let json: Value = response.json().await?;

        let documents = json
            .get("documents")
            .and_then(|d| d.as_array())
            .ok_or_else(|| AppwriteError::InvalidResponse("Missing documents array".into()))?;

        let doc = documents
            .first()
            .ok_or_else(|| AppwriteError::NotFound(format!("Patient {} not found", patient_id)))?;

        let data = doc.get("data").unwrap_or(doc);

        serde_json::from_value(data.clone())
            .map_err(|e| AppwriteError::InvalidResponse(format!("Failed to parse patient: {}", e)))
    }
}

/// Server faults, timeouts and throttling may clear up; other client errors will not
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error()
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl ProfileSource for AppwriteClient {
    async fn fetch(&self, patient_id: &str) -> Result<PatientProfile, ProfileSourceError> {
        Ok(self.get_patient(patient_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::retry::Retryable;
    use crate::core::{PipelineOptions, TrialMatcher};
    use crate::error::ErrorKind;
    use crate::services::{AzureOpenAiOracle, FixtureCatalog};
    use mockito::Matcher;
    use std::sync::Arc;

    fn client(base_url: String) -> AppwriteClient {
        AppwriteClient::new(
            base_url,
            "test_key".to_string(),
            "test_project".to_string(),
            "test_db".to_string(),
            "patients".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_patient() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/databases/test_db/collections/patients/documents")
            .match_query(Matcher::Any)
            .match_header("X-Appwrite-Key", "test_key")
            .with_status(200)
            .with_body(
                r#"{"total": 1, "documents": [{"$id": "doc1", "patientId": "PATIENT_002",
                    "condition": "Breast Cancer", "stage": "II", "age": 52,
                    "priorTherapies": [], "biomarkers": ["HER2+"]}]}"#,
            )
            .create_async()
            .await;

        let profile = client(server.url()).fetch("PATIENT_002").await.unwrap();

        assert_eq!(profile.condition, "Breast Cancer");
        assert!(profile.biomarkers.contains("HER2+"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_documents_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/databases/test_db/collections/patients/documents")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"total": 0, "documents": []}"#)
            .create_async()
            .await;

        let err = client(server.url()).fetch("PATIENT_X").await.unwrap_err();
        assert!(matches!(err, ProfileSourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/databases/test_db/collections/patients/documents")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = client(server.url()).fetch("PATIENT_001").await.unwrap_err();
        assert!(matches!(err, ProfileSourceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_bad_request_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/databases/test_db/collections/patients/documents")
            .match_query(Matcher::Any)
            .with_status(400)
            .create_async()
            .await;

        let err = client(server.url()).fetch("PATIENT_001").await.unwrap_err();
        assert!(matches!(err, ProfileSourceError::Rejected(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_unauthorized_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/databases/test_db/collections/patients/documents")
            .match_query(Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let err = client(server.url()).fetch("PATIENT_001").await.unwrap_err();
        assert!(matches!(err, ProfileSourceError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_throttling_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/databases/test_db/collections/patients/documents")
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let err = client(server.url()).fetch("PATIENT_001").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_rejected_fetch_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/databases/test_db/collections/patients/documents")
            .match_query(Matcher::Any)
            .with_status(400)
            .expect(1)
            .create_async()
            .await;

        let oracle = AzureOpenAiOracle::new(
            "http://127.0.0.1:9".to_string(),
            "unused".to_string(),
            "gpt-4o".to_string(),
            "2024-02-01".to_string(),
            0.0,
            Duration::from_secs(1),
        )
        .unwrap();
        let matcher = TrialMatcher::new(
            Arc::new(client(server.url())),
            Arc::new(FixtureCatalog::demo()),
            Arc::new(oracle),
            PipelineOptions::default(),
        );

        let err = matcher.run_matching("A\"B", false).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::ProfileFetchFailed);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_patient_id_is_escaped_in_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/databases/test_db/collections/patients/documents")
            .match_query(Matcher::UrlEncoded(
                "queries[]".to_string(),
                r#"["equal(\"patientId\", [\"A\\\"B\"])"]"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"total": 0, "documents": []}"#)
            .create_async()
            .await;

        let err = client(server.url()).fetch("A\"B").await.unwrap_err();

        assert!(matches!(err, ProfileSourceError::NotFound(_)));
        mock.assert_async().await;
    }
}
