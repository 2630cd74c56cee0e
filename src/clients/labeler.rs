//! HTTP client for the external generative labeling model, mirroring the
//! lineage's raw-value-then-schema-then-typed-deserialize call pattern
//! (`clients::news_creator::client::generate_summary`).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::schema::{labeler::response_schema, validate_json};
use crate::util::retry::{RetryConfig, is_retryable_error};

const MAX_SUMMARY_WORDS: usize = 30;

#[derive(Debug, Error)]
pub enum LabelerError {
    #[error("request to labeling model failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("labeling model returned status {0}")]
    Status(StatusCode),
    #[error("labeling model response failed schema validation: {0:?}")]
    SchemaInvalid(Vec<String>),
    #[error("labeling model summary exceeded {MAX_SUMMARY_WORDS} words ({0})")]
    SummaryTooLong(usize),
    #[error("labeling model response could not be parsed: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LabelerResponse {
    pub headline: String,
    pub summary: String,
    pub category: String,
}

#[derive(Debug, Serialize)]
struct LabelerRequest<'a> {
    prompt: &'a str,
}

/// Thin wrapper over `reqwest::Client` with per-request timeout, bearer
/// auth, and exponential-backoff retry for transient failures.
#[derive(Debug, Clone)]
pub struct LabelerClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl LabelerClient {
    #[must_use]
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
        max_retries: usize,
        backoff_base_ms: u64,
        backoff_cap_ms: u64,
    ) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        let retry = RetryConfig::new(max_retries, backoff_base_ms, backoff_cap_ms);
        Self { http, base_url, api_key, retry }
    }

    /// Sends `prompt` to the labeling model and validates the response
    /// against the labeler response schema before deserializing it.
    pub async fn label(&self, prompt: &str) -> Result<LabelerResponse, LabelerError> {
        let mut attempt = 0;
        loop {
            match self.try_label(prompt).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    let retryable = matches!(&error, LabelerError::Transport(e) if is_retryable_error(e))
                        || matches!(&error, LabelerError::Status(s) if s.is_server_error() || *s == StatusCode::TOO_MANY_REQUESTS);
                    if !retryable || !self.retry.can_retry(attempt + 1) {
                        return Err(error);
                    }
                    warn!(attempt, error = %error, "retrying labeler call");
                    attempt += 1;
                    tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                }
            }
        }
    }

    async fn try_label(&self, prompt: &str) -> Result<LabelerResponse, LabelerError> {
        let mut request = self
            .http
            .post(format!("{}/label", self.base_url.trim_end_matches('/')))
            .json(&LabelerRequest { prompt });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(LabelerError::Status(response.status()));
        }

        let raw: Value = response.json().await?;
        let validation = validate_json(&response_schema(), &raw);
        if !validation.valid {
            return Err(LabelerError::SchemaInvalid(validation.errors));
        }

        let parsed: LabelerResponse = serde_json::from_value(raw)?;
        let word_count = parsed.summary.split_whitespace().count();
        if word_count > MAX_SUMMARY_WORDS {
            return Err(LabelerError::SummaryTooLong(word_count));
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: String) -> LabelerClient {
        LabelerClient::new(base_url, None, Duration::from_secs(5), 2, 1, 5)
    }

    #[tokio::test]
    async fn label_parses_valid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/label"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "headline": "Parliament passes bill",
                "summary": "The bill passed after debate.",
                "category": "Politics"
            })))
            .mount(&server)
            .await;

        let result = client(server.uri()).label("summarize these headlines").await;

        let response = result.expect("labeler call should succeed");
        assert_eq!(response.headline, "Parliament passes bill");
        assert_eq!(response.category, "Politics");
    }

    #[tokio::test]
    async fn label_rejects_response_missing_required_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/label"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "headline": "oops" })),
            )
            .mount(&server)
            .await;

        let result = client(server.uri()).label("summarize these headlines").await;

        assert!(matches!(result, Err(LabelerError::SchemaInvalid(_))));
    }

    #[tokio::test]
    async fn label_surfaces_non_success_status_without_retry_budget() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/label"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let result = client(server.uri()).label("summarize these headlines").await;

        assert!(matches!(result, Err(LabelerError::Status(StatusCode::BAD_REQUEST))));
    }
}
