//! Gemini API client for narrative matchup analysis.

use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::AnalysisConfig;

/// Failure of a single generation call.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The service is throttling us; worth retrying after a pause.
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// A text generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, GenerationError>;
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
    temperature: f32,
    search_grounding: bool,
}

impl GeminiClient {
    pub fn new(config: &AnalysisConfig, api_key: Option<SecretString>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .context("Failed to create Gemini HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            search_grounding: config.search_grounding,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(&self.model)
        )
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    #[instrument(skip(self, system_prompt, user_prompt), fields(model = %self.model))]
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GenerationError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("GEMINI_API_KEY is not configured"))?;

        let request = GenerateRequest {
            system_instruction: Some(Content::text(None, system_prompt)),
            contents: vec![Content::text(Some("user"), user_prompt)],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
            tools: self
                .search_grounding
                .then(|| vec![serde_json::json!({ "google_search": {} })]),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .context("Gemini API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &error_body));
        }

        let api_response: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse Gemini API response")?;

        let text = api_response.text();
        if text.trim().is_empty() {
            return Err(anyhow!("Gemini returned no text").into());
        }

        if let Some(usage) = &api_response.usage_metadata {
            info!(
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "Gemini API call completed"
            );
        }

        Ok(text)
    }
}

/// Map a non-success response to a generation error. Throttling shows up as
/// HTTP 429 or as a quota/RESOURCE_EXHAUSTED message under another status.
pub fn classify_failure(status: reqwest::StatusCode, body: &str) -> GenerationError {
    let lowered = body.to_lowercase();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || lowered.contains("quota")
        || lowered.contains("resource_exhausted")
    {
        GenerationError::RateLimited(format!("Gemini API {status}"))
    } else {
        GenerationError::Failed(anyhow!("Gemini API error ({}): {}", status, body))
    }
}

// --- Request/Response Types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

impl GenerateResponse {
    /// Text parts of the first candidate, concatenated.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<&str>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: i64,
    #[serde(default)]
    candidates_token_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> AnalysisConfig {
        AnalysisConfig {
            api_base_url: base_url.to_string(),
            model: "gemini-test".to_string(),
            temperature: 0.7,
            search_grounding: false,
            request_timeout_seconds: 5,
            max_attempts: 2,
            retry_delay_seconds: 0,
        }
    }

    fn key() -> Option<SecretString> {
        Some(SecretString::from("test-key"))
    }

    #[test]
    fn test_classify_429_is_rate_limited() {
        let err = classify_failure(reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, GenerationError::RateLimited(_)));
    }

    #[test]
    fn test_classify_quota_message_is_rate_limited() {
        let err = classify_failure(
            reqwest::StatusCode::FORBIDDEN,
            r#"{"error":{"status":"RESOURCE_EXHAUSTED","message":"Quota exceeded"}}"#,
        );
        assert!(matches!(err, GenerationError::RateLimited(_)));
    }

    #[test]
    fn test_classify_other_errors_fail() {
        let err = classify_failure(reqwest::StatusCode::BAD_REQUEST, "invalid argument");
        match err {
            GenerationError::Failed(e) => assert!(e.to_string().contains("invalid argument")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_joins_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}],
                "generationConfig": {"temperature": 0.7}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Take the "}, {"text": "over."}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config(&server.uri()), key()).unwrap();
        let text = client.generate("system", "hello").await.unwrap();
        assert_eq!(text, "Take the over.");
    }

    fn candidate_response() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "Lean over."}]}}]
        }))
    }

    #[tokio::test]
    async fn test_search_grounding_sends_google_search_tool() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"tools": [{"google_search": {}}]})))
            .respond_with(candidate_response())
            .expect(1)
            .mount(&server)
            .await;

        let grounded = AnalysisConfig {
            search_grounding: true,
            ..config(&server.uri())
        };
        let client = GeminiClient::new(&grounded, key()).unwrap();
        assert_eq!(client.generate("system", "hello").await.unwrap(), "Lean over.");
    }

    #[tokio::test]
    async fn test_no_tools_without_search_grounding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(candidate_response())
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config(&server.uri()), key()).unwrap();
        client.generate("system", "hello").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = requests[0].body_json().unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("systemInstruction").is_some());
    }

    #[tokio::test]
    async fn test_generate_maps_429() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config(&server.uri()), key()).unwrap();
        let err = client.generate("system", "hello").await.unwrap_err();
        assert!(matches!(err, GenerationError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_generate_empty_candidates_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config(&server.uri()), key()).unwrap();
        let err = client.generate("system", "hello").await.unwrap_err();
        assert!(matches!(err, GenerationError::Failed(_)));
    }

    #[tokio::test]
    async fn test_generate_without_key_fails() {
        let client = GeminiClient::new(&config("http://127.0.0.1:9"), None).unwrap();
        let err = client.generate("system", "hello").await.unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
