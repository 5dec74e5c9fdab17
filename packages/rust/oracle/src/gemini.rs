//! Gemini `generateContent` client.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

use tourledger_shared::{Result, SyncConfig, TourLedgerError};

use crate::Oracle;

/// User-Agent string for oracle requests.
const USER_AGENT: &str = concat!("tourledger/", env!("CARGO_PKG_VERSION"));

/// Longest error body echoed back in an error message.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct GeminiOracle {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default, rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(default, rename = "blockReason")]
    block_reason: Option<String>,
}

impl GeminiOracle {
    pub fn new(config: &SyncConfig, api_key: String) -> Result<Self> {
        let base = Url::parse(&config.oracle_base_url).map_err(|e| {
            TourLedgerError::config(format!("invalid oracle base_url {}: {e}", config.oracle_base_url))
        })?;
        let endpoint = base
            .join(&format!("v1beta/models/{}:generateContent", config.model))
            .map_err(|e| TourLedgerError::config(format!("invalid oracle model path: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.oracle_timeout_secs))
            .build()
            .map_err(|e| TourLedgerError::Oracle(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Oracle for GeminiOracle {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, prompt_chars = prompt.len()))]
    async fn complete(&self, instructions: &str, prompt: &str) -> Result<String> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": instructions }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TourLedgerError::Oracle(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(TourLedgerError::Oracle(format!("HTTP {status}: {snippet}")));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| TourLedgerError::Oracle(format!("unreadable response: {e}")))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            let reason = parsed
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".into());
            return Err(TourLedgerError::Oracle(format!("empty response: {reason}")));
        }

        debug!(chars = text.len(), "oracle responded");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourledger_shared::AppConfig;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn oracle_for(server: &MockServer) -> GeminiOracle {
        let mut config = SyncConfig::from(&AppConfig::default());
        config.oracle_base_url = format!("{}/", server.uri());
        GeminiOracle::new(&config, "test-key".into()).unwrap()
    }

    #[test]
    fn endpoint_includes_model() {
        let config = SyncConfig::from(&AppConfig::default());
        let oracle = GeminiOracle::new(&config, "k".into()).unwrap();
        assert!(
            oracle
                .endpoint()
                .as_str()
                .ends_with(&format!("/v1beta/models/{}:generateContent", config.model))
        );
    }

    #[tokio::test]
    async fn returns_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [
                        { "text": "```json\n[{\"building_name\": " },
                        { "text": "\"Fulbrix\"}]\n```" }
                    ]}
                }]
            })))
            .mount(&server)
            .await;

        let text = oracle_for(&server).complete("brief", "messages").await.unwrap();
        assert_eq!(text, "```json\n[{\"building_name\": \"Fulbrix\"}]\n```");
    }

    #[tokio::test]
    async fn http_error_is_oracle_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let err = oracle_for(&server).complete("brief", "messages").await.unwrap_err();
        assert!(matches!(err, TourLedgerError::Oracle(_)));
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn blocked_prompt_is_oracle_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let err = oracle_for(&server).complete("brief", "messages").await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
