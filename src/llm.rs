//! Reasoning collaborator
//!
//! Every agent stage talks to the hosted LLM through [`ReasoningClient`]:
//! text in, text out, may fail. The Gemini implementation keeps one
//! long-lived `reqwest::Client` for connection pooling and applies the
//! configured timeout to each call. Calls are never retried.

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Opaque text-generation collaborator
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> crate::Result<String>;
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(config: &MonitorConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(config.llm_timeout)
            .build()?;

        Ok(Self {
            client,
            api_key: config.gemini_api_key.clone(),
            endpoint: format!(
                "{}/{}:generateContent",
                config.gemini_base_url.trim_end_matches('/'),
                config.gemini_model
            ),
        })
    }
}

#[async_trait]
impl ReasoningClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(MonitorError::CollaboratorError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 4096,
            },
        };

        info!(prompt_chars = prompt.len(), "Calling Gemini API");

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                MonitorError::CollaboratorError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(MonitorError::CollaboratorError(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            MonitorError::CollaboratorError(format!("Gemini parse error: {}", e))
        })?;

        let text = gemini_response.into_text().ok_or_else(|| {
            MonitorError::CollaboratorError("Empty response from Gemini".to_string())
        })?;

        info!(response_chars = text.len(), "Gemini response received");

        Ok(text)
    }
}

/// Stand-in used when no API key is configured; every call fails, so each
/// stage takes its call-failure path.
pub struct UnavailableReasoner {
    reason: String,
}

impl UnavailableReasoner {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ReasoningClient for UnavailableReasoner {
    async fn generate(&self, _prompt: &str) -> crate::Result<String> {
        Err(MonitorError::CollaboratorError(self.reason.clone()))
    }
}

/// Pick the Gemini client when a key is present, otherwise the unavailable stub
pub fn client_from_config(config: &MonitorConfig) -> crate::Result<std::sync::Arc<dyn ReasoningClient>> {
    if config.has_api_key() {
        Ok(std::sync::Arc::new(GeminiClient::new(config)?))
    } else {
        Ok(std::sync::Arc::new(UnavailableReasoner::new(
            "GEMINI_API_KEY not configured",
        )))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate, if it has any
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: "Rate this liquidity position".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 4096,
            },
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("Rate this liquidity position"));
        assert!(json.contains("generationConfig"));
        assert!(json.contains("maxOutputTokens"));
    }

    #[test]
    fn test_response_text_extraction() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"part one "},{"text":"part two"}]},"finishReason":"STOP"}]}"#;
        let response: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.into_text().as_deref(), Some("part one part two"));

        let empty: GeminiResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(empty.into_text().is_none());
    }

    #[tokio::test]
    async fn test_missing_key_is_collaborator_error() {
        let client = GeminiClient::new(&MonitorConfig::default()).unwrap();
        let result = client.generate("hello").await;
        assert!(matches!(result, Err(MonitorError::CollaboratorError(_))));
    }

    #[tokio::test]
    async fn test_unavailable_reasoner_always_fails() {
        let reasoner = UnavailableReasoner::new("offline");
        let result = reasoner.generate("anything").await;
        assert!(matches!(result, Err(MonitorError::CollaboratorError(msg)) if msg == "offline"));
    }
}
