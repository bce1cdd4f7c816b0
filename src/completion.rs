//! Chat-completion client used by the extractor
//!
//! Speaks the OpenAI-compatible `/chat/completions` protocol.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::config::ExtractorConfig;
use crate::error::AdvisorError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const SERVICE_NAME: &str = "completion service";

/// One message sent to the completion service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
}

impl CompletionMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// External text-completion service
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Return the raw text of a single completion expected to hold JSON
    async fn complete_json(
        &self,
        messages: Vec<CompletionMessage>,
        config: &ExtractorConfig,
    ) -> crate::Result<String>;
}

/// Reusable completion client (connection-pooled)
pub struct OpenAiCompletionClient {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiCompletionClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionClient {
    async fn complete_json(
        &self,
        messages: Vec<CompletionMessage>,
        config: &ExtractorConfig,
    ) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(AdvisorError::Config(
                "OPENAI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatCompletionRequest {
            model: &config.model,
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        info!(model = %config.model, "Calling completion service");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!("Completion request timed out: {}", e);
                    AdvisorError::ExternalServiceTimeout {
                        service: SERVICE_NAME,
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    error!("Completion request failed: {}", e);
                    AdvisorError::Completion(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Completion error response: {}", error_text);
            return Err(AdvisorError::Completion(format!(
                "service returned {}",
                status
            )));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                AdvisorError::ExternalServiceTimeout {
                    service: SERVICE_NAME,
                    seconds: self.timeout.as_secs(),
                }
            } else {
                error!("Failed to parse completion response: {}", e);
                AdvisorError::ExtractionFormat(format!("unreadable completion envelope: {}", e))
            }
        })?;

        if let Some(usage) = &body.usage {
            info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion received"
            );
        }

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AdvisorError::ExtractionFormat("empty completion".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str, timeout: Duration) -> OpenAiCompletionClient {
        OpenAiCompletionClient::new("sk-test".to_string(), base_url.to_string(), timeout).unwrap()
    }

    fn messages() -> Vec<CompletionMessage> {
        vec![
            CompletionMessage::new("system", "extract spends"),
            CompletionMessage::new("user", "I pay 20k rent"),
        ]
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatCompletionRequest {
            model: "gpt-4o-mini",
            messages: messages(),
            temperature: 0.7,
            max_tokens: 500,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["response_format"], json!({ "type": "json_object" }));
        assert_eq!(value["messages"][1]["content"], json!("I pay 20k rent"));
    }

    #[tokio::test]
    async fn test_complete_json_returns_content() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "gpt-4-0125-preview", "max_tokens": 500 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "{\"message\":\"hi\"}" } }],
                "usage": { "prompt_tokens": 120, "completion_tokens": 12 }
            })))
            .mount(&server)
            .await;

        let text = client(&server.uri(), Duration::from_secs(5))
            .complete_json(messages(), &ExtractorConfig::default())
            .await
            .unwrap();
        assert_eq!(text, "{\"message\":\"hi\"}");
    }

    #[tokio::test]
    async fn test_error_status_is_completion_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "bad key" })))
            .mount(&server)
            .await;

        let err = client(&server.uri(), Duration::from_secs(5))
            .complete_json(messages(), &ExtractorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AdvisorError::Completion(_)));
    }

    #[tokio::test]
    async fn test_empty_choices_is_format_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = client(&server.uri(), Duration::from_secs(5))
            .complete_json(messages(), &ExtractorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AdvisorError::ExtractionFormat(_)));
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "choices": [] }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = client(&server.uri(), Duration::from_millis(200))
            .complete_json(messages(), &ExtractorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AdvisorError::ExternalServiceTimeout { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = OpenAiCompletionClient::new(
            String::new(),
            DEFAULT_BASE.to_string(),
            Duration::from_secs(1),
        )
        .unwrap();

        let err = client
            .complete_json(messages(), &ExtractorConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    const DEFAULT_BASE: &str = crate::config::DEFAULT_COMPLETION_BASE_URL;
}
