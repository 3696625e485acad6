//! Language-model chat client for scoring and content review.
//!
//! Speaks the OpenAI chat-completions protocol with a JSON-object response
//! format hint; the `ChatModel` trait is the seam the scorer and quality
//! reviewer are written against.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{ExternalSystem, PipelineError};

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub base_url: String,
}

impl ChatConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            timeout: Duration::from_secs(60),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

/// Token accounting reported by the service.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One completed chat call.
#[derive(Debug, Clone)]
pub struct ChatOutput {
    pub content: String,
    pub usage: Option<ChatUsage>,
}

/// Unified chat interface so scoring logic can run against a stub.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Call the model with system + user prompts, expecting a JSON object
    /// back.
    async fn chat_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<ChatOutput, PipelineError>;

    /// Model name for logging and cost attribution.
    fn model_name(&self) -> &str;
}

/// OpenAI chat-completions client.
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    config: ChatConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatErrorResponse {
    error: ChatErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ChatErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

impl OpenAiChatClient {
    pub fn new(config: ChatConfig) -> Result<Self, PipelineError> {
        if config.api_key.is_empty() {
            return Err(PipelineError::validation(
                "chat_client",
                "model API key is empty",
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::external(ExternalSystem::Model, "chat_client", e))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    async fn chat_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<ChatOutput, PipelineError> {
        debug!(model = %self.config.model, "sending chat completion request");

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            max_tokens,
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::external(ExternalSystem::Model, "chat_completion", e))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| PipelineError::external(ExternalSystem::Model, "chat_completion", e))?;

        if !status.is_success() {
            error!("model API error: {} - {}", status, response_text);
            let detail = serde_json::from_str::<ChatErrorResponse>(&response_text)
                .map(|e| format!("{} ({})", e.error.message, e.error.error_type))
                .unwrap_or_else(|_| format!("HTTP {status}: {response_text}"));
            return Err(PipelineError::external(
                ExternalSystem::Model,
                "chat_completion",
                anyhow::anyhow!(detail),
            ));
        }

        let parsed: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| PipelineError::external(ExternalSystem::Model, "chat_completion", e))?;

        let Some(choice) = parsed.choices.into_iter().next() else {
            return Err(PipelineError::external(
                ExternalSystem::Model,
                "chat_completion",
                anyhow::anyhow!("no choices in response"),
            ));
        };

        if let Some(usage) = &parsed.usage {
            info!(
                model = %self.config.model,
                total_tokens = usage.total_tokens,
                "chat completion received"
            );
        }

        Ok(ChatOutput {
            content: choice.message.content,
            usage: parsed.usage,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server_uri: &str) -> OpenAiChatClient {
        let mut config = ChatConfig::new("test-key".to_string());
        config.base_url = server_uri.to_string();
        OpenAiChatClient::new(config).unwrap()
    }

    #[test]
    fn test_empty_api_key_is_rejected() {
        let err = OpenAiChatClient::new(ChatConfig::new(String::new())).unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[tokio::test]
    async fn test_chat_json_parses_content_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"score\": 90}"}}],
                "usage": {"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let output = client.chat_json("system", "user", 250).await.unwrap();
        assert_eq!(output.content, "{\"score\": 90}");
        assert_eq!(output.usage.unwrap().total_tokens, 120);
    }

    #[tokio::test]
    async fn test_error_body_is_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "quota exhausted", "type": "rate_limit_exceeded"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let err = client.chat_json("system", "user", 250).await.unwrap_err();
        let text = format!("{err:#}");
        assert!(err.is_external());
        assert!(text.contains("chat_completion"));
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let err = client.chat_json("system", "user", 250).await.unwrap_err();
        assert!(err.is_external());
    }
}
