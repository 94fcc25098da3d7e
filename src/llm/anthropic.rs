//! Anthropic Claude client.

use async_trait::async_trait;
use serde::Deserialize;

use super::client::{ChatMessage, ChatRole, LlmClient, LlmError};

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic messages API client
#[derive(Clone)]
pub struct AnthropicClient {
    api_key: String,
    client: reqwest::Client,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat(&self, system: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let payload: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        ChatRole::User => "user",
                        ChatRole::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "model": &self.model,
                "max_tokens": 4096,
                "system": system,
                "messages": payload,
            }))
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Quota(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Transport(format!(
                "Anthropic API error {status}: {body}"
            )));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        api_response
            .content
            .first()
            .and_then(|c| c.text.clone())
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::Empty)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "Anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model() {
        let client = AnthropicClient::new("test-key".to_string(), None);
        assert_eq!(client.model_name(), DEFAULT_MODEL);
        assert_eq!(client.provider_name(), "Anthropic");
    }

    #[test]
    fn test_model_override() {
        let client = AnthropicClient::new("test-key".to_string(), Some("claude-3-opus".into()));
        assert_eq!(client.model_name(), "claude-3-opus");
    }
}
