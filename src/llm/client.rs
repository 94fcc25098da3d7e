//! Provider-agnostic LLM client trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A single message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Provider-level failure, classified for the gateway's retry policy
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Network or provider error; retryable
    #[error("transport: {0}")]
    Transport(String),

    /// Rate limit or quota exhaustion; retryable with backoff
    #[error("quota: {0}")]
    Quota(String),

    /// The provider returned no usable text; not retryable
    #[error("empty response")]
    Empty,
}

/// Unified text-in/text-out interface over LLM providers
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a system prompt plus conversation messages, return the raw text.
    async fn chat(&self, system: &str, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Model name for logging
    fn model_name(&self) -> &str;

    /// Provider name for logging
    fn provider_name(&self) -> &str;
}
