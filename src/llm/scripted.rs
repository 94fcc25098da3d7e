//! Scripted LLM double for tests and offline runs.
//!
//! Responses are consumed in order, which matches the strictly sequential
//! pipeline: one scripted entry per LLM round-trip. Failures can be queued
//! ahead of the responses to exercise the gateway's retry policy.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::client::{ChatMessage, LlmClient, LlmError};

enum Scripted {
    Text(String),
    Failure(LlmError),
}

/// Deterministic, order-driven LLM client
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Scripted>>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            script: Mutex::new(
                responses
                    .into_iter()
                    .map(|r| Scripted::Text(r.to_string()))
                    .collect(),
            ),
        }
    }

    /// Queue a failure ahead of the remaining responses.
    pub async fn push_failure(&self, error: LlmError) {
        self.script.lock().await.push_front(Scripted::Failure(error));
    }

    /// Append another response to the script.
    pub async fn push_response(&self, response: &str) {
        self.script
            .lock()
            .await
            .push_back(Scripted::Text(response.to_string()));
    }

    pub async fn remaining(&self) -> usize {
        self.script.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(&self, _system: &str, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        match self.script.lock().await.pop_front() {
            Some(Scripted::Text(text)) => Ok(text),
            Some(Scripted::Failure(err)) => Err(err),
            None => Err(LlmError::Transport("script exhausted".into())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn provider_name(&self) -> &str {
        "Scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_responses_in_order() {
        let llm = ScriptedLlm::new(vec!["a", "b"]);
        assert_eq!(llm.chat("s", &[]).await.unwrap(), "a");
        assert_eq!(llm.chat("s", &[]).await.unwrap(), "b");
        assert!(llm.chat("s", &[]).await.is_err());
    }
}
