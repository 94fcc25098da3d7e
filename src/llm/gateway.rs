//! LLM gateway: the single choke point for text completions.
//!
//! Owns bounded retry with exponential backoff, the hard per-call timeout,
//! optional per-session conversation memory, markdown fence stripping, and a
//! semaphore bounding in-flight provider calls so a burst of turns cannot
//! cascade into provider-side timeout failures.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};
use uuid::Uuid;

use super::client::{ChatMessage, LlmClient, LlmError};
use crate::error::{AgentError, Result};

/// Hard cap on a single provider call
const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Total time allowed across retries of one completion
const RETRY_BUDGET: Duration = Duration::from_secs(30);

/// Attempts per completion
const MAX_ATTEMPTS: u32 = 3;

/// Initial backoff delay, doubled per retry
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Messages kept per session (8 user/assistant turns)
const MEMORY_LIMIT: usize = 16;

/// Default bound on concurrent provider calls
const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// The pipeline's only route to the LLM provider
pub struct LlmGateway {
    client: Arc<dyn LlmClient>,
    limiter: Semaphore,
    memory: RwLock<HashMap<Uuid, VecDeque<ChatMessage>>>,
    call_timeout: Duration,
}

impl LlmGateway {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self::with_limits(client, DEFAULT_MAX_IN_FLIGHT, CALL_TIMEOUT)
    }

    pub fn with_limits(
        client: Arc<dyn LlmClient>,
        max_in_flight: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            client,
            limiter: Semaphore::new(max_in_flight),
            memory: RwLock::new(HashMap::new()),
            call_timeout,
        }
    }

    /// Complete a prompt, optionally threading per-session memory.
    ///
    /// When `session` is given, the last turns of that session's conversation
    /// are prepended to the outgoing message list and the exchange is
    /// recorded afterwards. Memory is never persisted and dies with the
    /// session. Returned text has markdown fences stripped.
    pub async fn complete(
        &self,
        session: Option<Uuid>,
        system: &str,
        prompt: &str,
    ) -> Result<String> {
        let mut messages: Vec<ChatMessage> = match session {
            Some(id) => {
                let memory = self.memory.read().await;
                memory
                    .get(&id)
                    .map(|turns| turns.iter().cloned().collect())
                    .unwrap_or_default()
            }
            None => Vec::new(),
        };
        messages.push(ChatMessage::user(prompt));

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| AgentError::LlmTransport(e.to_string()))?;

        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0u32;
        let text = loop {
            attempt += 1;
            let call = self.client.chat(system, &messages);
            match tokio::time::timeout(self.call_timeout, call).await {
                Ok(Ok(text)) => break text,
                Ok(Err(err)) => {
                    let retryable = matches!(err, LlmError::Transport(_) | LlmError::Quota(_));
                    let budget_left = started.elapsed() + backoff < RETRY_BUDGET;
                    if retryable && attempt < MAX_ATTEMPTS && budget_left {
                        warn!(
                            provider = self.client.provider_name(),
                            attempt, error = %err, "llm call failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                        continue;
                    }
                    return Err(match err {
                        LlmError::Transport(msg) => AgentError::LlmTransport(msg),
                        LlmError::Quota(msg) => AgentError::LlmQuota(msg),
                        LlmError::Empty => AgentError::LlmEmpty,
                    });
                }
                Err(_) => return Err(AgentError::LlmTimeout),
            }
        };

        let text = strip_code_fences(&text);
        if text.is_empty() {
            return Err(AgentError::LlmEmpty);
        }
        debug!(
            provider = self.client.provider_name(),
            model = self.client.model_name(),
            chars = text.len(),
            "llm completion"
        );

        if let Some(id) = session {
            let mut memory = self.memory.write().await;
            let turns = memory.entry(id).or_default();
            turns.push_back(ChatMessage::user(prompt));
            turns.push_back(ChatMessage::assistant(text.clone()));
            while turns.len() > MEMORY_LIMIT {
                turns.pop_front();
            }
        }

        Ok(text)
    }

    /// Drop a session's conversation memory.
    pub async fn forget(&self, session: Uuid) {
        self.memory.write().await.remove(&session);
    }

    /// Number of sessions with live memory, for diagnostics.
    pub async fn memory_sessions(&self) -> usize {
        self.memory.read().await.len()
    }
}

/// Strip surrounding markdown code fences (``` or ```sql style) from a
/// completion, leaving the inner text.
pub fn strip_code_fences(text: &str) -> String {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix("```") {
        // Drop the language tag on the opening fence, then the closing fence
        let inner = match inner.split_once('\n') {
            Some((_tag, rest)) => rest,
            None => inner,
        };
        let inner = inner.strip_suffix("```").unwrap_or(inner);
        return inner.trim().to_string();
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedLlm;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(
            strip_code_fences("```sql\nSELECT 1\n```"),
            "SELECT 1"
        );
        assert_eq!(strip_code_fences("```\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fences("SELECT 1"), "SELECT 1");
        assert_eq!(strip_code_fences("  SELECT 1  "), "SELECT 1");
    }

    #[tokio::test]
    async fn test_complete_passes_text_through() {
        let gateway = LlmGateway::new(Arc::new(ScriptedLlm::new(vec!["hello"])));
        let text = gateway.complete(None, "system", "prompt").await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let llm = ScriptedLlm::new(vec!["recovered"]);
        llm.push_failure(LlmError::Transport("connection reset".into()))
            .await;
        let gateway = LlmGateway::new(Arc::new(llm));
        let text = gateway.complete(None, "system", "prompt").await.unwrap();
        assert_eq!(text, "recovered");
    }

    #[tokio::test]
    async fn test_empty_is_not_retried() {
        let llm = ScriptedLlm::new(vec!["never reached"]);
        llm.push_failure(LlmError::Empty).await;
        let gateway = LlmGateway::new(Arc::new(llm));
        let err = gateway.complete(None, "system", "prompt").await.unwrap_err();
        assert_eq!(err.stage(), "llm_empty");
    }

    #[tokio::test]
    async fn test_session_memory_recorded_and_forgotten() {
        let gateway = LlmGateway::new(Arc::new(ScriptedLlm::new(vec!["one", "two"])));
        let session = Uuid::new_v4();
        gateway
            .complete(Some(session), "system", "first")
            .await
            .unwrap();
        assert_eq!(gateway.memory_sessions().await, 1);
        gateway
            .complete(Some(session), "system", "second")
            .await
            .unwrap();
        gateway.forget(session).await;
        assert_eq!(gateway.memory_sessions().await, 0);
    }
}
