//! Error handling for the analysis pipeline.
//!
//! Every stage wraps its own failures with a stage label before propagating.
//! The orchestrator routes errors to response shapes but never rewrites their
//! semantics, so the `stage()` label a caller observes always names the stage
//! that actually failed.

use thiserror::Error;

/// Main error type for the analysis pipeline
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("context construction failed: {0}")]
    Context(String),

    #[error("intent classification failed: {0}")]
    Intent(String),

    #[error("{0}")]
    Plan(String),

    #[error("sql synthesis failed: {0}")]
    SqlSynth(String),

    #[error("execution failed: {message}")]
    Exec {
        message: String,
        code: Option<String>,
    },

    #[error("unknown or expired session")]
    SessionMissing,

    #[error("llm transport failure: {0}")]
    LlmTransport(String),

    #[error("llm call exceeded its deadline")]
    LlmTimeout,

    #[error("llm quota exhausted: {0}")]
    LlmQuota(String),

    #[error("llm returned an empty response")]
    LlmEmpty,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Stage label surfaced in error responses.
    pub fn stage(&self) -> &'static str {
        match self {
            AgentError::Context(_) => "context",
            AgentError::Intent(_) => "intent",
            AgentError::Plan(_) => "plan",
            AgentError::SqlSynth(_) => "sql_synth",
            AgentError::Exec { .. } => "exec",
            AgentError::SessionMissing => "session_missing",
            AgentError::LlmTransport(_) => "llm_transport",
            AgentError::LlmTimeout => "llm_timeout",
            AgentError::LlmQuota(_) => "llm_quota",
            AgentError::LlmEmpty => "llm_empty",
            AgentError::Config(_) => "config",
            AgentError::Store(_) => "store",
            AgentError::Io(_) => "io",
            AgentError::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels() {
        assert_eq!(AgentError::Context("x".into()).stage(), "context");
        assert_eq!(AgentError::Plan("x".into()).stage(), "plan");
        assert_eq!(AgentError::LlmTimeout.stage(), "llm_timeout");
        assert_eq!(AgentError::SessionMissing.stage(), "session_missing");
    }

    #[test]
    fn test_plan_error_carries_rationale_verbatim() {
        let err = AgentError::Plan("the products table does not exist".into());
        assert_eq!(err.to_string(), "the products table does not exist");
    }
}
