//! Environment-driven configuration.
//!
//! Everything is read once at startup. `LLM_API_KEY` and `DATABASE_URL` are
//! required; the rest have defaults suitable for local development.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::llm::factory::LlmBackend;

/// Default session time-to-live in seconds (15 minutes)
const DEFAULT_SESSION_TTL_SECONDS: u64 = 900;

/// Application configuration assembled from environment variables
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// API key for the selected LLM provider
    pub llm_api_key: String,
    /// Which LLM provider to use (LLM_BACKEND: anthropic | openai)
    pub llm_backend: LlmBackend,
    /// Model override; each provider has its own default
    pub llm_model: Option<String>,
    /// Store connection string
    pub database_url: String,
    /// Soft expiry for pending sessions
    pub session_ttl: Duration,
    /// Address the HTTP server binds to
    pub bind_addr: String,
    /// Schema description file (source of truth for tables and columns)
    pub schema_path: PathBuf,
    /// Optional per-column annotations from the offline profiler
    pub annotations_path: Option<PathBuf>,
}

impl AppConfig {
    /// Read configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let llm_api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| AgentError::Config("LLM_API_KEY is required but not set".into()))?;
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AgentError::Config("DATABASE_URL is required but not set".into()))?;

        let llm_backend = match std::env::var("LLM_BACKEND") {
            Ok(value) => value
                .parse::<LlmBackend>()
                .map_err(|e| AgentError::Config(e.to_string()))?,
            Err(_) => LlmBackend::default(),
        };

        let session_ttl = std::env::var("SESSION_TTL_SECONDS")
            .ok()
            .map(|v| {
                v.parse::<u64>().map_err(|_| {
                    AgentError::Config(format!("SESSION_TTL_SECONDS is not a number: {v}"))
                })
            })
            .transpose()?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS));

        Ok(Self {
            llm_api_key,
            llm_backend,
            llm_model: std::env::var("LLM_MODEL").ok(),
            database_url,
            session_ttl,
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            schema_path: std::env::var("SCHEMA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("schema.yaml")),
            annotations_path: std::env::var("ANNOTATIONS_PATH").ok().map(PathBuf::from),
        })
    }
}
