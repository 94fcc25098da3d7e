//! LLM provider selection.

use std::str::FromStr;
use std::sync::Arc;

use super::anthropic::AnthropicClient;
use super::client::LlmClient;
use super::openai::OpenAiClient;

/// Which provider to use, selected by `LLM_BACKEND`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmBackend {
    #[default]
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    pub fn name(&self) -> &'static str {
        match self {
            LlmBackend::Anthropic => "Anthropic",
            LlmBackend::OpenAi => "OpenAI",
        }
    }
}

/// Error for an unrecognized backend name
#[derive(Debug)]
pub struct ParseBackendError(String);

impl std::fmt::Display for ParseBackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseBackendError {}

impl FromStr for LlmBackend {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmBackend::Anthropic),
            "openai" | "gpt" => Ok(LlmBackend::OpenAi),
            other => Err(ParseBackendError(format!(
                "Unknown LLM_BACKEND '{other}'. Valid values: anthropic, claude, openai, gpt"
            ))),
        }
    }
}

impl std::fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Construct a client for the selected backend.
pub fn create_llm_client(
    backend: LlmBackend,
    api_key: String,
    model: Option<String>,
) -> Arc<dyn LlmClient> {
    match backend {
        LlmBackend::Anthropic => Arc::new(AnthropicClient::new(api_key, model)),
        LlmBackend::OpenAi => Arc::new(OpenAiClient::new(api_key, model)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!(
            "anthropic".parse::<LlmBackend>().unwrap(),
            LlmBackend::Anthropic
        );
        assert_eq!("claude".parse::<LlmBackend>().unwrap(), LlmBackend::Anthropic);
        assert_eq!("OPENAI".parse::<LlmBackend>().unwrap(), LlmBackend::OpenAi);
        assert_eq!("gpt".parse::<LlmBackend>().unwrap(), LlmBackend::OpenAi);
        assert!("invalid".parse::<LlmBackend>().is_err());
    }

    #[test]
    fn test_default() {
        assert_eq!(LlmBackend::default(), LlmBackend::Anthropic);
    }
}
