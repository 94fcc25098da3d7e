//! LLM access layer.
//!
//! `client` defines the provider-agnostic trait; `anthropic` and `openai`
//! implement it over reqwest; `factory` selects one from the environment;
//! `gateway` is the single choke point every pipeline stage calls through,
//! owning retry, timeout, per-session conversation memory, and fence
//! stripping. `scripted` is the deterministic double used by tests.

pub mod anthropic;
pub mod client;
pub mod factory;
pub mod gateway;
pub mod openai;
pub mod scripted;

pub use client::{ChatMessage, ChatRole, LlmClient, LlmError};
pub use factory::{create_llm_client, LlmBackend};
pub use gateway::LlmGateway;
pub use scripted::ScriptedLlm;
