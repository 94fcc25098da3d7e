//! datachat - conversational data-analysis backend.
//!
//! Turns natural-language questions about a relational dataset into
//! validated, user-approved SQL, executes it, and returns natural-language
//! interpretations. The pipeline for each turn:
//!
//! ```text
//! utterance → intent classification → planning → plan validation
//!           → SQL synthesis (self-validating, one refinement)
//!           → human approval gate (session store)
//!           → execution → interpretation (debug suggestion on failure)
//! ```
//!
//! The orchestrator exposes two operations: `analyze` produces SQL (or
//! suggestions, or a description) and parks it in a session; `execute`
//! consumes the session and runs user-approved SQL. Sessions are in-memory,
//! single-consumer, and soft-expiring.

// Error taxonomy with per-stage labels
pub mod error;

// Environment configuration
pub mod config;

// Schema description file parsing
pub mod schema;

// Per-turn database context (descriptors, summaries, annotations)
pub mod context;

// Storage engine surface: live PostgreSQL and in-memory fixture
pub mod store;

// LLM providers, gateway, and test double
pub mod llm;

// Prompt builders for every stage
pub mod prompts;

// The LLM-driven pipeline stages
pub mod agents;

// Pending-turn session store
pub mod session;

// Pipeline driver and outcome unions
pub mod orchestrator;

// HTTP transport surface
pub mod api;

pub use agents::{IntentClassifier, IntentLabel, Planner, SqlSynthesizer, SqlWarning, Verdict};
pub use context::{ContextProvider, DatabaseContext};
pub use error::{AgentError, Result};
pub use llm::{LlmGateway, ScriptedLlm};
pub use orchestrator::{AnalyzeOutcome, ExecuteOutcome, Orchestrator};
pub use session::{Session, SessionStore};
pub use store::{DataStore, SqlxStore, StaticStore};
