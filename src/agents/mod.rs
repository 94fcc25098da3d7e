//! The pipeline's LLM-driven stages.
//!
//! Each agent is a stateless unit struct that borrows the gateway and the
//! per-turn context; the orchestrator owns sequencing and branching.

pub mod debugger;
pub mod describe;
pub mod intent;
pub mod interpreter;
pub mod plan_validator;
pub mod planner;
pub mod sql_lint;
pub mod synthesizer;

pub use debugger::SqlDebugger;
pub use describe::DescriptiveResponder;
pub use intent::{Classification, IntentClassifier, IntentLabel};
pub use interpreter::Interpreter;
pub use plan_validator::{PlanValidator, Verdict};
pub use planner::{PlanMode, Planner};
pub use sql_lint::SqlWarning;
pub use synthesizer::{GeneratedSql, SqlSynthesizer};
