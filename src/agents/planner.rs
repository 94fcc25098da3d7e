//! Planner: conceptual plans for specific requests, suggested analyses for
//! exploratory ones. Output parsing is line-based and tolerant of leading
//! enumeration markers.

use uuid::Uuid;

use crate::context::DatabaseContext;
use crate::error::{AgentError, Result};
use crate::llm::LlmGateway;
use crate::prompts;

/// Bounds on conceptual plan steps
const MIN_PLAN_STEPS: usize = 3;
const MAX_PLAN_STEPS: usize = 10;

/// Bounds on suggested analyses returned in insights mode
const MIN_SUGGESTIONS: usize = 5;
const MAX_SUGGESTIONS: usize = 7;

/// Planner modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Numbered conceptual steps for a specific request
    Plan,
    /// Proposed analytical questions for an exploratory request
    Insights,
}

/// Produces conceptual plans and analysis suggestions
#[derive(Debug, Clone, Copy, Default)]
pub struct Planner;

impl Planner {
    /// Run the planner in the given mode.
    ///
    /// `Plan` yields 3 to 10 conceptual prose steps, no SQL. `Insights`
    /// yields 5 to 7 suggested analyses, one question per line.
    pub async fn run(
        &self,
        gateway: &LlmGateway,
        session: Option<Uuid>,
        mode: PlanMode,
        utterance: &str,
        ctx: &DatabaseContext,
    ) -> Result<Vec<String>> {
        let prompt = match mode {
            PlanMode::Plan => prompts::planning_prompt(utterance, &ctx.render()),
            PlanMode::Insights => prompts::insights_prompt(utterance, &ctx.render()),
        };
        let reply = gateway
            .complete(session, prompts::PLANNER_SYSTEM, &prompt)
            .await?;
        let mut lines = parse_lines(&reply);
        match mode {
            PlanMode::Plan => {
                lines.truncate(MAX_PLAN_STEPS);
                if lines.len() < MIN_PLAN_STEPS {
                    return Err(AgentError::Plan(format!(
                        "planner returned {} step(s); a conceptual plan needs at least {MIN_PLAN_STEPS}",
                        lines.len()
                    )));
                }
            }
            PlanMode::Insights => {
                lines.truncate(MAX_SUGGESTIONS);
                if lines.len() < MIN_SUGGESTIONS {
                    return Err(AgentError::Plan(format!(
                        "planner returned {} suggestion(s); at least {MIN_SUGGESTIONS} are required",
                        lines.len()
                    )));
                }
            }
        }
        Ok(lines)
    }
}

/// Split output into trimmed lines, stripping enumeration markers like
/// `1.`, `2)`, `-`, or `*`.
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(strip_enumeration)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_enumeration(line: &str) -> &str {
    let line = line.trim_start();
    let line = line
        .strip_prefix('-')
        .or_else(|| line.strip_prefix('*'))
        .unwrap_or(line);
    // Numeric markers: digits followed by '.' or ')'
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return stripped;
        }
    }
    line
}
