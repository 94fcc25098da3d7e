//! SQL synthesis: translate a feasible plan into one validated statement.
//!
//! The synthesizer introduces no nondeterminism of its own: with identical
//! plan and context and a deterministic model, the output text is identical.
//! Hard validation findings (unknown table or column) trigger exactly one
//! refinement call; remaining warnings are surfaced, never silently fixed.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::sql_lint::{self, SqlWarning};
use crate::context::DatabaseContext;
use crate::error::{AgentError, Result};
use crate::llm::LlmGateway;
use crate::prompts;

/// Synthesized SQL with its self-validation report
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedSql {
    pub sql: String,
    pub warnings: Vec<SqlWarning>,
}

/// Translates plans into single SQL statements
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlSynthesizer;

impl SqlSynthesizer {
    pub async fn synthesize(
        &self,
        gateway: &LlmGateway,
        session: Option<Uuid>,
        plan: &[String],
        ctx: &DatabaseContext,
    ) -> Result<GeneratedSql> {
        let plan_text = plan.join("\n");
        let context_text = ctx.render();

        let prompt = prompts::sql_generation_prompt(&plan_text, &context_text);
        let reply = gateway
            .complete(session, prompts::SQL_SYSTEM, &prompt)
            .await?;
        let sql = extract_statement(&reply)?;
        let warnings = lint_read_only(&sql, ctx)?;

        if !warnings.iter().any(SqlWarning::is_hard) {
            return Ok(GeneratedSql { sql, warnings });
        }

        // One refinement pass with the warning list attached, then one
        // re-validation. Whatever comes back is final.
        let warning_text = warnings
            .iter()
            .map(|w| format!("- {w}"))
            .collect::<Vec<_>>()
            .join("\n");
        info!(warnings = %warning_text, "sql failed self-validation, refining once");

        let refine_prompt =
            prompts::sql_refinement_prompt(&sql, &warning_text, &plan_text, &context_text);
        let refined = match gateway
            .complete(session, prompts::SQL_SYSTEM, &refine_prompt)
            .await
        {
            Ok(reply) => extract_statement(&reply)?,
            Err(e) => {
                // Refinement is best-effort; surface the original with its warnings
                warn!(error = %e, "sql refinement call failed, keeping original");
                return Ok(GeneratedSql { sql, warnings });
            }
        };
        let refined_warnings = lint_read_only(&refined, ctx)?;
        if refined_warnings.iter().any(SqlWarning::is_hard) {
            warn!("hard warnings remain after refinement, surfacing them");
        }
        Ok(GeneratedSql {
            sql: refined,
            warnings: refined_warnings,
        })
    }
}

/// Lint the statement, treating write keywords as fatal: this surface never
/// emits a statement that could modify the store.
fn lint_read_only(
    sql: &str,
    ctx: &DatabaseContext,
) -> Result<Vec<SqlWarning>> {
    let warnings = sql_lint::lint(sql, ctx);
    if let Some(SqlWarning::ForbiddenKeyword { keyword }) = warnings
        .iter()
        .find(|w| matches!(w, SqlWarning::ForbiddenKeyword { .. }))
    {
        return Err(AgentError::SqlSynth(format!(
            "model produced a write statement ({keyword}); this surface is read-only"
        )));
    }
    Ok(warnings)
}

/// Require exactly one non-empty statement. The gateway already stripped
/// markdown fences; a trailing semicolon is tolerated and removed.
fn extract_statement(reply: &str) -> Result<String> {
    let sql = reply.trim();
    if sql.is_empty() {
        return Err(AgentError::SqlSynth("model returned no statement".into()));
    }
    if !sql_lint::is_single_statement(sql) {
        return Err(AgentError::SqlSynth(
            "model returned more than one statement".into(),
        ));
    }
    Ok(sql.trim_end_matches(';').trim().to_string())
}
