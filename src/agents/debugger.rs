//! SQL debugging: propose a corrected statement after an execution failure.
//!
//! The proposal goes through the same lexical validation as synthesis, but
//! with no refinement pass, and it is never executed. Applying the fix is
//! the user's call.

use tracing::warn;
use uuid::Uuid;

use crate::agents::sql_lint::{self, SqlWarning};
use crate::context::DatabaseContext;
use crate::llm::LlmGateway;
use crate::prompts;

/// Proposes corrections for failed statements
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlDebugger;

impl SqlDebugger {
    /// Returns a corrected statement, or `None` when the model fails or the
    /// proposal does not survive validation.
    pub async fn suggest(
        &self,
        gateway: &LlmGateway,
        session: Option<Uuid>,
        utterance: &str,
        failed_sql: &str,
        engine_error: &str,
        plan: &[String],
        ctx: &DatabaseContext,
    ) -> Option<String> {
        let prompt = prompts::sql_debug_prompt(
            utterance,
            failed_sql,
            engine_error,
            &plan.join("\n"),
            &ctx.render(),
        );
        let reply = match gateway
            .complete(session, prompts::DEBUGGER_SYSTEM, &prompt)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "sql debugger call failed");
                return None;
            }
        };

        let sql = reply.trim().trim_end_matches(';').trim().to_string();
        if sql.is_empty() || !sql_lint::is_single_statement(&sql) {
            warn!("sql debugger returned no usable statement");
            return None;
        }
        let warnings = sql_lint::lint(&sql, ctx);
        let rejected = warnings.iter().any(|w| {
            w.is_hard() || matches!(w, SqlWarning::ForbiddenKeyword { .. })
        });
        if rejected {
            warn!(?warnings, "sql debugger proposal failed validation");
            return None;
        }
        Some(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextProvider;
    use crate::llm::ScriptedLlm;
    use crate::schema::SchemaFile;
    use crate::store::{DataStore, StaticStore};
    use std::sync::Arc;

    async fn sales_context() -> DatabaseContext {
        let schema = SchemaFile::parse(
            r#"
tables:
  - name: Sales
    table: sales
    columns:
      - name: sale_id
        type: integer
      - name: sale_date
        type: text
"#,
        )
        .unwrap();
        let store: Arc<dyn DataStore> = Arc::new(StaticStore::new());
        ContextProvider::from_schema(schema)
            .build(&store)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_proposal_returned() {
        let ctx = sales_context().await;
        let gateway = LlmGateway::new(Arc::new(ScriptedLlm::new(vec![
            "SELECT COUNT(*) FROM sales",
        ])));
        let suggestion = SqlDebugger
            .suggest(
                &gateway,
                None,
                "how many sales?",
                "SELEC COUNT(*) FROM sales",
                "syntax error at or near \"SELEC\"",
                &["Count sales".to_string()],
                &ctx,
            )
            .await;
        assert_eq!(suggestion.as_deref(), Some("SELECT COUNT(*) FROM sales"));
    }

    #[tokio::test]
    async fn test_invalid_proposal_rejected() {
        let ctx = sales_context().await;
        let gateway = LlmGateway::new(Arc::new(ScriptedLlm::new(vec![
            "SELECT COUNT(*) FROM products",
        ])));
        let suggestion = SqlDebugger
            .suggest(
                &gateway,
                None,
                "how many sales?",
                "SELEC COUNT(*) FROM sales",
                "syntax error",
                &[],
                &ctx,
            )
            .await;
        assert!(suggestion.is_none());
    }

    #[tokio::test]
    async fn test_write_proposal_rejected() {
        let ctx = sales_context().await;
        let gateway = LlmGateway::new(Arc::new(ScriptedLlm::new(vec![
            "DELETE FROM sales",
        ])));
        let suggestion = SqlDebugger
            .suggest(&gateway, None, "q", "bad", "err", &[], &ctx)
            .await;
        assert!(suggestion.is_none());
    }
}
