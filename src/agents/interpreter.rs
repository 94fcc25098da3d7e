//! Result interpretation: one grounded natural-language paragraph.

use uuid::Uuid;

use crate::error::Result;
use crate::llm::LlmGateway;
use crate::prompts;
use crate::store::QueryRow;

/// Summarizes result rows against the original utterance
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter;

impl Interpreter {
    /// `rows` is the (possibly truncated) sample; `total_rows` is the true
    /// count, which the summary must report when truncation occurred.
    pub async fn interpret(
        &self,
        gateway: &LlmGateway,
        session: Option<Uuid>,
        utterance: &str,
        rows: &[QueryRow],
        total_rows: usize,
        truncated: bool,
    ) -> Result<String> {
        let prompt = prompts::interpretation_prompt(utterance, rows, total_rows, truncated);
        let reply = gateway
            .complete(session, prompts::INTERPRETER_SYSTEM, &prompt)
            .await?;
        Ok(reply.trim().trim_start_matches("SUMMARY:").trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use crate::store::query_row;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_interpret_strips_label() {
        let gateway = LlmGateway::new(Arc::new(ScriptedLlm::new(vec![
            "SUMMARY: There were 2 sales on 2025-04-11.",
        ])));
        let rows = vec![query_row(&[("count", json!(2))])];
        let text = Interpreter
            .interpret(&gateway, None, "How many sales on 2025-04-11?", &rows, 1, false)
            .await
            .unwrap();
        assert_eq!(text, "There were 2 sales on 2025-04-11.");
    }
}
