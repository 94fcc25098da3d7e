//! Prompt builders for every LLM stage.
//!
//! Each stage prompt is self-contained: it carries the rendered database
//! context and everything the model needs, so correctness never depends on
//! conversation memory.

use crate::store::QueryRow;

/// Rows shown to the interpreter prompt
const PROMPT_SAMPLE_ROWS: usize = 5;

/// Character cap on the serialized sample, to keep prompts bounded
const PROMPT_SAMPLE_CHARS: usize = 1000;

pub const INTENT_SYSTEM: &str = "You are a query intent classifier for a data-analysis assistant. \
You answer with exactly one label token and a confidence, nothing else.";

pub fn intent_prompt(utterance: &str, context: &str) -> String {
    format!(
        r#"Classify the user's request against the database described below.

USER REQUEST:
"{utterance}"

DATABASE CONTEXT:
{context}

LABELS:
- specific: the request asks a concrete question answerable by one SQL query (counts, lists, totals, filters on named things).
- exploratory_analytical: the request asks for ideas, insights, or suggested analyses rather than one concrete answer.
- exploratory_descriptive: the request asks what the dataset contains or for an overview of it.

Answer with exactly one line in the form:
<label> <confidence>

where <label> is one of the three tokens above and <confidence> is a number between 0.0 and 1.0."#
    )
}

pub const PLANNER_SYSTEM: &str = "You are an expert data analyst acting as a planner. \
You describe what needs to be done with the available tables; you never write SQL.";

pub fn planning_prompt(utterance: &str, context: &str) -> String {
    format!(
        r#"Create a clear, logical, step-by-step conceptual plan describing the SQL operations
needed to fulfill the user's request. Use the data summaries (row counts, nulls, distinct
values, stats) to make informed decisions about joins, filters, and aggregations.

USER REQUEST:
"{utterance}"

DATABASE CONTEXT:
{context}

CRITICAL INSTRUCTIONS:
1. ONLY use tables and columns that are explicitly mentioned in the DATABASE CONTEXT above.
2. DO NOT make assumptions about tables or relationships that are not documented in the context.
3. If the request requires tables or data that are not available, say so in the plan and
   restrict the plan to what the available data supports.
4. Do NOT write SQL; describe operations conceptually.

Provide a numbered plan of 3 to 10 steps, one step per line.

PLAN:"#
    )
}

pub fn insights_prompt(utterance: &str, context: &str) -> String {
    format!(
        r#"The user wants suggestions for interesting analyses of this dataset.

USER REQUEST:
"{utterance}"

DATABASE CONTEXT:
{context}

Propose 5 to 7 analytical questions, one per line. Each question must:
- be at most 30 words,
- be answerable by a single SQL query against the tables above,
- reference only tables and columns that appear in the context.

Output only the questions, one per line, no preamble."#
    )
}

pub const VALIDATOR_SYSTEM: &str = "You are a plan feasibility reviewer for a data-analysis \
assistant. You check plans against the actual schema and respond with JSON only.";

pub fn plan_validation_prompt(utterance: &str, plan: &str, context: &str) -> String {
    format!(
        r#"Review the conceptual plan below for feasibility against the database context.

USER REQUEST:
"{utterance}"

PLAN:
{plan}

DATABASE CONTEXT:
{context}

RULES:
1. Any table or column the plan references that is not in the DATABASE CONTEXT makes the
   plan infeasible, unless an obviously intended near-match exists, in which case revise
   the plan to use the real name.
2. A revised plan must keep the user's intent and reference only real names.
3. If the plan is infeasible, explain precisely which names are missing.

Respond with JSON only, no markdown:
{{
  "verdict": "feasible" | "revised" | "infeasible",
  "rationale": "one or two sentences",
  "revised_plan": ["step 1", "step 2"]  // only when verdict is "revised"
}}"#
    )
}

pub const SQL_SYSTEM: &str = "You are an expert SQL coder for PostgreSQL. \
You output a single SQL statement and nothing else.";

pub fn sql_generation_prompt(plan: &str, context: &str) -> String {
    format!(
        r#"Translate the conceptual analysis plan into a single, executable PostgreSQL query.
Use the database context (schema and summaries) for table and column names, and the
summaries to choose sensible joins and filters.

DATABASE CONTEXT:
{context}

CONCEPTUAL PLAN:
{plan}

CRITICAL INSTRUCTIONS:
1. ONLY use tables and columns that explicitly appear in the DATABASE CONTEXT above.
2. DO NOT assume or infer the existence of any tables not listed in the context.
3. Produce exactly one statement. No data-modifying statements of any kind.
4. Output ONLY the SQL query string, without explanations or surrounding text.

SQL QUERY:"#
    )
}

pub fn sql_refinement_prompt(sql: &str, warnings: &str, plan: &str, context: &str) -> String {
    format!(
        r#"The following PostgreSQL query failed validation against the database schema.
Fix the listed problems and return ONLY the corrected query.

VALIDATION WARNINGS:
{warnings}

CURRENT QUERY:
{sql}

CONCEPTUAL PLAN (for reference):
{plan}

DATABASE CONTEXT:
{context}

REQUIREMENTS:
1. Reference only tables and columns that appear in the DATABASE CONTEXT.
2. Keep the intent of the plan.
3. Produce exactly one statement and output only the SQL."#
    )
}

pub const DEBUGGER_SYSTEM: &str = "You are an expert SQL debugger for PostgreSQL. \
You return a corrected statement and nothing else.";

pub fn sql_debug_prompt(
    utterance: &str,
    failed_sql: &str,
    error_message: &str,
    plan: &str,
    context: &str,
) -> String {
    format!(
        r#"A query failed to execute. Analyze the error and provide a corrected version.

USER REQUEST:
"{utterance}"

ORIGINAL CONCEPTUAL PLAN:
{plan}

DATABASE CONTEXT:
{context}

FAILED SQL QUERY:
{failed_sql}

ERROR MESSAGE:
{error_message}

REQUIREMENTS:
1. The corrected SQL must keep the intent of the original query and plan.
2. ONLY use tables and columns that explicitly appear in the DATABASE CONTEXT.
3. Check that names in the query match the context exactly; quote identifiers if needed.
4. Produce exactly one statement and output only the SQL."#
    )
}

pub const INTERPRETER_SYSTEM: &str = "You are a helpful data analyst assistant. You explain \
query results clearly to a non-technical user.";

pub fn interpretation_prompt(
    utterance: &str,
    rows: &[QueryRow],
    total_rows: usize,
    truncated: bool,
) -> String {
    let formatted = format_rows_for_prompt(rows, total_rows);
    let truncation_note = if truncated {
        "\nNOTE: The result set was truncated for interpretation; mention this explicitly."
    } else {
        ""
    };
    format!(
        r#"Interpret the query results in the context of the user's original request.

USER REQUEST:
"{utterance}"

QUERY RESULTS:
{formatted}{truncation_note}

Write one concise paragraph (under 500 words) that:
1. Answers the user's question directly in the first sentence.
2. Cites at most five concrete values drawn from the results.
3. Explains what the data means rather than repeating it.

SUMMARY:"#
    )
}

pub const DESCRIBE_SYSTEM: &str = "You are a data analyst describing a dataset to a new user. \
You work only from the schema and summaries provided; you never run queries.";

pub fn description_prompt(context: &str) -> String {
    format!(
        r#"Describe this dataset for someone seeing it for the first time.

DATABASE CONTEXT:
{context}

Write 3 to 6 short paragraphs covering:
- what tables exist and what each appears to represent,
- approximate sizes (row counts),
- notable columns: high cardinality, high null rates, interesting value distributions.

Do not include SQL. Do not invent tables or columns that are not in the context."#
    )
}

/// Format a row sample for a prompt: a few rows as pretty JSON, capped in
/// length, with the true row count stated up front.
pub fn format_rows_for_prompt(rows: &[QueryRow], total_rows: usize) -> String {
    if rows.is_empty() {
        return "Query returned no results.".to_string();
    }
    let sample: Vec<&QueryRow> = rows.iter().take(PROMPT_SAMPLE_ROWS).collect();
    let mut rendered = serde_json::to_string_pretty(&sample)
        .unwrap_or_else(|_| sample.iter().map(|r| format!("{r:?}\n")).collect());
    if rendered.len() > PROMPT_SAMPLE_CHARS {
        rendered.truncate(PROMPT_SAMPLE_CHARS);
        rendered.push_str("\n... (results truncated)");
    }
    format!(
        "Query returned {total_rows} row(s). Showing first {}:\n{rendered}",
        sample.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::query_row;
    use serde_json::json;

    #[test]
    fn test_format_rows_empty() {
        assert_eq!(format_rows_for_prompt(&[], 0), "Query returned no results.");
    }

    #[test]
    fn test_format_rows_reports_true_count() {
        let rows: Vec<QueryRow> = (0..10)
            .map(|i| query_row(&[("n", json!(i))]))
            .collect();
        let text = format_rows_for_prompt(&rows, 5000);
        assert!(text.starts_with("Query returned 5000 row(s). Showing first 5:"));
    }

    #[test]
    fn test_interpretation_prompt_mentions_truncation() {
        let rows = vec![query_row(&[("count", json!(2))])];
        let with = interpretation_prompt("how many?", &rows, 20000, true);
        assert!(with.contains("truncated"));
        let without = interpretation_prompt("how many?", &rows, 1, false);
        assert!(!without.contains("NOTE: The result set"));
    }
}
