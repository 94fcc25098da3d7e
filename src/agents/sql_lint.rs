//! Lexical SQL self-validation.
//!
//! This is not a SQL parser. It is the same class of lightweight lexical
//! check the pipeline has always relied on: extract table references after
//! FROM/JOIN, resolve aliases, check qualified column references, and flag
//! structural problems. Findings are warnings, surfaced alongside the SQL
//! for the user's judgment; only the orchestrator decides what is fatal.

use std::collections::{HashMap, HashSet};
use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::context::DatabaseContext;

/// Write keywords rejected on this read-only surface
const FORBIDDEN_KEYWORDS: [&str; 7] = [
    "insert", "update", "delete", "drop", "alter", "attach", "pragma",
];

/// A non-fatal finding from SQL self-validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "kebab-case")]
pub enum SqlWarning {
    UnknownTable { table: String },
    UnknownColumn { table: Option<String>, column: String },
    UnbalancedParentheses,
    MissingFrom,
    SuspectedInjection,
    ForbiddenKeyword { keyword: String },
}

impl SqlWarning {
    /// Hard warnings trigger the synthesizer's single refinement pass.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            SqlWarning::UnknownTable { .. } | SqlWarning::UnknownColumn { .. }
        )
    }
}

impl fmt::Display for SqlWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlWarning::UnknownTable { table } => write!(f, "unknown-table: {table}"),
            SqlWarning::UnknownColumn {
                table: Some(table),
                column,
            } => write!(f, "unknown-column: {table}.{column}"),
            SqlWarning::UnknownColumn {
                table: None,
                column,
            } => write!(f, "unknown-column: {column}"),
            SqlWarning::UnbalancedParentheses => write!(f, "unbalanced-parentheses"),
            SqlWarning::MissingFrom => write!(f, "missing-from"),
            SqlWarning::SuspectedInjection => write!(f, "suspected-injection"),
            SqlWarning::ForbiddenKeyword { keyword } => {
                write!(f, "forbidden-keyword: {keyword}")
            }
        }
    }
}

/// Words that look like identifiers but are SQL syntax or functions
fn sql_keywords() -> HashSet<&'static str> {
    [
        "select", "from", "where", "join", "inner", "left", "right", "full", "outer", "cross",
        "on", "and", "or", "not", "in", "is", "null", "as", "group", "by", "order", "having",
        "limit", "offset", "distinct", "case", "when", "then", "else", "end", "like", "ilike",
        "between", "union", "all", "exists", "asc", "desc", "with", "count", "sum", "avg", "min",
        "max", "coalesce", "cast", "extract", "date", "interval", "true", "false", "nullif",
        "round", "abs", "lower", "upper", "substring", "trim", "concat", "now", "current_date",
        "current_timestamp", "float8", "int8", "text", "numeric", "integer",
    ]
    .into_iter()
    .collect()
}

/// Check a statement against the context and return all findings.
pub fn lint(sql: &str, ctx: &DatabaseContext) -> Vec<SqlWarning> {
    let mut warnings = Vec::new();
    let stripped = strip_string_literals(sql);
    let lower = stripped.to_lowercase();

    if let Some(keyword) = forbidden_keyword(sql) {
        warnings.push(SqlWarning::ForbiddenKeyword {
            keyword: keyword.to_string(),
        });
    }

    if sql.matches('(').count() != sql.matches(')').count() {
        warnings.push(SqlWarning::UnbalancedParentheses);
    }

    if looks_injected(&lower) || !is_single_statement(sql) {
        warnings.push(SqlWarning::SuspectedInjection);
    }

    let keywords = sql_keywords();

    // Tables referenced after FROM/JOIN, with optional aliases
    let from_join =
        Regex::new(r"(?i)\b(?:from|join)\s+([a-zA-Z_][a-zA-Z0-9_]*)(?:\s+(?:as\s+)?([a-zA-Z_][a-zA-Z0-9_]*))?")
            .unwrap();
    let mut aliases: HashMap<String, String> = HashMap::new();
    let mut seen_tables = HashSet::new();
    for captures in from_join.captures_iter(&lower) {
        let table = captures[1].to_string();
        if seen_tables.insert(table.clone()) && !ctx.has_table(&table) {
            warnings.push(SqlWarning::UnknownTable {
                table: table.clone(),
            });
        }
        if let Some(alias) = captures.get(2) {
            let alias = alias.as_str().to_string();
            if !keywords.contains(alias.as_str()) {
                aliases.insert(alias, table.clone());
            }
        }
    }

    // Qualified column references: prefix must resolve, column must exist
    let qualified = Regex::new(r"(?i)\b([a-zA-Z_][a-zA-Z0-9_]*)\.([a-zA-Z_][a-zA-Z0-9_]*)").unwrap();
    let mut seen_columns = HashSet::new();
    let mut qualified_tokens = HashSet::new();
    for captures in qualified.captures_iter(&lower) {
        let prefix = captures[1].to_string();
        let column = captures[2].to_string();
        qualified_tokens.insert(prefix.clone());
        qualified_tokens.insert(column.clone());
        let table = aliases.get(&prefix).cloned().unwrap_or_else(|| prefix.clone());
        if !ctx.has_table(&table) {
            if seen_tables.insert(table.clone()) {
                warnings.push(SqlWarning::UnknownTable { table });
            }
            continue;
        }
        if !ctx.has_column(&table, &column)
            && seen_columns.insert((table.clone(), column.clone()))
        {
            warnings.push(SqlWarning::UnknownColumn {
                table: Some(table),
                column,
            });
        }
    }

    // Bare identifiers that are neither keywords, known names, aliases, nor
    // function calls must be known columns somewhere in the context
    let identifiers = ctx.identifiers();
    let alias_defs: HashSet<String> = Regex::new(r"(?i)\bas\s+([a-zA-Z_][a-zA-Z0-9_]*)")
        .unwrap()
        .captures_iter(&lower)
        .map(|c| c[1].to_string())
        .collect();
    let word = Regex::new(r"\b([a-zA-Z_][a-zA-Z0-9_]*)\b").unwrap();
    for captures in word.captures_iter(&lower) {
        let token = captures[1].to_string();
        let end = captures.get(1).map(|m| m.end()).unwrap_or(0);
        let is_call = lower[end..].trim_start().starts_with('(');
        if keywords.contains(token.as_str())
            || is_call
            || identifiers.contains(&token)
            || aliases.contains_key(&token)
            || alias_defs.contains(&token)
            || qualified_tokens.contains(&token)
        {
            continue;
        }
        if seen_tables.contains(&token) {
            continue; // already reported as unknown table
        }
        if seen_columns.insert((String::new(), token.clone())) {
            warnings.push(SqlWarning::UnknownColumn {
                table: None,
                column: token,
            });
        }
    }

    if lower.trim_start().starts_with("select")
        && !Regex::new(r"(?i)\bfrom\b").unwrap().is_match(&lower)
        && !Regex::new(r"(?i)\b(count|sum|avg|min|max)\s*\(").unwrap().is_match(&lower)
    {
        warnings.push(SqlWarning::MissingFrom);
    }

    warnings
}

/// First write keyword found in the statement, if any.
pub fn forbidden_keyword(sql: &str) -> Option<&'static str> {
    let lower = strip_string_literals(sql).to_lowercase();
    FORBIDDEN_KEYWORDS.into_iter().find(|kw| {
        Regex::new(&format!(r"\b{kw}\b"))
            .map(|re| re.is_match(&lower))
            .unwrap_or(false)
    })
}

/// A statement is single when `;` appears only at the tail.
pub fn is_single_statement(sql: &str) -> bool {
    let trimmed = strip_string_literals(sql);
    let trimmed = trimmed.trim().trim_end_matches(';');
    !trimmed.contains(';')
}

fn looks_injected(lower: &str) -> bool {
    if lower.contains("--") || lower.contains("/*") {
        return true;
    }
    Regex::new(r"\bor\s+'?\w+'?\s*=\s*'?\w+'?\s*(--|$)")
        .map(|re| re.is_match(lower))
        .unwrap_or(false)
}

/// Replace single-quoted literal contents so their text is never mistaken
/// for identifiers.
fn strip_string_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_literal = false;
    for c in sql.chars() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                out.push(c);
            }
            _ if in_literal => {}
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextProvider;
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
      - name: product_id
        type: integer
      - name: amount
        type: float
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
    async fn test_clean_query_has_no_warnings() {
        let ctx = sales_context().await;
        let warnings = lint(
            "SELECT COUNT(*) FROM sales WHERE sale_date = '2025-04-11'",
            &ctx,
        );
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[tokio::test]
    async fn test_unknown_table_flagged() {
        let ctx = sales_context().await;
        let warnings = lint("SELECT category FROM products", &ctx);
        assert!(warnings.contains(&SqlWarning::UnknownTable {
            table: "products".into()
        }));
    }

    #[tokio::test]
    async fn test_unknown_qualified_column_flagged() {
        let ctx = sales_context().await;
        let warnings = lint("SELECT s.categry FROM sales s", &ctx);
        assert!(warnings.iter().any(|w| matches!(
            w,
            SqlWarning::UnknownColumn { table: Some(t), column } if t == "sales" && column == "categry"
        )));
    }

    #[tokio::test]
    async fn test_alias_resolution() {
        let ctx = sales_context().await;
        let warnings = lint(
            "SELECT s.amount FROM sales AS s WHERE s.sale_date = '2025-04-11'",
            &ctx,
        );
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[tokio::test]
    async fn test_write_keywords_rejected() {
        let ctx = sales_context().await;
        for sql in [
            "INSERT INTO sales VALUES (1)",
            "UPDATE sales SET amount = 0",
            "DELETE FROM sales",
            "DROP TABLE sales",
        ] {
            let warnings = lint(sql, &ctx);
            assert!(
                warnings
                    .iter()
                    .any(|w| matches!(w, SqlWarning::ForbiddenKeyword { .. })),
                "write keyword not flagged in: {sql}"
            );
        }
        assert_eq!(forbidden_keyword("DELETE FROM sales"), Some("delete"));
        assert_eq!(
            forbidden_keyword("SELECT COUNT(*) FROM sales"),
            None
        );
    }

    #[tokio::test]
    async fn test_keywords_inside_literals_ignored() {
        let ctx = sales_context().await;
        assert_eq!(
            forbidden_keyword("SELECT COUNT(*) FROM sales WHERE sale_date = 'delete me'"),
            None
        );
    }

    #[tokio::test]
    async fn test_unbalanced_parentheses() {
        let ctx = sales_context().await;
        let warnings = lint("SELECT COUNT(* FROM sales", &ctx);
        assert!(warnings.contains(&SqlWarning::UnbalancedParentheses));
    }

    #[tokio::test]
    async fn test_missing_from_on_bare_select() {
        let ctx = sales_context().await;
        let warnings = lint("SELECT sale_id", &ctx);
        assert!(warnings.contains(&SqlWarning::MissingFrom));
        // Aggregates without FROM are left alone
        let warnings = lint("SELECT COUNT(*)", &ctx);
        assert!(!warnings.contains(&SqlWarning::MissingFrom));
    }

    #[tokio::test]
    async fn test_injection_markers() {
        let ctx = sales_context().await;
        let warnings = lint("SELECT * FROM sales; DROP TABLE sales", &ctx);
        assert!(warnings.contains(&SqlWarning::SuspectedInjection));
        let warnings = lint("SELECT * FROM sales -- hidden", &ctx);
        assert!(warnings.contains(&SqlWarning::SuspectedInjection));
    }

    #[test]
    fn test_single_statement() {
        assert!(is_single_statement("SELECT 1"));
        assert!(is_single_statement("SELECT 1;"));
        assert!(!is_single_statement("SELECT 1; SELECT 2"));
        assert!(is_single_statement("SELECT ';' FROM t"));
    }

    #[test]
    fn test_warning_display() {
        assert_eq!(
            SqlWarning::UnknownTable {
                table: "products".into()
            }
            .to_string(),
            "unknown-table: products"
        );
        assert_eq!(
            SqlWarning::UnknownColumn {
                table: Some("sales".into()),
                column: "categry".into()
            }
            .to_string(),
            "unknown-column: sales.categry"
        );
        assert_eq!(
            SqlWarning::ForbiddenKeyword {
                keyword: "delete".into()
            }
            .to_string(),
            "forbidden-keyword: delete"
        );
    }
}
