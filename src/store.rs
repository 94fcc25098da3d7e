//! Store access: the two interfaces the pipeline needs from the storage
//! engine, raw SQL execution and per-table summary aggregates, behind one
//! trait so the live PostgreSQL implementation and the in-memory fixture
//! used by tests are interchangeable.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, Row as SqlxRow, TypeInfo};
use thiserror::Error;

use crate::context::{
    ColumnSummary, TableDescriptor, TableSummary, LOW_CARDINALITY_THRESHOLD, TOP_VALUES_LIMIT,
};

/// Wall-clock cap on a single statement
pub const QUERY_TIMEOUT_SECONDS: u64 = 30;

/// One result row: column name to scalar value, in projection order
pub type QueryRow = Map<String, Value>;

/// Execution failure from the store
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// The engine rejected or failed the statement
    #[error("{message}")]
    Engine {
        message: String,
        /// SQLSTATE-like code when the engine provides one
        code: Option<String>,
    },

    #[error("query exceeded the {0}s execution cap")]
    Timeout(u64),

    #[error("store connection failure: {0}")]
    Connection(String),
}

impl From<sqlx::Error> for ExecError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => ExecError::Engine {
                message: db.message().to_string(),
                code: db.code().map(|c| c.to_string()),
            },
            other => ExecError::Connection(other.to_string()),
        }
    }
}

/// The storage engine surface the pipeline depends on
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Run a SQL statement and return its rows in projection order.
    async fn run(&self, sql: &str) -> Result<Vec<QueryRow>, ExecError>;

    /// Gather summary statistics for one table via lightweight aggregates.
    async fn summarize(&self, table: &TableDescriptor) -> Result<TableSummary, ExecError>;
}

// ============================================================================
// Live PostgreSQL store
// ============================================================================

/// PostgreSQL store backed by a sqlx pool
pub struct SqlxStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl SqlxStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            query_timeout: Duration::from_secs(QUERY_TIMEOUT_SECONDS),
        }
    }

    pub fn with_timeout(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    async fn fetch_all(&self, sql: &str) -> Result<Vec<PgRow>, ExecError> {
        match tokio::time::timeout(self.query_timeout, sqlx::query(sql).fetch_all(&self.pool))
            .await
        {
            Ok(result) => result.map_err(ExecError::from),
            Err(_) => Err(ExecError::Timeout(self.query_timeout.as_secs())),
        }
    }

    async fn scalar_i64(&self, sql: &str) -> Result<i64, ExecError> {
        match tokio::time::timeout(
            self.query_timeout,
            sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.pool),
        )
        .await
        {
            Ok(result) => result.map_err(ExecError::from),
            Err(_) => Err(ExecError::Timeout(self.query_timeout.as_secs())),
        }
    }
}

#[async_trait]
impl DataStore for SqlxStore {
    async fn run(&self, sql: &str) -> Result<Vec<QueryRow>, ExecError> {
        let rows = self.fetch_all(sql).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn summarize(&self, table: &TableDescriptor) -> Result<TableSummary, ExecError> {
        let quoted_table = quote_ident(&table.physical_name);
        let row_count = self
            .scalar_i64(&format!("SELECT COUNT(*) FROM {quoted_table}"))
            .await?;

        let mut columns = HashMap::new();
        if row_count == 0 {
            return Ok(TableSummary { row_count, columns });
        }

        for column in &table.columns {
            let quoted_column = quote_ident(&column.name);
            let null_count = self
                .scalar_i64(&format!(
                    "SELECT COUNT(*) FROM {quoted_table} WHERE {quoted_column} IS NULL"
                ))
                .await?;
            let distinct_count = self
                .scalar_i64(&format!(
                    "SELECT COUNT(DISTINCT {quoted_column}) FROM {quoted_table}"
                ))
                .await?;

            let mut summary = ColumnSummary {
                null_count,
                distinct_count,
                ..Default::default()
            };

            if column.is_numeric() {
                let stats = self
                    .fetch_all(&format!(
                        "SELECT MIN({quoted_column})::float8 AS min, \
                         MAX({quoted_column})::float8 AS max, \
                         AVG({quoted_column})::float8 AS avg FROM {quoted_table}"
                    ))
                    .await?;
                if let Some(row) = stats.first() {
                    summary.min = row.try_get::<Option<f64>, _>("min").unwrap_or(None);
                    summary.max = row.try_get::<Option<f64>, _>("max").unwrap_or(None);
                    summary.mean = row.try_get::<Option<f64>, _>("avg").unwrap_or(None);
                }
            }

            if column.is_textual() && distinct_count <= LOW_CARDINALITY_THRESHOLD {
                let top = self
                    .fetch_all(&format!(
                        "SELECT {quoted_column}::text AS value, COUNT(*) AS count \
                         FROM {quoted_table} WHERE {quoted_column} IS NOT NULL \
                         GROUP BY 1 ORDER BY 2 DESC, 1 LIMIT {TOP_VALUES_LIMIT}"
                    ))
                    .await?;
                let values: Vec<(String, i64)> = top
                    .iter()
                    .filter_map(|row| {
                        let value = row.try_get::<String, _>("value").ok()?;
                        let count = row.try_get::<i64, _>("count").ok()?;
                        Some((value, count))
                    })
                    .collect();
                summary.top_values = Some(values);
            }

            columns.insert(column.name.clone(), summary);
        }

        Ok(TableSummary { row_count, columns })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn row_to_json(row: &PgRow) -> QueryRow {
    let mut out = Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), decode_value(row, index));
    }
    out
}

/// Decode one column by its engine type name, falling back to text.
fn decode_value(row: &PgRow, index: usize) -> Value {
    let type_name = row.columns()[index].type_info().name();
    match type_name {
        "BOOL" => opt(row.try_get::<Option<bool>, _>(index).ok().flatten()),
        "INT2" => int(row.try_get::<Option<i16>, _>(index).ok().flatten().map(i64::from)),
        "INT4" => int(row.try_get::<Option<i32>, _>(index).ok().flatten().map(i64::from)),
        "INT8" => int(row.try_get::<Option<i64>, _>(index).ok().flatten()),
        "FLOAT4" => float(row.try_get::<Option<f32>, _>(index).ok().flatten().map(f64::from)),
        "FLOAT8" => float(row.try_get::<Option<f64>, _>(index).ok().flatten()),
        "NUMERIC" => float(
            row.try_get::<Option<rust_decimal::Decimal>, _>(index)
                .ok()
                .flatten()
                .and_then(|d| d.to_f64()),
        ),
        "UUID" => opt(row
            .try_get::<Option<uuid::Uuid>, _>(index)
            .ok()
            .flatten()
            .map(|u| u.to_string())),
        "DATE" => opt(row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .ok()
            .flatten()
            .map(|d| d.to_string())),
        "TIMESTAMP" => opt(row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(|t| t.to_string())),
        "TIMESTAMPTZ" => opt(row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .ok()
            .flatten()
            .map(|t| t.to_rfc3339())),
        "JSON" | "JSONB" => row
            .try_get::<Option<Value>, _>(index)
            .ok()
            .flatten()
            .unwrap_or(Value::Null),
        _ => opt(row.try_get::<Option<String>, _>(index).ok().flatten()),
    }
}

fn opt<T: Into<Value>>(value: Option<T>) -> Value {
    value.map(Into::into).unwrap_or(Value::Null)
}

fn int(value: Option<i64>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn float(value: Option<f64>) -> Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

// ============================================================================
// In-memory fixture store
// ============================================================================

/// Deterministic in-memory store for tests and offline runs. Statements and
/// summaries are registered up front; anything unregistered returns empty.
#[derive(Debug, Default)]
pub struct StaticStore {
    summaries: HashMap<String, TableSummary>,
    rows: HashMap<String, Vec<QueryRow>>,
    errors: HashMap<String, ExecError>,
}

impl StaticStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summary(mut self, table: &str, summary: TableSummary) -> Self {
        self.summaries.insert(table.to_string(), summary);
        self
    }

    pub fn with_rows(mut self, sql: &str, rows: Vec<QueryRow>) -> Self {
        self.rows.insert(sql.to_string(), rows);
        self
    }

    pub fn with_error(mut self, sql: &str, message: &str, code: Option<&str>) -> Self {
        self.errors.insert(
            sql.to_string(),
            ExecError::Engine {
                message: message.to_string(),
                code: code.map(|c| c.to_string()),
            },
        );
        self
    }
}

#[async_trait]
impl DataStore for StaticStore {
    async fn run(&self, sql: &str) -> Result<Vec<QueryRow>, ExecError> {
        if let Some(err) = self.errors.get(sql) {
            return Err(err.clone());
        }
        Ok(self.rows.get(sql).cloned().unwrap_or_default())
    }

    async fn summarize(&self, table: &TableDescriptor) -> Result<TableSummary, ExecError> {
        self.summaries
            .get(&table.physical_name)
            .cloned()
            .ok_or_else(|| ExecError::Engine {
                message: format!("no summary fixture for table {}", table.physical_name),
                code: None,
            })
    }
}

/// Build a [`QueryRow`] from name/value pairs, preserving order.
pub fn query_row(pairs: &[(&str, Value)]) -> QueryRow {
    let mut row = Map::new();
    for (name, value) in pairs {
        row.insert(name.to_string(), value.clone());
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_store_rows_and_errors() {
        let store = StaticStore::new()
            .with_rows(
                "SELECT COUNT(*) FROM sales",
                vec![query_row(&[("count", json!(4))])],
            )
            .with_error("SELEC 1", "syntax error at or near \"SELEC\"", Some("42601"));

        let rows = store.run("SELECT COUNT(*) FROM sales").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["count"], json!(4));

        let err = store.run("SELEC 1").await.unwrap_err();
        match err {
            ExecError::Engine { message, code } => {
                assert!(message.contains("SELEC"));
                assert_eq!(code.as_deref(), Some("42601"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Unregistered statements return no rows rather than failing
        assert!(store.run("SELECT 1").await.unwrap().is_empty());
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("sales"), "\"sales\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_query_row_preserves_order() {
        let row = query_row(&[("b", json!(1)), ("a", json!(2))]);
        let keys: Vec<&String> = row.keys().collect();
        assert_eq!(keys, ["b", "a"]);
    }
}
