//! Database context: the per-turn, read-only bundle of schema, data
//! summaries, and profiler annotations fed to every LLM stage.
//!
//! The context is constructed at the start of each turn from the schema
//! description file plus lightweight aggregate queries against the store,
//! then shared by reference and never mutated. The rendered text block is
//! deterministic: tables are listed alphabetically by physical name and
//! columns in schema order, so identical inputs produce byte-identical
//! prompts across runs.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::error::{AgentError, Result};
use crate::schema::SchemaFile;
use crate::store::DataStore;

/// Text columns with at most this many distinct values get top-k value counts
pub const LOW_CARDINALITY_THRESHOLD: i64 = 50;

/// How many top values to report for a low-cardinality text column
pub const TOP_VALUES_LIMIT: usize = 10;

/// A column as seen by the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
    /// Relation target in `table.column` form
    pub references: Option<String>,
    /// Natural-language annotation from the offline profiler, if any
    pub annotation: Option<String>,
}

impl ColumnDescriptor {
    pub fn is_numeric(&self) -> bool {
        let ty = self.declared_type.to_lowercase();
        ["int", "float", "double", "numeric", "decimal", "real", "serial"]
            .iter()
            .any(|t| ty.contains(t))
    }

    pub fn is_textual(&self) -> bool {
        let ty = self.declared_type.to_lowercase();
        ["text", "char", "string", "varchar"]
            .iter()
            .any(|t| ty.contains(t))
    }
}

/// A table as seen by the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct TableDescriptor {
    pub logical_name: String,
    pub physical_name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Per-column summary statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ColumnSummary {
    pub null_count: i64,
    pub distinct_count: i64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    /// Top value counts, most frequent first
    pub top_values: Option<Vec<(String, i64)>>,
}

/// Per-table summary statistics
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub row_count: i64,
    /// Keyed by column name; rendered in schema column order
    pub columns: HashMap<String, ColumnSummary>,
}

/// The immutable per-turn context
#[derive(Debug, Clone)]
pub struct DatabaseContext {
    /// Tables ordered alphabetically by physical name
    pub tables: Vec<TableDescriptor>,
    /// Summaries keyed by physical name; `None` means summary unavailable
    pub summaries: HashMap<String, Option<TableSummary>>,
}

impl DatabaseContext {
    pub fn table(&self, physical_name: &str) -> Option<&TableDescriptor> {
        self.tables
            .iter()
            .find(|t| t.physical_name.eq_ignore_ascii_case(physical_name))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.table(table)
            .map(|t| t.column(column).is_some())
            .unwrap_or(false)
    }

    /// Every table and column name, lowercased, for identifier checks.
    pub fn identifiers(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        for table in &self.tables {
            out.insert(table.physical_name.to_lowercase());
            out.insert(table.logical_name.to_lowercase());
            for column in &table.columns {
                out.insert(column.name.to_lowercase());
            }
        }
        out
    }

    /// Render the context as a compact text block for LLM consumption.
    ///
    /// Deterministic for identical schema and summaries: the table order is
    /// fixed at construction time and all maps are traversed in schema order.
    pub fn render(&self) -> String {
        let mut out = String::from("Database Context:");
        for table in &self.tables {
            out.push_str(&format!(
                "\n\n--- Table: {} (Model: {}) ---\n",
                table.physical_name, table.logical_name
            ));
            out.push_str("Columns:\n");
            for column in &table.columns {
                let nullable = if column.nullable { ", nullable" } else { "" };
                out.push_str(&format!(
                    "  - {} ({}{})",
                    column.name, column.declared_type, nullable
                ));
                if let Some(target) = &column.references {
                    out.push_str(&format!(" [references {target}]"));
                }
                if let Some(note) = &column.annotation {
                    out.push_str(&format!(" /// {note}"));
                }
                out.push('\n');
            }
            match self.summaries.get(&table.physical_name) {
                Some(Some(summary)) => {
                    out.push_str("Summary:\n");
                    out.push_str(&format!("  Total Rows: {}\n", summary.row_count));
                    if summary.row_count > 0 {
                        Self::render_summary_lines(&mut out, table, summary);
                    }
                }
                _ => out.push_str("Summary: unavailable\n"),
            }
        }
        out.trim_end().to_string()
    }

    fn render_summary_lines(out: &mut String, table: &TableDescriptor, summary: &TableSummary) {
        let per_column = |f: &dyn Fn(&ColumnSummary) -> Option<String>| -> Vec<String> {
            table
                .columns
                .iter()
                .filter_map(|c| {
                    summary
                        .columns
                        .get(&c.name)
                        .and_then(f)
                        .map(|v| format!("{}: {}", c.name, v))
                })
                .collect()
        };

        let nulls = per_column(&|s| Some(s.null_count.to_string()));
        if !nulls.is_empty() {
            out.push_str(&format!("  Null Counts: {{{}}}\n", nulls.join(", ")));
        }
        let distinct = per_column(&|s| Some(s.distinct_count.to_string()));
        if !distinct.is_empty() {
            out.push_str(&format!("  Distinct Counts: {{{}}}\n", distinct.join(", ")));
        }
        let stats = per_column(&|s| match (s.min, s.max, s.mean) {
            (Some(min), Some(max), Some(mean)) => {
                Some(format!("{{min: {min}, max: {max}, avg: {mean:.2}}}"))
            }
            _ => None,
        });
        if !stats.is_empty() {
            out.push_str(&format!("  Basic Stats (Numeric): {{{}}}\n", stats.join(", ")));
        }
        let top = per_column(&|s| {
            s.top_values.as_ref().map(|values| {
                let pairs: Vec<String> = values
                    .iter()
                    .map(|(value, count)| format!("'{value}': {count}"))
                    .collect();
                format!("{{{}}}", pairs.join(", "))
            })
        });
        if !top.is_empty() {
            out.push_str(&format!(
                "  Top Value Counts (Low Cardinality Text): {{{}}}\n",
                top.join(", ")
            ));
        }
    }
}

/// Per-column annotations from the offline profiler, keyed table -> column
pub type AnnotationMap = HashMap<String, HashMap<String, String>>;

/// Where the schema description comes from
#[derive(Debug, Clone)]
enum SchemaSource {
    File(PathBuf),
    Inline(SchemaFile),
}

/// Builds the per-turn [`DatabaseContext`].
#[derive(Debug, Clone)]
pub struct ContextProvider {
    schema: SchemaSource,
    annotations_path: Option<PathBuf>,
}

impl ContextProvider {
    /// Provider that re-reads the schema file on every turn.
    pub fn from_path(schema_path: PathBuf, annotations_path: Option<PathBuf>) -> Self {
        Self {
            schema: SchemaSource::File(schema_path),
            annotations_path,
        }
    }

    /// Provider over an already-parsed schema (used by tests and tools).
    pub fn from_schema(schema: SchemaFile) -> Self {
        Self {
            schema: SchemaSource::Inline(schema),
            annotations_path: None,
        }
    }

    /// Build a fresh context: parse the schema, load annotations, and gather
    /// per-table summaries from the store.
    ///
    /// A failed summary marks that table "unavailable" but never aborts the
    /// whole context; a missing schema file is fatal.
    pub async fn build(&self, store: &Arc<dyn DataStore>) -> Result<DatabaseContext> {
        let schema = match &self.schema {
            SchemaSource::File(path) => SchemaFile::load(path)?,
            SchemaSource::Inline(schema) => schema.clone(),
        };
        let annotations = self.load_annotations()?;

        let mut tables: Vec<TableDescriptor> = schema
            .tables
            .iter()
            .map(|def| {
                let physical = def.physical_name();
                let table_annotations = annotations.get(&physical);
                TableDescriptor {
                    logical_name: def.name.clone(),
                    physical_name: physical,
                    columns: def
                        .columns
                        .iter()
                        .map(|c| ColumnDescriptor {
                            name: c.name.clone(),
                            declared_type: c.declared_type.clone(),
                            nullable: c.nullable,
                            references: c.references.clone(),
                            annotation: table_annotations
                                .and_then(|cols| cols.get(&c.name))
                                .cloned(),
                        })
                        .collect(),
                }
            })
            .collect();
        tables.sort_by(|a, b| a.physical_name.cmp(&b.physical_name));

        let mut summaries = HashMap::new();
        for table in &tables {
            match store.summarize(table).await {
                Ok(summary) => {
                    summaries.insert(table.physical_name.clone(), Some(summary));
                }
                Err(e) => {
                    warn!(table = %table.physical_name, error = %e, "table summary failed");
                    summaries.insert(table.physical_name.clone(), None);
                }
            }
        }

        Ok(DatabaseContext { tables, summaries })
    }

    fn load_annotations(&self) -> Result<AnnotationMap> {
        let Some(path) = &self.annotations_path else {
            return Ok(AnnotationMap::new());
        };
        if !Path::new(path).exists() {
            return Ok(AnnotationMap::new());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            AgentError::Context(format!(
                "annotations file {} is not valid JSON: {e}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StaticStore;

    fn sales_schema() -> SchemaFile {
        SchemaFile::parse(
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
        nullable: true
      - name: sale_date
        type: text
"#,
        )
        .unwrap()
    }

    fn sales_summary() -> TableSummary {
        let mut columns = HashMap::new();
        columns.insert(
            "sale_id".to_string(),
            ColumnSummary {
                null_count: 0,
                distinct_count: 4,
                min: Some(1.0),
                max: Some(4.0),
                mean: Some(2.5),
                top_values: None,
            },
        );
        columns.insert(
            "sale_date".to_string(),
            ColumnSummary {
                null_count: 0,
                distinct_count: 3,
                top_values: Some(vec![
                    ("2025-04-11".to_string(), 2),
                    ("2025-04-12".to_string(), 1),
                ]),
                ..Default::default()
            },
        );
        TableSummary {
            row_count: 4,
            columns,
        }
    }

    async fn build_context() -> DatabaseContext {
        let store: Arc<dyn DataStore> =
            Arc::new(StaticStore::new().with_summary("sales", sales_summary()));
        let provider = ContextProvider::from_schema(sales_schema());
        provider.build(&store).await.unwrap()
    }

    #[tokio::test]
    async fn test_lookup_helpers() {
        let ctx = build_context().await;
        assert!(ctx.has_table("sales"));
        assert!(ctx.has_table("SALES"));
        assert!(!ctx.has_table("products"));
        assert!(ctx.has_column("sales", "sale_date"));
        assert!(!ctx.has_column("sales", "category"));
        assert!(ctx.identifiers().contains("amount"));
    }

    #[tokio::test]
    async fn test_render_is_deterministic() {
        let first = build_context().await.render();
        let second = build_context().await.render();
        assert_eq!(first, second);
        assert!(first.contains("--- Table: sales (Model: Sales) ---"));
        assert!(first.contains("Total Rows: 4"));
        assert!(first.contains("'2025-04-11': 2"));
    }

    #[tokio::test]
    async fn test_summary_failure_marks_unavailable() {
        // No summary registered for sales, so the store reports an error
        let store: Arc<dyn DataStore> = Arc::new(StaticStore::new());
        let provider = ContextProvider::from_schema(sales_schema());
        let ctx = provider.build(&store).await.unwrap();
        assert!(ctx.has_table("sales"));
        assert!(ctx.render().contains("Summary: unavailable"));
    }

    #[tokio::test]
    async fn test_tables_sorted_by_physical_name() {
        let schema = SchemaFile::parse(
            r#"
tables:
  - name: Zebra
    columns:
      - name: id
        type: integer
  - name: Apple
    columns:
      - name: id
        type: integer
"#,
        )
        .unwrap();
        let store: Arc<dyn DataStore> = Arc::new(StaticStore::new());
        let ctx = ContextProvider::from_schema(schema)
            .build(&store)
            .await
            .unwrap();
        assert_eq!(ctx.tables[0].physical_name, "apple");
        assert_eq!(ctx.tables[1].physical_name, "zebra");
    }
}
