//! Schema description file parsing.
//!
//! The schema file is the source of truth for what tables and columns exist.
//! It is a YAML document listing tables with ordered, typed columns and
//! inter-table relations:
//!
//! ```yaml
//! tables:
//!   - name: Sales
//!     table: sales
//!     columns:
//!       - name: sale_id
//!         type: integer
//!       - name: product_id
//!         type: integer
//!         nullable: true
//!         references: products.product_id
//! ```
//!
//! `name` is the logical (model) name; `table` is the physical name used in
//! SQL and defaults to the lowercased logical name.

use std::path::Path;

use serde::Deserialize;

use crate::error::{AgentError, Result};

/// Parsed schema description file
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaFile {
    pub tables: Vec<TableDef>,
}

/// One table in the schema file
#[derive(Debug, Clone, Deserialize)]
pub struct TableDef {
    /// Logical (model) name
    pub name: String,
    /// Physical table name; defaults to the lowercased logical name
    #[serde(default)]
    pub table: Option<String>,
    /// Columns in declared order
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn physical_name(&self) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| self.name.to_lowercase())
    }
}

/// One column in a table definition
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: String,
    #[serde(default)]
    pub nullable: bool,
    /// Relation target in `table.column` form
    #[serde(default)]
    pub references: Option<String>,
}

impl SchemaFile {
    /// Load and parse a schema file from disk.
    ///
    /// A missing or unreadable file is fatal for the turn that needs it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Context(format!("schema file {} unreadable: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Parse schema YAML.
    pub fn parse(content: &str) -> Result<Self> {
        let schema: SchemaFile = serde_yaml::from_str(content)
            .map_err(|e| AgentError::Context(format!("schema file is not valid YAML: {e}")))?;
        if schema.tables.is_empty() {
            return Err(AgentError::Context("schema file defines no tables".into()));
        }
        Ok(schema)
    }
}
