//! Request and result shapes exchanged with `VmStore`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Column types accepted by `create_table` and `alter_table`, case-folded.
pub const ACCEPTED_COLUMN_TYPES: [&str; 6] = ["TEXT", "INTEGER", "REAL", "BLOB", "BOOLEAN", "DATETIME"];

/// Upper bound on rows materialised by a single `execute_sql` call.
pub const MAX_RESULT_ROWS: usize = 1000;

pub type Row = Map<String, Value>;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Literal default; `CURRENT_TIMESTAMP`-style keywords are emitted unquoted
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            nullable: true,
            default: None,
            unique: false,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    #[serde(default)]
    pub name: Option<String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

impl CreateTableRequest {
    /// Primary key columns, from the explicit list or else the per-column flags.
    pub fn primary_key_columns(&self) -> Vec<String> {
        if !self.primary_key.is_empty() {
            return self.primary_key.clone();
        }
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRename {
    pub name: String,
    pub new_name: String,
}

/// Changes applied in a fixed order: add, rename, drop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlterTableRequest {
    #[serde(default)]
    pub add_columns: Vec<ColumnDef>,
    #[serde(default)]
    pub alter_columns: Vec<ColumnRename>,
    #[serde(default)]
    pub drop_columns: Vec<String>,
}

impl AlterTableRequest {
    pub fn is_empty(&self) -> bool {
        self.add_columns.is_empty() && self.alter_columns.is_empty() && self.drop_columns.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub row_count: i64,
    pub column_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub from: String,
    pub table: String,
    pub to: String,
    pub on_update: String,
    pub on_delete: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    pub primary: bool,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    pub indexes: Vec<IndexInfo>,
    pub ddl: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub affected_rows: u64,
    pub total_count: u64,
    pub duration_ms: u64,
    /// Set when more than `MAX_RESULT_ROWS` rows matched
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub last_insert_id: i64,
    pub affected_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub column: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    /// Comparison value; `IN` takes a comma separated list
    #[serde(default)]
    pub value: String,
}

fn default_operator() -> String {
    "=".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub page_size: usize,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub order_dir: Option<String>,
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
    /// `AND` (default) or `OR`
    #[serde(default)]
    pub filter_combinator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowsPage {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub total: u64,
    pub page: usize,
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub table_count: usize,
    pub total_rows: i64,
    pub index_count: i64,
    pub file_size_kb: u64,
    pub journal_mode: String,
}
