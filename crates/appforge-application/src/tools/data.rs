//! Data layer tools backed by the workspace's SQLite database.

use std::sync::Arc;

use appforge_core::Result;
use appforge_core::tool::{ToolCost, ToolErrorKind, ToolResult};
use appforge_core::workspace::WorkspaceStore;
use appforge_infrastructure::vm::{
    ACCEPTED_COLUMN_TYPES, AlterTableRequest, ColumnDef, CreateTableRequest, IndexDef, Row,
    VmStore,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::context::ToolContext;
use super::support::{LLM_ROW_LIMIT, pretty, run_store, truncate_rows};
use super::tool::{Tool, parse_params, resource};

fn workspace_param() -> Value {
    json!({
        "type": "string",
        "description": "Workspace id (defaults to the current workspace)"
    })
}

fn column_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "type": {
                "type": "string",
                "description": format!("Column type, any case: {}", ACCEPTED_COLUMN_TYPES.join(", "))
            },
            "nullable": {"type": "boolean"},
            "default": {},
            "unique": {"type": "boolean"},
            "primary_key": {"type": "boolean"}
        },
        "required": ["name", "type"]
    })
}

// ============================================================================
// create_table
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateTableParams {
    #[serde(default)]
    workspace_id: Option<String>,
    #[serde(alias = "table_name")]
    name: String,
    columns: Vec<ColumnDef>,
    #[serde(default)]
    primary_key: Vec<String>,
    #[serde(default)]
    indexes: Vec<IndexDef>,
}

pub struct CreateTableTool {
    store: Arc<VmStore>,
}

impl CreateTableTool {
    pub fn new(store: Arc<VmStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateTableTool {
    fn name(&self) -> &str {
        "create_table"
    }

    fn description(&self) -> &str {
        "Create a table in the workspace database. Re-creating an existing table is a no-op. \
         Types: TEXT, INTEGER, REAL, BLOB, BOOLEAN, DATETIME. A single INTEGER primary key auto-increments."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workspace_id": workspace_param(),
                "name": {"type": "string", "description": "Table name"},
                "table_name": {"type": "string", "description": "Alias of name"},
                "columns": {"type": "array", "items": column_schema(), "minItems": 1},
                "primary_key": {"type": "array", "items": {"type": "string"}},
                "indexes": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "columns": {"type": "array", "items": {"type": "string"}},
                            "unique": {"type": "boolean"}
                        },
                        "required": ["columns"]
                    }
                }
            },
            "required": ["columns"]
        })
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::DATABASE)
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: CreateTableParams = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?.to_string();
        let request = CreateTableRequest {
            name: p.name,
            columns: p.columns,
            primary_key: p.primary_key,
            indexes: p.indexes,
        };
        let summary = format!(
            "Table '{}' ready with {} column(s): {}",
            request.name,
            request.columns.len(),
            request
                .columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.column_type.to_uppercase()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let table = request.name.clone();
        run_store(&self.store, move |store| store.create_table(&ws, &request)).await?;
        info!(table = %table, "[Tool:create_table] Table created");
        Ok(ToolResult::ok_with_data(summary, json!({ "table": table })))
    }
}

// ============================================================================
// alter_table
// ============================================================================

#[derive(Debug, Deserialize)]
struct AlterTableParams {
    #[serde(default)]
    workspace_id: Option<String>,
    table_name: String,
    #[serde(flatten)]
    changes: AlterTableRequest,
}

pub struct AlterTableTool {
    store: Arc<VmStore>,
}

impl AlterTableTool {
    pub fn new(store: Arc<VmStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AlterTableTool {
    fn name(&self) -> &str {
        "alter_table"
    }

    fn description(&self) -> &str {
        "Alter a table in one transaction: add columns, rename columns, drop columns (applied in that order)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workspace_id": workspace_param(),
                "table_name": {"type": "string"},
                "add_columns": {"type": "array", "items": column_schema()},
                "alter_columns": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "new_name": {"type": "string"}
                        },
                        "required": ["name", "new_name"]
                    }
                },
                "drop_columns": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["table_name"]
        })
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::DATABASE)
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: AlterTableParams = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?.to_string();
        let output = format!(
            "Table '{}' altered: {} added, {} renamed, {} dropped",
            p.table_name,
            p.changes.add_columns.len(),
            p.changes.alter_columns.len(),
            p.changes.drop_columns.len()
        );
        let table = p.table_name.clone();
        let changes = p.changes;
        run_store(&self.store, move |store| store.alter_table(&ws, &table, &changes)).await?;
        Ok(ToolResult::ok(output))
    }
}

// ============================================================================
// delete_table
// ============================================================================

#[derive(Debug, Deserialize)]
struct TableParams {
    #[serde(default)]
    workspace_id: Option<String>,
    table_name: String,
}

pub struct DeleteTableTool {
    store: Arc<VmStore>,
}

impl DeleteTableTool {
    pub fn new(store: Arc<VmStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteTableTool {
    fn name(&self) -> &str {
        "delete_table"
    }

    fn description(&self) -> &str {
        "Drop a table and all of its rows. Irreversible."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workspace_id": workspace_param(),
                "table_name": {"type": "string"}
            },
            "required": ["table_name"]
        })
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::DATABASE)
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: TableParams = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?.to_string();
        let table = p.table_name.clone();
        run_store(&self.store, move |store| store.drop_table(&ws, &table)).await?;
        warn!(table = %p.table_name, "[Tool:delete_table] Table dropped");
        Ok(ToolResult::ok(format!("Table '{}' deleted", p.table_name)))
    }
}

// ============================================================================
// insert_data
// ============================================================================

#[derive(Debug, Deserialize)]
struct InsertDataParams {
    #[serde(default)]
    workspace_id: Option<String>,
    table_name: String,
    rows: Vec<Row>,
}

pub struct InsertDataTool {
    store: Arc<VmStore>,
}

impl InsertDataTool {
    pub fn new(store: Arc<VmStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for InsertDataTool {
    fn name(&self) -> &str {
        "insert_data"
    }

    fn description(&self) -> &str {
        "Insert rows into a table. Each row is inserted independently; failures are counted and the last error is reported."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workspace_id": workspace_param(),
                "table_name": {"type": "string"},
                "rows": {"type": "array", "items": {"type": "object"}}
            },
            "required": ["table_name", "rows"]
        })
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::DATABASE)
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: InsertDataParams = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?.to_string();
        let table = p.table_name.clone();
        let total = p.rows.len();

        let (inserted, last_error) = run_store(&self.store, move |store| {
            let mut inserted = 0usize;
            let mut last_error = None;
            for row in &p.rows {
                match store.insert_row(&ws, &p.table_name, row) {
                    Ok(_) => inserted += 1,
                    Err(e) => last_error = Some(e.to_string()),
                }
            }
            Ok((inserted, last_error))
        })
        .await?;

        let failed = total - inserted;
        debug!(table = %table, inserted, failed, "[Tool:insert_data] Rows inserted");
        let mut output = format!("Inserted {inserted}/{total} rows into '{table}'");
        if let Some(err) = &last_error {
            output.push_str(&format!("\nLast error: {err}"));
        }
        let data = json!({
            "inserted": inserted,
            "total": total,
            "failed": failed,
            "last_error": last_error,
        });

        if total > 0 && inserted == 0 {
            let error = last_error.unwrap_or_else(|| "no rows inserted".to_string());
            return Ok(ToolResult::failure(ToolErrorKind::SqlError, error)
                .with_output(output)
                .with_data(data));
        }
        Ok(ToolResult::ok_with_data(output, data))
    }
}

// ============================================================================
// update_data
// ============================================================================

#[derive(Debug, Deserialize)]
struct UpdateDataParams {
    #[serde(default)]
    workspace_id: Option<String>,
    table_name: String,
    data: Row,
}

pub struct UpdateDataTool {
    store: Arc<VmStore>,
}

impl UpdateDataTool {
    pub fn new(store: Arc<VmStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateDataTool {
    fn name(&self) -> &str {
        "update_data"
    }

    fn description(&self) -> &str {
        "Update one row. `data` must contain the primary key; the other columns are the new values."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workspace_id": workspace_param(),
                "table_name": {"type": "string"},
                "data": {"type": "object"}
            },
            "required": ["table_name", "data"]
        })
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::DATABASE)
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: UpdateDataParams = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?.to_string();
        let table = p.table_name;
        let mut data = p.data;

        let key = {
            let (ws, table) = (ws.clone(), table.clone());
            run_store(&self.store, move |store| store.primary_key(&ws, &table)).await?
        };
        let Some(id) = data.remove(&key) else {
            return Ok(ToolResult::failure(
                ToolErrorKind::InvalidParameters,
                format!("data must include the primary key column '{key}'"),
            ));
        };
        if data.is_empty() {
            return Ok(ToolResult::failure(
                ToolErrorKind::InvalidParameters,
                "data must include at least one column to update",
            ));
        }

        let mut filter = Row::new();
        filter.insert(key.clone(), id.clone());
        let table_name = table.clone();
        let result = run_store(&self.store, move |store| {
            store.update_rows(&ws, &table_name, &data, &filter)
        })
        .await?;
        Ok(ToolResult::ok_with_data(
            format!(
                "Updated {} row(s) in '{table}' where {key} = {id}",
                result.affected_rows
            ),
            json!({ "affected_rows": result.affected_rows }),
        ))
    }
}

// ============================================================================
// delete_data
// ============================================================================

#[derive(Debug, Deserialize)]
struct DeleteDataParams {
    #[serde(default)]
    workspace_id: Option<String>,
    table_name: String,
    ids: Vec<Value>,
}

pub struct DeleteDataTool {
    store: Arc<VmStore>,
}

impl DeleteDataTool {
    pub fn new(store: Arc<VmStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteDataTool {
    fn name(&self) -> &str {
        "delete_data"
    }

    fn description(&self) -> &str {
        "Delete rows by primary key. Irreversible."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workspace_id": workspace_param(),
                "table_name": {"type": "string"},
                "ids": {"type": "array", "items": {"type": ["string", "integer", "number"]}, "minItems": 1}
            },
            "required": ["table_name", "ids"]
        })
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::DATABASE)
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: DeleteDataParams = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?.to_string();
        let table = p.table_name.clone();
        let result =
            run_store(&self.store, move |store| store.delete_rows(&ws, &table, &p.ids)).await?;
        Ok(ToolResult::ok_with_data(
            format!("Deleted {} row(s) from '{}'", result.affected_rows, p.table_name),
            json!({ "affected_rows": result.affected_rows }),
        ))
    }
}

// ============================================================================
// query_data / query_vm_data
// ============================================================================

#[derive(Debug, Deserialize)]
struct QueryParams {
    #[serde(default)]
    workspace_id: Option<String>,
    sql: String,
    #[serde(default)]
    params: Vec<Value>,
}

/// Runs arbitrary SQL; registered under two names.
pub struct QueryDataTool {
    store: Arc<VmStore>,
    name: &'static str,
    description: &'static str,
}

impl QueryDataTool {
    pub fn query_data(store: Arc<VmStore>) -> Self {
        Self {
            store,
            name: "query_data",
            description: "Run SQL against the workspace database. SELECT results are capped at 20 rows in this response.",
        }
    }

    pub fn query_vm_data(store: Arc<VmStore>) -> Self {
        Self {
            store,
            name: "query_vm_data",
            description: "Run SQL against the database the workspace logic sees. Same as query_data.",
        }
    }
}

#[async_trait]
impl Tool for QueryDataTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workspace_id": workspace_param(),
                "sql": {"type": "string"},
                "params": {"type": "array", "description": "Positional parameters for ? placeholders"}
            },
            "required": ["sql"]
        })
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Free
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::DATABASE)
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: QueryParams = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?.to_string();
        let result =
            run_store(&self.store, move |store| store.execute_sql(&ws, &p.sql, &p.params)).await?;

        if result.columns.is_empty() {
            return Ok(ToolResult::ok_with_data(
                format!("{} row(s) affected", result.affected_rows),
                json!({ "affected_rows": result.affected_rows }),
            ));
        }

        let row_count = result.rows.len();
        let (rows, cut) = truncate_rows(result.rows, LLM_ROW_LIMIT);
        let truncated = cut || result.truncated;
        let rows_json = Value::Array(rows.into_iter().map(Value::Object).collect());
        let mut output = format!("{row_count} row(s)");
        if truncated {
            output.push_str(&format!(" (showing first {LLM_ROW_LIMIT})"));
        }
        output.push('\n');
        output.push_str(&pretty(&rows_json));
        Ok(ToolResult::ok_with_data(
            output,
            json!({
                "columns": result.columns,
                "rows": rows_json,
                "row_count": row_count,
                "truncated": truncated,
                "duration_ms": result.duration_ms,
            }),
        ))
    }
}

// ============================================================================
// get_workspace_info
// ============================================================================

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct WorkspaceInfoParams {
    #[serde(default)]
    workspace_id: Option<String>,
    #[serde(default = "default_true")]
    include_tables: bool,
    #[serde(default)]
    include_stats: bool,
}

pub struct GetWorkspaceInfoTool {
    store: Arc<VmStore>,
    workspaces: Arc<dyn WorkspaceStore>,
}

impl GetWorkspaceInfoTool {
    pub fn new(store: Arc<VmStore>, workspaces: Arc<dyn WorkspaceStore>) -> Self {
        Self { store, workspaces }
    }
}

#[async_trait]
impl Tool for GetWorkspaceInfoTool {
    fn name(&self) -> &str {
        "get_workspace_info"
    }

    fn description(&self) -> &str {
        "Describe the workspace: app status, current version, tables with their columns, optional database stats. Call this before planning."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workspace_id": workspace_param(),
                "include_tables": {"type": "boolean", "default": true},
                "include_stats": {"type": "boolean", "default": false}
            }
        })
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Free
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: WorkspaceInfoParams = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?.to_string();

        let mut info = json!({ "workspace_id": ws });
        if let Some(workspace) = self.workspaces.get_workspace(&ws).await? {
            info["name"] = json!(workspace.name);
            info["app_status"] = json!(workspace.app_status.to_string());
        }
        if let Some(version) = self.workspaces.current_version(&ws).await? {
            info["current_version"] = json!({
                "version": version.version_tag,
                "has_ui_schema": version.has_ui_schema(),
                "has_logic": !version.logic_code.trim().is_empty(),
                "components": version.component_codes.iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
            });
        }

        if p.include_tables {
            let id = ws.clone();
            let tables = run_store(&self.store, move |store| {
                let mut out = Vec::new();
                for table in store.list_tables(&id)? {
                    let schema = store.get_table_schema(&id, &table.name)?;
                    out.push(json!({
                        "name": table.name,
                        "row_count": table.row_count,
                        "primary_key": schema.primary_key,
                        "columns": schema.columns,
                    }));
                }
                Ok(out)
            })
            .await?;
            info["tables"] = Value::Array(tables);
        }

        if p.include_stats {
            let id = ws.clone();
            let stats = run_store(&self.store, move |store| store.get_stats(&id)).await?;
            info["stats"] = serde_json::to_value(stats)?;
        }

        Ok(ToolResult::ok_with_data(pretty(&info), info))
    }
}
