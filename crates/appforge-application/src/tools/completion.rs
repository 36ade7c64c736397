//! `attempt_completion`: the deterministic gate that ends a build.
//!
//! The model may only finish once the stored app passes every check below.

use std::collections::BTreeSet;
use std::sync::Arc;

use appforge_core::Result;
use appforge_core::tool::{ToolCost, ToolErrorKind, ToolResult};
use appforge_core::workspace::WorkspaceStore;
use appforge_infrastructure::vm::{TableInfo, VmStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum::Display;
use tracing::info;

use super::context::ToolContext;
use super::support::run_store;
use super::tool::{Tool, parse_params, resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    NoUiSchema,
    NoPages,
    EmptyPages,
    MissingTable,
    NavOrphan,
    InvalidDefaultPage,
    EmptyTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub message: String,
}

impl ValidationIssue {
    fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Collects every table a block refers to, descending into tab containers.
fn collect_tables(block: &Value, out: &mut BTreeSet<String>) {
    let candidates = [
        block.pointer("/data_source/table"),
        block.pointer("/config/table_name"),
    ];
    for name in candidates.into_iter().flatten().filter_map(Value::as_str) {
        if !name.is_empty() {
            out.insert(name.to_string());
        }
    }
    if block.get("type").and_then(Value::as_str) == Some("tabs_container") {
        let tabs = block
            .pointer("/config/tabs")
            .and_then(Value::as_array)
            .into_iter()
            .flatten();
        for tab in tabs {
            for nested in tab.get("blocks").and_then(Value::as_array).into_iter().flatten() {
                collect_tables(nested, out);
            }
        }
    }
}

/// Tables referenced anywhere in the schema, sorted.
pub fn referenced_tables(schema: &Value) -> BTreeSet<String> {
    let mut tables = BTreeSet::new();
    let pages = schema.get("pages").and_then(Value::as_array).into_iter().flatten();
    for page in pages {
        for block in page.get("blocks").and_then(Value::as_array).into_iter().flatten() {
            collect_tables(block, &mut tables);
        }
    }
    tables
}

fn is_empty_schema(schema: Option<&Value>) -> bool {
    match schema {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

/// Runs the completion checks in order. An empty result means the app is done.
///
/// A missing schema or one without pages stops the run early; the later checks
/// would only repeat the same problem.
pub fn validate_app(schema: Option<&Value>, tables: &[TableInfo]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let Some(schema) = schema.filter(|s| !is_empty_schema(Some(s))) else {
        issues.push(ValidationIssue::new(
            IssueCode::NoUiSchema,
            "No UI schema has been generated. Call generate_ui_schema first.",
        ));
        return issues;
    };

    let pages: Vec<&Value> = schema
        .get("pages")
        .and_then(Value::as_array)
        .map(|p| p.iter().collect())
        .unwrap_or_default();
    if pages.is_empty() {
        issues.push(ValidationIssue::new(
            IssueCode::NoPages,
            "The UI schema has no pages.",
        ));
        return issues;
    }
    let page_ids: BTreeSet<&str> = pages
        .iter()
        .filter_map(|p| p.get("id").and_then(Value::as_str))
        .collect();

    for page in &pages {
        let empty = page
            .get("blocks")
            .and_then(Value::as_array)
            .is_none_or(|b| b.is_empty());
        if empty {
            let id = page.get("id").and_then(Value::as_str).unwrap_or("?");
            issues.push(ValidationIssue::new(
                IssueCode::EmptyPages,
                format!("Page \"{id}\" has no blocks."),
            ));
        }
    }

    let referenced = referenced_tables(schema);
    for table in &referenced {
        if !tables.iter().any(|t| &t.name == table) {
            issues.push(ValidationIssue::new(
                IssueCode::MissingTable,
                format!("Block references table \"{table}\" that does not exist. Create it with create_table."),
            ));
        }
    }

    let nav_items = schema
        .pointer("/navigation/items")
        .and_then(Value::as_array)
        .into_iter()
        .flatten();
    for item in nav_items {
        if let Some(target) = item.get("page_id").and_then(Value::as_str) {
            if !page_ids.contains(target) {
                issues.push(ValidationIssue::new(
                    IssueCode::NavOrphan,
                    format!("Navigation item points at page \"{target}\" which does not exist."),
                ));
            }
        }
    }

    if let Some(default_page) = schema.get("default_page").and_then(Value::as_str) {
        if !default_page.is_empty() && !page_ids.contains(default_page) {
            issues.push(ValidationIssue::new(
                IssueCode::InvalidDefaultPage,
                format!("default_page \"{default_page}\" does not match any page id."),
            ));
        }
    }

    for table in &referenced {
        if let Some(info) = tables.iter().find(|t| &t.name == table) {
            if info.row_count < 1 {
                issues.push(ValidationIssue::new(
                    IssueCode::EmptyTable,
                    format!("Table \"{table}\" has no rows. Insert seed data with insert_data."),
                ));
            }
        }
    }

    issues
}

#[derive(Debug, Deserialize)]
struct CompletionParams {
    #[serde(default)]
    workspace_id: Option<String>,
    #[serde(default)]
    summary: String,
}

pub struct AttemptCompletionTool {
    store: Arc<VmStore>,
    workspaces: Arc<dyn WorkspaceStore>,
}

impl AttemptCompletionTool {
    pub fn new(store: Arc<VmStore>, workspaces: Arc<dyn WorkspaceStore>) -> Self {
        Self { store, workspaces }
    }
}

#[async_trait]
impl Tool for AttemptCompletionTool {
    fn name(&self) -> &str {
        "attempt_completion"
    }

    fn description(&self) -> &str {
        "Validate the app and finish. Fails with a list of issues (missing tables, empty pages, \
         broken navigation, tables without rows) until everything is consistent."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workspace_id": {"type": "string"},
                "summary": {"type": "string", "description": "What was built, for the user"}
            },
            "required": ["summary"]
        })
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Free
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::UI_SCHEMA)
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: CompletionParams = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?.to_string();

        let schema = self
            .workspaces
            .current_version(&ws)
            .await?
            .and_then(|v| v.ui_schema);
        let id = ws.clone();
        let tables = run_store(&self.store, move |store| store.list_tables(&id)).await?;

        let issues = validate_app(schema.as_ref(), &tables);
        if !issues.is_empty() {
            info!(workspace_id = %ws, issues = issues.len(), "[Tool:attempt_completion] Validation failed");
            let listing = issues
                .iter()
                .map(|i| format!("- {i}"))
                .collect::<Vec<_>>()
                .join("\n");
            return Ok(ToolResult::failure(ToolErrorKind::ValidationFailed, "validation failed")
                .with_output(format!(
                    "{} issue(s) must be fixed before completion:\n{listing}",
                    issues.len()
                ))
                .with_data(json!({ "issues": issues })));
        }

        let schema = schema.unwrap_or_default();
        let app_name = schema
            .get("app_name")
            .and_then(Value::as_str)
            .unwrap_or("App")
            .to_string();
        let page_count = schema
            .get("pages")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        let table_count = referenced_tables(&schema).len();
        info!(workspace_id = %ws, pages = page_count, tables = table_count, "[Tool:attempt_completion] App validated");
        Ok(ToolResult::ok_with_data(
            format!(
                "{app_name} is complete: {page_count} page(s), {table_count} table(s) referenced.\n{}",
                p.summary
            ),
            json!({
                "app_name": app_name,
                "pages": page_count,
                "tables": table_count,
                "summary": p.summary,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, rows: i64) -> TableInfo {
        TableInfo {
            name: name.into(),
            row_count: rows,
            column_count: 2,
        }
    }

    fn app() -> Value {
        json!({
            "app_name": "HR",
            "default_page": "home",
            "navigation": {"items": [{"page_id": "home"}]},
            "pages": [{
                "id": "home",
                "blocks": [
                    {"type": "data_table", "config": {"table_name": "employees"}, "data_source": {"table": "employees"}},
                    {"type": "tabs_container", "config": {"tabs": [
                        {"id": "t", "blocks": [{"type": "list", "config": {"table_name": "teams"}}]}
                    ]}}
                ]
            }]
        })
    }

    fn codes(issues: &[ValidationIssue]) -> Vec<IssueCode> {
        issues.iter().map(|i| i.code).collect()
    }

    #[test]
    fn test_valid_app_passes() {
        let issues = validate_app(Some(&app()), &[table("employees", 3), table("teams", 1)]);
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn test_missing_schema_and_pages() {
        assert_eq!(codes(&validate_app(None, &[])), vec![IssueCode::NoUiSchema]);
        assert_eq!(
            codes(&validate_app(Some(&json!({})), &[])),
            vec![IssueCode::NoUiSchema]
        );
        assert_eq!(
            codes(&validate_app(Some(&json!({"pages": []})), &[])),
            vec![IssueCode::NoPages]
        );
    }

    #[test]
    fn test_missing_table_found_inside_tabs() {
        let issues = validate_app(Some(&app()), &[table("employees", 3)]);
        assert_eq!(codes(&issues), vec![IssueCode::MissingTable]);
        assert_eq!(
            issues[0].to_string(),
            "MISSING_TABLE: Block references table \"teams\" that does not exist. Create it with create_table."
        );
    }

    #[test]
    fn test_each_structural_check() {
        let mut doc = app();
        doc["navigation"]["items"] = json!([{"page_id": "ghost"}]);
        doc["default_page"] = json!("nowhere");
        doc["pages"].as_array_mut().unwrap().push(json!({"id": "empty", "blocks": []}));
        let issues = validate_app(Some(&doc), &[table("employees", 0), table("teams", 2)]);
        assert_eq!(
            codes(&issues),
            vec![
                IssueCode::EmptyPages,
                IssueCode::NavOrphan,
                IssueCode::InvalidDefaultPage,
                IssueCode::EmptyTable
            ]
        );
    }
}
