//! Incremental edits of an AppSchema document.
//!
//! Operations are applied in order on a JSON value. An operation that is
//! malformed or changes nothing is skipped, and the caller decides what zero
//! applied operations means.

use serde::Deserialize;
use serde_json::{Map, Value};

/// One edit, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum UiOperation {
    AddPage {
        page: Value,
    },
    UpdatePage {
        page_id: String,
        updates: Map<String, Value>,
    },
    RemovePage {
        page_id: String,
    },
    SetAppName {
        app_name: String,
    },
    SetNavigation {
        navigation: Value,
    },
    UpdateBlock {
        page_id: String,
        block_index: usize,
        block: Value,
    },
}

impl UiOperation {
    pub fn label(&self) -> &'static str {
        match self {
            UiOperation::AddPage { .. } => "add_page",
            UiOperation::UpdatePage { .. } => "update_page",
            UiOperation::RemovePage { .. } => "remove_page",
            UiOperation::SetAppName { .. } => "set_app_name",
            UiOperation::SetNavigation { .. } => "set_navigation",
            UiOperation::UpdateBlock { .. } => "update_block",
        }
    }
}

/// Result of applying a list of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

/// Parses raw operation values; entries that do not parse are reported as skipped.
pub fn parse_operations(raw: &[Value]) -> (Vec<UiOperation>, Vec<String>) {
    let mut ops = Vec::with_capacity(raw.len());
    let mut skipped = Vec::new();
    for (index, value) in raw.iter().enumerate() {
        match serde_json::from_value::<UiOperation>(value.clone()) {
            Ok(op) => ops.push(op),
            Err(e) => skipped.push(format!("#{index}: {e}")),
        }
    }
    (ops, skipped)
}

/// Applies `ops` to `schema` in place.
pub fn apply_operations(schema: &mut Value, ops: &[UiOperation]) -> ApplyReport {
    if !schema.is_object() {
        *schema = Value::Object(Map::new());
    }
    let mut report = ApplyReport::default();
    for (index, op) in ops.iter().enumerate() {
        let label = format!("#{index} {}", op.label());
        if apply_one(schema, op) {
            report.applied.push(label);
        } else {
            report.skipped.push(label);
        }
    }
    report
}

fn apply_one(schema: &mut Value, op: &UiOperation) -> bool {
    match op {
        UiOperation::AddPage { page } => add_page(schema, page),
        UiOperation::UpdatePage { page_id, updates } => update_page(schema, page_id, updates),
        UiOperation::RemovePage { page_id } => remove_page(schema, page_id),
        UiOperation::SetAppName { app_name } => {
            if app_name.trim().is_empty() || schema["app_name"] == app_name.as_str() {
                return false;
            }
            schema["app_name"] = Value::String(app_name.clone());
            true
        }
        UiOperation::SetNavigation { navigation } => {
            if !navigation.is_object() || schema["navigation"] == *navigation {
                return false;
            }
            schema["navigation"] = navigation.clone();
            true
        }
        UiOperation::UpdateBlock {
            page_id,
            block_index,
            block,
        } => {
            let Some(page) = find_page_mut(schema, page_id) else {
                return false;
            };
            match page.get_mut("blocks").and_then(Value::as_array_mut) {
                Some(blocks) if *block_index < blocks.len() && block.is_object() => {
                    blocks[*block_index] = block.clone();
                    true
                }
                _ => false,
            }
        }
    }
}

fn pages_mut(schema: &mut Value) -> Option<&mut Vec<Value>> {
    let pages = schema
        .as_object_mut()?
        .entry("pages")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !pages.is_array() {
        *pages = Value::Array(Vec::new());
    }
    pages.as_array_mut()
}

fn page_id(page: &Value) -> Option<&str> {
    page.get("id").and_then(Value::as_str)
}

fn find_page_mut<'a>(schema: &'a mut Value, id: &str) -> Option<&'a mut Value> {
    schema
        .get_mut("pages")?
        .as_array_mut()?
        .iter_mut()
        .find(|p| page_id(p) == Some(id))
}

fn add_page(schema: &mut Value, page: &Value) -> bool {
    let Some(id) = page_id(page).filter(|id| !id.is_empty()) else {
        return false;
    };
    let Some(pages) = pages_mut(schema) else {
        return false;
    };
    if pages.iter().any(|p| page_id(p) == Some(id)) {
        return false;
    }
    pages.push(page.clone());
    true
}

fn update_page(schema: &mut Value, id: &str, updates: &Map<String, Value>) -> bool {
    let Some(Value::Object(page)) = find_page_mut(schema, id) else {
        return false;
    };
    let mut changed = false;
    for (key, value) in updates.iter().filter(|(k, _)| k.as_str() != "id") {
        if page.get(key) != Some(value) {
            page.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

fn remove_page(schema: &mut Value, id: &str) -> bool {
    let Some(pages) = pages_mut(schema) else {
        return false;
    };
    let before = pages.len();
    pages.retain(|p| page_id(p) != Some(id));
    if pages.len() == before {
        return false;
    }
    if let Some(items) = schema
        .get_mut("navigation")
        .and_then(|n| n.get_mut("items"))
        .and_then(Value::as_array_mut)
    {
        items.retain(|item| item.get("page_id").and_then(Value::as_str) != Some(id));
    }
    if schema.get("default_page").and_then(Value::as_str) == Some(id) {
        if let Some(map) = schema.as_object_mut() {
            map.remove("default_page");
        }
    }
    true
}

/// Page ids of a schema, in order.
pub fn page_ids(schema: &Value) -> Vec<String> {
    schema
        .get("pages")
        .and_then(Value::as_array)
        .map(|pages| {
            pages
                .iter()
                .filter_map(|p| page_id(p).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
