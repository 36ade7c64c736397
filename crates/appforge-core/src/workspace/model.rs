//! Workspace and version domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

/// Publication state of a workspace app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AppStatus {
    #[default]
    Draft,
    Published,
}

/// A logical tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    #[serde(default)]
    pub app_status: AppStatus,
    /// Latest version; `None` until the first artifact is written
    #[serde(default)]
    pub current_version_id: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(id: impl Into<String>, name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            owner_id: owner_id.into(),
            app_status: AppStatus::Draft,
            current_version_id: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Frontend component code stored on a version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentCode {
    pub name: String,
    pub code: String,
    pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot of a workspace's declarative artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceVersion {
    pub id: String,
    pub workspace_id: String,
    /// 1-based sequence number within the workspace
    pub number: u32,
    /// Human-readable tag, `v<number>`
    pub version_tag: String,
    #[serde(default)]
    pub ui_schema: Option<Value>,
    #[serde(default)]
    pub logic_code: String,
    #[serde(default)]
    pub component_codes: Vec<ComponentCode>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl WorkspaceVersion {
    /// True when the UI schema is present and not an empty object.
    pub fn has_ui_schema(&self) -> bool {
        match &self.ui_schema {
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }

    pub fn component(&self, name: &str) -> Option<&ComponentCode> {
        self.component_codes.iter().find(|c| c.name == name)
    }
}

/// Changes for a new version. `None` fields are carried over from the current version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionDraft {
    pub ui_schema: Option<Value>,
    pub logic_code: Option<String>,
    pub component_codes: Option<Vec<ComponentCode>>,
}

impl VersionDraft {
    pub fn ui_schema(schema: Value) -> Self {
        Self {
            ui_schema: Some(schema),
            ..Default::default()
        }
    }

    pub fn logic_code(code: impl Into<String>) -> Self {
        Self {
            logic_code: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn component_codes(components: Vec<ComponentCode>) -> Self {
        Self {
            component_codes: Some(components),
            ..Default::default()
        }
    }

    /// Builds the next version on top of `base`.
    pub fn apply(
        self,
        base: Option<&WorkspaceVersion>,
        workspace_id: &str,
        created_by: &str,
    ) -> WorkspaceVersion {
        let number = base.map(|v| v.number + 1).unwrap_or(1);
        WorkspaceVersion {
            id: uuid::Uuid::new_v4().to_string(),
            workspace_id: workspace_id.to_string(),
            number,
            version_tag: format!("v{number}"),
            ui_schema: self
                .ui_schema
                .or_else(|| base.and_then(|v| v.ui_schema.clone())),
            logic_code: self
                .logic_code
                .or_else(|| base.map(|v| v.logic_code.clone()))
                .unwrap_or_default(),
            component_codes: self
                .component_codes
                .or_else(|| base.map(|v| v.component_codes.clone()))
                .unwrap_or_default(),
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Page request for listing operations (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl PageRequest {
    pub fn offset(&self) -> usize {
        self.page.max(1).saturating_sub(1) * self.page_size
    }

    /// Slices an already-ordered list into this page.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Page<T> {
        let start = self.offset().min(items.len());
        let end = (start + self.page_size).min(items.len());
        Page {
            items: items[start..end].to_vec(),
            total: items.len(),
            page: self.page.max(1),
            page_size: self.page_size,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_draft_carries_over_untouched_artifacts() {
        let first = VersionDraft::logic_code("exports.routes = {};").apply(None, "ws", "u");
        assert_eq!(first.number, 1);
        assert_eq!(first.version_tag, "v1");

        let second = VersionDraft::ui_schema(json!({"pages": []})).apply(Some(&first), "ws", "u");
        assert_eq!(second.number, 2);
        assert_eq!(second.logic_code, "exports.routes = {};");
        assert!(second.has_ui_schema());
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_empty_object_is_not_a_schema() {
        let version = VersionDraft::ui_schema(json!({})).apply(None, "ws", "u");
        assert!(!version.has_ui_schema());
    }

    #[test]
    fn test_page_slice() {
        let items: Vec<u32> = (1..=7).collect();
        let page = PageRequest { page: 2, page_size: 3 }.slice(&items);
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total, 7);
        let empty = PageRequest { page: 4, page_size: 3 }.slice(&items);
        assert!(empty.items.is_empty());
    }
}
