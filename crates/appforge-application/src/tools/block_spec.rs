//! `get_block_spec`: on-demand reference for AppSchema block types.
//!
//! The catalog stays out of the system prompt; the model fetches one entry at a
//! time before emitting a block of that type.

use appforge_core::Result;
use appforge_core::tool::{ToolCost, ToolErrorKind, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use super::context::ToolContext;
use super::tool::{Tool, parse_params};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum BlockType {
    StatsCard,
    DataTable,
    Form,
    Chart,
    DetailView,
    Markdown,
    Image,
    Hero,
    TabsContainer,
    List,
    Divider,
    CustomCode,
    Auth,
    FileUpload,
    Calendar,
    FormDialog,
}

/// Reference entry for one block type.
pub struct BlockSpec {
    pub title: &'static str,
    /// `(field, meaning)` pairs of the `config` object
    pub config: &'static [(&'static str, &'static str)],
    /// Fields of `data_source`, empty for static blocks
    pub data_source: &'static [(&'static str, &'static str)],
    pub example: &'static str,
}

impl BlockType {
    pub fn names() -> Vec<String> {
        Self::iter().map(|t| t.to_string()).collect()
    }

    /// True for blocks that read rows from a table.
    pub fn is_data_bound(self) -> bool {
        !self.spec().data_source.is_empty()
    }

    pub fn spec(self) -> BlockSpec {
        match self {
            BlockType::StatsCard => BlockSpec {
                title: "KPI card showing one aggregated number",
                config: &[
                    ("label", "string, required. Caption under the number"),
                    ("value_key", "string, required. Alias from the aggregation to display"),
                    ("format", "number | currency | percent"),
                    ("color", "blue | green | amber | red"),
                    ("icon", "Lucide icon name, e.g. Users"),
                ],
                data_source: &[
                    ("table", "string, required"),
                    ("aggregation", "[{function: count|sum|avg, column, alias}], required"),
                    ("where", "optional SQL filter"),
                ],
                example: r#"{"id":"stat_open_orders","type":"stats_card","config":{"label":"Open orders","value_key":"total","format":"number","color":"blue","icon":"Package"},"data_source":{"table":"orders","aggregation":[{"function":"count","column":"*","alias":"total"}],"where":"status = 'open'"}}"#,
            },
            BlockType::DataTable => BlockSpec {
                title: "Table with search, paging and row actions",
                config: &[
                    ("table_name", "string, required"),
                    ("columns", "[{key, label, type: text|number|date|boolean|badge|lookup, sortable, width}], required. lookup columns add lookup_table, lookup_key, display_key"),
                    ("actions", "subset of create, edit, delete, view"),
                    ("search_enabled", "boolean; search_key picks the searched column"),
                    ("pagination", "boolean; page_size defaults to 20"),
                    ("row_click_action", "{type: navigate, page_id, params: {param: column}}"),
                    ("status_actions", "[{label, from_status[], to_status, status_column, color, confirm}]"),
                ],
                data_source: &[
                    ("table", "string, required. Same as config.table_name"),
                    ("order_by", "[{column, direction}]"),
                    ("where", "optional SQL filter"),
                    ("limit", "optional row cap"),
                ],
                example: r##"{"id":"orders_table","type":"data_table","config":{"table_name":"orders","columns":[{"key":"id","label":"#","type":"number"},{"key":"customer","label":"Customer","sortable":true},{"key":"status","label":"Status","type":"badge"}],"actions":["create","edit","delete"],"search_enabled":true,"search_key":"customer","pagination":true},"data_source":{"table":"orders","order_by":[{"column":"id","direction":"DESC"}]}}"##,
            },
            BlockType::Form => BlockSpec {
                title: "Inline form that inserts or edits a row",
                config: &[
                    ("table_name", "string, required"),
                    ("fields", "[{name, label, type: text|number|email|textarea|select|checkbox|date|datetime|password|url|tel, required, options[], default_value}], required"),
                    ("title", "heading"),
                    ("submit_label", "button text, default Submit"),
                    ("mode", "create | edit; edit reads record_id_param from the page"),
                ],
                data_source: &[],
                example: r#"{"id":"new_customer","type":"form","config":{"title":"New customer","table_name":"customers","fields":[{"name":"name","label":"Name","type":"text","required":true},{"name":"tier","label":"Tier","type":"select","options":["free","pro"]}],"submit_label":"Save"}}"#,
            },
            BlockType::Chart => BlockSpec {
                title: "Bar, line, pie or area chart",
                config: &[
                    ("chart_type", "bar | line | pie | area, required"),
                    ("x_key", "category column"),
                    ("y_key", "value column"),
                    ("category_key", "pie only; rows are counted per value"),
                    ("title", "heading"),
                    ("height", "pixels"),
                ],
                data_source: &[
                    ("table", "string, required"),
                    ("order_by", "optional, e.g. \"amount DESC\""),
                    ("limit", "optional row cap"),
                ],
                example: r#"{"id":"status_pie","type":"chart","config":{"chart_type":"pie","title":"Orders by status","category_key":"status"},"data_source":{"table":"orders"}}"#,
            },
            BlockType::DetailView => BlockSpec {
                title: "Read-only view of one record",
                config: &[
                    ("table_name", "string, required"),
                    ("record_id_param", "page parameter holding the id"),
                    ("record_id_key", "id column, default id"),
                    ("fields", "[{key, label, type}]"),
                ],
                data_source: &[],
                example: r#"{"id":"order_detail","type":"detail_view","config":{"table_name":"orders","record_id_param":"record_id","fields":[{"key":"customer","label":"Customer"},{"key":"status","label":"Status","type":"badge"}]}}"#,
            },
            BlockType::Markdown => BlockSpec {
                title: "Static markdown text",
                config: &[("content", "string, required")],
                data_source: &[],
                example: r###"{"id":"intro","type":"markdown","config":{"content":"## Welcome\nUse the sidebar to move between pages."}}"###,
            },
            BlockType::Image => BlockSpec {
                title: "Single image",
                config: &[
                    ("src", "URL, required"),
                    ("alt", "alt text"),
                    ("object_fit", "cover | contain | fill"),
                    ("caption", "text under the image"),
                ],
                data_source: &[],
                example: r#"{"id":"logo","type":"image","config":{"src":"https://example.com/logo.png","alt":"Logo","object_fit":"contain"}}"#,
            },
            BlockType::Hero => BlockSpec {
                title: "Banner with heading and call-to-action buttons",
                config: &[
                    ("title", "string, required"),
                    ("subtitle", "string"),
                    ("align", "left | center | right"),
                    ("actions", "[{label, href, variant: default|outline}]"),
                ],
                data_source: &[],
                example: r##"{"id":"banner","type":"hero","config":{"title":"Inventory","subtitle":"Stock at a glance","align":"center","actions":[{"label":"Add item","href":"#items"}]}}"##,
            },
            BlockType::TabsContainer => BlockSpec {
                title: "Tabs, each holding its own blocks",
                config: &[
                    ("tabs", "[{id, label, blocks[]}], required. Nested blocks follow the same rules"),
                    ("default_tab", "id of the initially open tab"),
                ],
                data_source: &[],
                example: r##"{"id":"order_tabs","type":"tabs_container","config":{"tabs":[{"id":"open","label":"Open","blocks":[{"id":"t1","type":"data_table","config":{"table_name":"orders","columns":[{"key":"id","label":"#"}]},"data_source":{"table":"orders","where":"status = 'open'"}}]}],"default_tab":"open"}}"##,
            },
            BlockType::List => BlockSpec {
                title: "List or card grid of rows",
                config: &[
                    ("table_name", "string, required"),
                    ("title_key", "string, required"),
                    ("subtitle_key", "column"),
                    ("badge_key", "column"),
                    ("layout", "list | grid; columns sets the grid width"),
                    ("empty_message", "text when there are no rows"),
                ],
                data_source: &[("table", "string, required"), ("order_by", "optional"), ("limit", "optional")],
                example: r#"{"id":"product_list","type":"list","config":{"table_name":"products","title_key":"name","subtitle_key":"category","layout":"grid","columns":3},"data_source":{"table":"products","limit":12}}"#,
            },
            BlockType::Divider => BlockSpec {
                title: "Horizontal separator",
                config: &[
                    ("label", "optional centred text"),
                    ("style", "solid | dashed | dotted"),
                    ("spacing", "sm | md | lg"),
                ],
                data_source: &[],
                example: r#"{"id":"sep","type":"divider","config":{"label":"History","style":"dashed"}}"#,
            },
            BlockType::CustomCode => BlockSpec {
                title: "JavaScript widget rendered in a sandboxed iframe",
                config: &[
                    ("code", "string, required. Renders into ROOT; fetched data is in DATA"),
                    ("api_source", "optional {path, method} served by the workspace logic"),
                    ("min_height", "pixels"),
                    ("max_height", "pixels"),
                ],
                data_source: &[],
                example: r#"{"id":"clock","type":"custom_code","config":{"code":"ROOT.textContent = new Date().toLocaleTimeString();","min_height":60}}"#,
            },
            BlockType::Auth => BlockSpec {
                title: "Login and registration panel",
                config: &[
                    ("show_register", "boolean, default true"),
                    ("redirect_page", "page id opened after login"),
                ],
                data_source: &[],
                example: r#"{"id":"login","type":"auth","config":{"show_register":false,"redirect_page":"home"}}"#,
            },
            BlockType::FileUpload => BlockSpec {
                title: "Drag-and-drop upload area",
                config: &[
                    ("accept", "MIME list, e.g. image/*,.pdf"),
                    ("max_size_mb", "number"),
                    ("multiple", "boolean"),
                    ("prefix", "storage path prefix"),
                ],
                data_source: &[],
                example: r#"{"id":"receipts","type":"file_upload","config":{"accept":"image/*,.pdf","max_size_mb":10,"multiple":true,"prefix":"receipts/"}}"#,
            },
            BlockType::Calendar => BlockSpec {
                title: "Month or week calendar of dated rows",
                config: &[
                    ("table_name", "string, required"),
                    ("title_key", "string, required"),
                    ("start_key", "date column, required"),
                    ("end_key", "optional end column for ranges"),
                    ("status_key", "optional column used for colouring"),
                    ("default_view", "month | week"),
                ],
                data_source: &[("table", "string, required")],
                example: r#"{"id":"bookings_cal","type":"calendar","config":{"table_name":"bookings","title_key":"guest","start_key":"check_in","end_key":"check_out","default_view":"month"},"data_source":{"table":"bookings"}}"#,
            },
            BlockType::FormDialog => BlockSpec {
                title: "Button that opens a modal form",
                config: &[
                    ("trigger_label", "string, required"),
                    ("table_name", "string, required"),
                    ("fields", "same shape as form.fields, required"),
                    ("title", "dialog heading"),
                    ("dialog_size", "sm | md | lg"),
                    ("submit_label", "button text"),
                ],
                data_source: &[],
                example: r#"{"id":"add_task","type":"form_dialog","config":{"trigger_label":"Add task","title":"New task","table_name":"tasks","fields":[{"name":"title","label":"Title","type":"text","required":true}]}}"#,
            },
        }
    }
}

impl BlockSpec {
    /// Markdown rendering returned to the model.
    pub fn render(&self, block_type: BlockType) -> String {
        let mut out = format!("## {block_type}: {}\n\nconfig:\n", self.title);
        for (field, meaning) in self.config {
            out.push_str(&format!("- {field}: {meaning}\n"));
        }
        if !self.data_source.is_empty() {
            out.push_str("\ndata_source:\n");
            for (field, meaning) in self.data_source {
                out.push_str(&format!("- {field}: {meaning}\n"));
            }
        }
        let example = serde_json::from_str::<Value>(self.example)
            .ok()
            .and_then(|v| serde_json::to_string_pretty(&v).ok())
            .unwrap_or_else(|| self.example.to_string());
        out.push_str(&format!("\nExample:\n```json\n{example}\n```\n"));
        out
    }
}

#[derive(Debug, Deserialize)]
struct BlockSpecParams {
    block_type: String,
}

pub struct GetBlockSpecTool;

#[async_trait]
impl Tool for GetBlockSpecTool {
    fn name(&self) -> &str {
        "get_block_spec"
    }

    fn description(&self) -> &str {
        "Get the config reference and an example JSON for one block type. Call it before writing a block you have not used yet."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "block_type": {"type": "string", "enum": BlockType::names()}
            },
            "required": ["block_type"]
        })
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Free
    }

    async fn execute(&self, _ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: BlockSpecParams = parse_params(params)?;
        let Ok(block_type) = p.block_type.parse::<BlockType>() else {
            return Ok(ToolResult::failure(
                ToolErrorKind::InvalidParameters,
                format!(
                    "unknown block type {:?}; available: {}",
                    p.block_type,
                    BlockType::names().join(", ")
                ),
            ));
        };
        Ok(ToolResult::ok(block_type.spec().render(block_type)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_sixteen_types_with_valid_examples() {
        let names = BlockType::names();
        assert_eq!(names.len(), 16);
        for block_type in BlockType::iter() {
            let spec = block_type.spec();
            let example: Value = serde_json::from_str(spec.example)
                .unwrap_or_else(|e| panic!("{block_type} example: {e}"));
            assert_eq!(example["type"], block_type.to_string());
        }
    }

    #[test]
    fn test_data_bound_blocks() {
        assert!(BlockType::DataTable.is_data_bound());
        assert!(!BlockType::Markdown.is_data_bound());
    }

    #[tokio::test]
    async fn test_unknown_block_type() {
        let ctx = ToolContext::new("ws", "u");
        let ok = GetBlockSpecTool
            .execute(&ctx, json!({"block_type": "calendar"}))
            .await
            .unwrap();
        assert!(ok.output.contains("start_key"));

        let err = GetBlockSpecTool
            .execute(&ctx, json!({"block_type": "carousel"}))
            .await
            .unwrap();
        assert!(!err.success);
    }
}
