//! Helpers shared by the concrete tools.

use std::sync::Arc;

use appforge_core::{ForgeError, Result};
use appforge_infrastructure::vm::{Row, VmResult, VmStore};
use serde_json::Value;

/// Rows shown to the model from a single query.
pub const LLM_ROW_LIMIT: usize = 20;

/// Runs a `VmStore` operation on the blocking pool.
pub async fn run_store<T, F>(store: &Arc<VmStore>, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&VmStore) -> VmResult<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| ForgeError::internal(format!("store task failed: {e}")))?
        .map_err(ForgeError::from)
}

/// Keeps the first `limit` rows; the flag tells whether anything was cut.
pub fn truncate_rows(rows: Vec<Row>, limit: usize) -> (Vec<Row>, bool) {
    if rows.len() <= limit {
        return (rows, false);
    }
    let mut rows = rows;
    rows.truncate(limit);
    (rows, true)
}

/// Pretty JSON for tool output; falls back to compact form.
pub fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Shortens text to at most `max` characters, appending an ellipsis.
pub fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}
