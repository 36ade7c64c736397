use std::collections::BTreeMap;

use anyhow::{Context, Result};
use appforge_core::config::ForgeConfig;
use appforge_infrastructure::vm::VmRequest;
use serde_json::json;

use super::{open_runtime, parse_json_arg, print_json};

/// Splits `path?a=1&b=2` into the path and its query parameters.
fn split_query(target: &str) -> (String, BTreeMap<String, String>) {
    let Some((path, query)) = target.split_once('?') else {
        return (target.to_string(), BTreeMap::new());
    };
    let params = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect();
    (path.to_string(), params)
}

pub async fn call(
    config: ForgeConfig,
    workspace_id: &str,
    method: &str,
    target: &str,
    body: Option<&str>,
) -> Result<()> {
    let runtime = open_runtime(config)?;
    let (path, query) = split_query(target);
    let mut request = VmRequest::new(method.to_uppercase(), path);
    request.query = query;
    if let Some(body) = body {
        request = request.with_body(parse_json_arg(body));
    }

    let response = match runtime.vm_pool.get_or_create(workspace_id).await {
        Ok(instance) => tokio::task::spawn_blocking(move || instance.handle(&request))
            .await
            .context("VM call panicked"),
        Err(err) => Err(err.into()),
    };
    runtime.shutdown().await;

    let response = response?;
    print_json(&json!({"status": response.status, "body": response.body}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_query() {
        let (path, query) = split_query("/items?status=open&flag");
        assert_eq!(path, "/items");
        assert_eq!(query.get("status").map(String::as_str), Some("open"));
        assert_eq!(query.get("flag").map(String::as_str), Some(""));

        let (path, query) = split_query("/items/7");
        assert_eq!(path, "/items/7");
        assert!(query.is_empty());
    }
}
