use anyhow::Result;
use appforge_core::config::ForgeConfig;

use super::{open_runtime, parse_json_arg, print_json};

pub async fn tables(config: ForgeConfig, workspace_id: &str) -> Result<()> {
    let runtime = open_runtime(config)?;
    let tables = runtime.vm_store.list_tables(workspace_id);
    runtime.shutdown().await;

    let tables = tables?;
    if tables.is_empty() {
        println!("No tables in workspace '{workspace_id}'");
        return Ok(());
    }
    println!("{:<32} {:>10} {:>8}", "TABLE", "ROWS", "COLUMNS");
    for table in tables {
        println!(
            "{:<32} {:>10} {:>8}",
            table.name, table.row_count, table.column_count
        );
    }
    Ok(())
}

pub async fn sql(config: ForgeConfig, workspace_id: &str, sql: &str, params: &[String]) -> Result<()> {
    let runtime = open_runtime(config)?;
    let params: Vec<_> = params.iter().map(|p| parse_json_arg(p)).collect();
    let result = runtime.vm_store.execute_sql(workspace_id, sql, &params);
    runtime.shutdown().await;

    print_json(&result?)
}
