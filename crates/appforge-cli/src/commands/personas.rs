use anyhow::Result;
use appforge_core::config::ForgeConfig;

use super::open_runtime;

pub async fn list(config: ForgeConfig) -> Result<()> {
    let runtime = open_runtime(config)?;
    let mut personas = runtime.personas.list_all();
    runtime.shutdown().await;

    personas.sort_by(|a, b| a.id.cmp(&b.id));
    println!("{:<28} {:<10} {:<8} {:>6}  NAME", "ID", "KIND", "ENABLED", "TOOLS");
    for p in personas {
        let tools = if p.tool_filter.is_empty() {
            "all".to_string()
        } else {
            p.tool_filter.len().to_string()
        };
        let kind = format!("{:?}", p.kind).to_lowercase();
        println!(
            "{:<28} {:<10} {:<8} {:>6}  {}",
            p.id, kind, p.enabled, tools, p.name
        );
    }
    Ok(())
}
