use anyhow::{Result, bail};
use appforge_core::config::ForgeConfig;
use appforge_core::workspace::{PageRequest, Workspace};

use super::open_runtime;

pub async fn create(
    config: ForgeConfig,
    workspace_id: &str,
    name: Option<String>,
    owner: &str,
) -> Result<()> {
    let runtime = open_runtime(config)?;
    let result = async {
        if runtime.workspaces.get_workspace(workspace_id).await?.is_some() {
            bail!("workspace '{workspace_id}' already exists");
        }
        let name = name.unwrap_or_else(|| workspace_id.to_string());
        let workspace = runtime
            .workspaces
            .create_workspace(Workspace::new(workspace_id, name, owner))
            .await?;
        Ok::<_, anyhow::Error>(workspace)
    }
    .await;
    runtime.shutdown().await;

    let workspace = result?;
    println!("Created workspace '{}' ({})", workspace.id, workspace.name);
    Ok(())
}

pub async fn list(config: ForgeConfig) -> Result<()> {
    let runtime = open_runtime(config)?;
    let page = runtime
        .workspaces
        .list_workspaces(PageRequest {
            page: 1,
            page_size: 200,
        })
        .await;
    runtime.shutdown().await;

    let page = page?;
    println!("{:<24} {:<10} {:<16} NAME", "ID", "STATUS", "OWNER");
    for ws in &page.items {
        println!(
            "{:<24} {:<10} {:<16} {}",
            ws.id, ws.app_status.to_string(), ws.owner_id, ws.name
        );
    }
    if page.total > page.items.len() {
        println!("({} of {} shown)", page.items.len(), page.total);
    }
    Ok(())
}
