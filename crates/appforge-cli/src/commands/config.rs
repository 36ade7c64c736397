use anyhow::{Context, Result};
use appforge_core::config::ForgeConfig;

pub fn show(config: &ForgeConfig) -> Result<()> {
    let mut shown = config.clone();
    if shown.llm.api_key.is_some() {
        shown.llm.api_key = Some("<redacted>".to_string());
    }
    let text = toml::to_string_pretty(&shown).context("failed to render config")?;
    print!("{text}");
    Ok(())
}
