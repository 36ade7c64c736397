pub mod config;
pub mod data;
pub mod personas;
pub mod run;
pub mod vm;
pub mod workspace;

use anyhow::{Context, Result};
use appforge_core::config::ForgeConfig;
use appforge_execution::{AppRuntime, DiagnosticEvent};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

pub fn open_runtime(config: ForgeConfig) -> Result<AppRuntime> {
    AppRuntime::build(config).context("failed to start the AppForge runtime")
}

pub fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parses a CLI argument as JSON; anything that is not valid JSON is taken as a string.
pub fn parse_json_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub async fn print_diagnostics(mut rx: UnboundedReceiver<DiagnosticEvent>) {
    while let Some(event) = rx.recv().await {
        if let Ok(line) = serde_json::to_string(&event) {
            eprintln!("diag {line}");
        }
    }
}
