use std::path::PathBuf;

use anyhow::Result;
use appforge_execution::{DiagnosticsLayer, init_tracing};
use appforge_infrastructure::ConfigLoader;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "appforge")]
#[command(about = "AppForge CLI - drive the app-building agent against a local data root", long_about = None)]
struct Cli {
    /// Config file (defaults to <config_dir>/appforge/config.toml)
    #[arg(long, global = true, env = "APPFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `data_root` from the config
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Mirror engine diagnostics to stderr as JSON lines
    #[arg(long, global = true)]
    diagnostics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one agent turn and print its events as SSE frames
    Run(commands::run::RunArgs),
    /// Manage workspaces
    Workspace {
        #[command(subcommand)]
        action: WorkspaceAction,
    },
    /// List the tables of a workspace
    Tables {
        workspace: String,
    },
    /// Run SQL against a workspace database
    Sql {
        workspace: String,
        sql: String,
        /// Positional parameters, each parsed as JSON (bare words become strings)
        #[arg(long = "param")]
        params: Vec<String>,
    },
    /// Call a route of the workspace's deployed logic
    Call {
        workspace: String,
        method: String,
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
    /// List registered personas
    Personas,
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Subcommand)]
enum WorkspaceAction {
    /// Create a workspace
    Create {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "local")]
        owner: String,
    },
    /// List workspaces
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::new(cli.config).load()?;
    if let Some(root) = cli.data_root {
        config.data_root = Some(root);
    }

    let diagnostics = if cli.diagnostics {
        let (layer, rx) = DiagnosticsLayer::channel();
        tokio::spawn(commands::print_diagnostics(rx));
        Some(layer)
    } else {
        None
    };
    init_tracing(&config.logging, diagnostics)?;

    match cli.command {
        Commands::Run(args) => commands::run::run(config, args).await?,
        Commands::Workspace { action } => match action {
            WorkspaceAction::Create { id, name, owner } => {
                commands::workspace::create(config, &id, name, &owner).await?
            }
            WorkspaceAction::List => commands::workspace::list(config).await?,
        },
        Commands::Tables { workspace } => commands::data::tables(config, &workspace).await?,
        Commands::Sql {
            workspace,
            sql,
            params,
        } => commands::data::sql(config, &workspace, &sql, &params).await?,
        Commands::Call {
            workspace,
            method,
            path,
            body,
        } => commands::vm::call(config, &workspace, &method, &path, body.as_deref()).await?,
        Commands::Personas => commands::personas::list(config).await?,
        Commands::Config => commands::config::show(&config)?,
    }

    Ok(())
}
