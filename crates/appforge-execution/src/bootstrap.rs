//! Process wiring: builds every long-lived component from a `ForgeConfig`.

use std::sync::Arc;
use std::time::Duration;

use appforge_application::tools::{ToolDeps, build_registry};
use appforge_application::{PersonaRegistry, SessionManager};
use appforge_core::Result;
use appforge_core::config::ForgeConfig;
use appforge_core::workspace::WorkspaceStore;
use appforge_infrastructure::vm::StoreCodeLoader;
use appforge_infrastructure::{ForgePaths, JsonFileWorkspaceStore, VmPool, VmStore};
use appforge_interaction::{LlmClient, OpenAiClient, RetryPolicy, RetryingLlmClient};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::{Engine, EngineParts};

/// Everything a transport needs to serve turns.
pub struct AppRuntime {
    pub config: ForgeConfig,
    pub paths: ForgePaths,
    pub vm_store: Arc<VmStore>,
    pub vm_pool: Arc<VmPool>,
    pub workspaces: Arc<dyn WorkspaceStore>,
    pub personas: Arc<PersonaRegistry>,
    pub sessions: Arc<SessionManager>,
    pub engine: Arc<Engine>,
    shutdown: CancellationToken,
    reaper: Option<JoinHandle<()>>,
}

impl AppRuntime {
    /// Wires the runtime against the configured OpenAI-compatible endpoint.
    ///
    /// # Errors
    ///
    /// Fails when the data directories cannot be created or the HTTP client
    /// cannot be built.
    pub fn build(config: ForgeConfig) -> Result<Self> {
        let client = OpenAiClient::from_config(&config.llm)?;
        info!(model = client.model(), base_url = %config.llm.base_url, "[Bootstrap] LLM client ready");
        Self::with_llm(config, Arc::new(client))
    }

    /// Wires the runtime around an explicit LLM client, wrapped in the retry policy.
    ///
    /// # Errors
    ///
    /// Fails when the data directories cannot be created.
    pub fn with_llm(config: ForgeConfig, llm: Arc<dyn LlmClient>) -> Result<Self> {
        let paths = ForgePaths::resolve(config.data_root.as_deref())?;
        paths.ensure_dirs()?;

        let vm_store = Arc::new(VmStore::new(paths.vm_dir()));
        let workspaces: Arc<dyn WorkspaceStore> =
            Arc::new(JsonFileWorkspaceStore::new(paths.workspaces_dir())?);
        let loader = Arc::new(StoreCodeLoader::new(Arc::clone(&workspaces)));
        let vm_pool = Arc::new(VmPool::new(
            Arc::clone(&vm_store),
            loader,
            config.vm.clone(),
        ));
        let personas = Arc::new(PersonaRegistry::with_presets());
        let sessions = Arc::new(SessionManager::new(&config.session));

        let tools = build_registry(&ToolDeps {
            vm_store: Arc::clone(&vm_store),
            vm_pool: Arc::clone(&vm_pool),
            workspaces: Arc::clone(&workspaces),
            personas: Arc::clone(&personas),
            config: config.engine.clone(),
        });
        let llm: Arc<dyn LlmClient> = Arc::new(RetryingLlmClient::new(
            llm,
            RetryPolicy::from_config(&config.engine),
        ));
        let engine = Engine::new(EngineParts {
            llm,
            tools: Arc::clone(&tools),
            personas: Arc::clone(&personas),
            sessions: Arc::clone(&sessions),
            config: config.engine.clone(),
        });
        info!(
            data_root = %paths.data_root().display(),
            tools = tools.len(),
            personas = personas.list_all().len(),
            "[Bootstrap] Runtime ready"
        );

        Ok(Self {
            config,
            paths,
            vm_store,
            vm_pool,
            workspaces,
            personas,
            sessions,
            engine,
            shutdown: CancellationToken::new(),
            reaper: None,
        })
    }

    /// Starts the idle-session reaper. Requires a running tokio runtime.
    pub fn start_background(&mut self) {
        if self.reaper.is_some() {
            return;
        }
        let interval = Duration::from_secs(self.config.session.reap_interval_secs.max(1));
        self.reaper = Some(
            self.sessions
                .spawn_reaper(interval, self.shutdown.child_token()),
        );
    }

    /// Stops background work and closes every VM and database handle.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(reaper) = self.reaper.take() {
            let _ = reaper.await;
        }
        self.vm_pool.close();
        self.vm_store.close();
        info!("[Bootstrap] Runtime stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_interaction::ScriptedLlmClient;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_runtime_wires_every_tool() {
        let dir = TempDir::new().unwrap();
        let config = ForgeConfig {
            data_root: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let mut runtime =
            AppRuntime::with_llm(config, Arc::new(ScriptedLlmClient::default())).unwrap();
        runtime.start_background();

        assert!(dir.path().join("vm").is_dir());
        assert!(dir.path().join("workspaces").is_dir());
        for tool in ["create_table", "batch", "task", "attempt_completion", "publish_app"] {
            assert!(runtime.engine.tools().contains(tool), "{tool}");
        }
        runtime.shutdown().await;
    }
}
