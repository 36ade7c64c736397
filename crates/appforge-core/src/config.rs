//! Runtime configuration model.
//!
//! Every field has a default so a partial (or missing) config file is valid.
//! Loading and environment overrides live in `appforge-infrastructure`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ForgeConfig {
    /// Root for all persistent state. `None` resolves to the platform data dir.
    pub data_root: Option<PathBuf>,
    pub engine: EngineConfig,
    pub vm: VmConfig,
    pub session: SessionConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub max_steps: usize,
    pub llm_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    /// Deadline for a whole `task` sub-agent run
    pub task_timeout_secs: u64,
    pub llm_max_attempts: u32,
    pub llm_backoff_ms: u64,
    /// Capacity of the per-turn event queue
    pub event_buffer: usize,
    pub max_history_messages: usize,
    /// History length that triggers folding older messages into a digest; 0 disables
    pub compact_threshold: usize,
    /// Messages left verbatim after a compaction
    pub compact_keep_recent: usize,
    pub max_sub_agent_depth: u32,
    /// Hold tools flagged `requires_confirmation` until the user approves them
    pub confirm_destructive: bool,
    pub default_persona: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 25,
            llm_timeout_secs: 120,
            tool_timeout_secs: 60,
            task_timeout_secs: 300,
            llm_max_attempts: 3,
            llm_backoff_ms: 500,
            event_buffer: 256,
            max_history_messages: 80,
            compact_threshold: 60,
            compact_keep_recent: 20,
            max_sub_agent_depth: 2,
            confirm_destructive: false,
            default_persona: "app_builder".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct VmConfig {
    pub pool_capacity: usize,
    pub exec_timeout_ms: u64,
    pub memory_limit_bytes: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 10,
            exec_timeout_ms: 5_000,
            memory_limit_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    pub reap_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            reap_interval_secs: 60,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            max_tokens: 8192,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}
