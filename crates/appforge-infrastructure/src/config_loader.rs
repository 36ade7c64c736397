//! Loads `ForgeConfig` from TOML and applies environment overrides.

use std::path::{Path, PathBuf};

use appforge_core::Result;
use appforge_core::config::ForgeConfig;
use tracing::debug;

use crate::paths::ForgePaths;

/// Environment variables consulted after the file is read. First match wins per setting.
pub const ENV_DATA_ROOT: &str = "APPFORGE_DATA_ROOT";
pub const ENV_BASE_URL: [&str; 2] = ["OPENAI_BASE_URL", "LLM_BASE_URL"];
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_MODEL: [&str; 2] = ["AGENT_LLM_MODEL", "OPENAI_MODEL"];
pub const ENV_LOG: &str = "APPFORGE_LOG";

pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    /// A loader for an explicit file, or the default `config.toml` when `None`.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Reads the file (missing = defaults) and applies process environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<ForgeConfig> {
        let mut config = match self.resolve_path() {
            Some(path) => Self::load_file(&path)?,
            None => ForgeConfig::default(),
        };
        apply_env(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    fn resolve_path(&self) -> Option<PathBuf> {
        self.path
            .clone()
            .or_else(|| ForgePaths::config_file().ok())
    }

    /// Parses a TOML config file; a missing or empty file yields defaults.
    pub fn load_file(path: &Path) -> Result<ForgeConfig> {
        if !path.exists() {
            debug!(path = ?path, "[Config] No config file, using defaults");
            return Ok(ForgeConfig::default());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(ForgeConfig::default());
        }
        let config: ForgeConfig = toml::from_str(&content)?;
        debug!(path = ?path, "[Config] Loaded config file");
        Ok(config)
    }
}

/// Applies overrides from `lookup` (normally `std::env::var`).
pub fn apply_env(config: &mut ForgeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(root) = first_set(&lookup, &[ENV_DATA_ROOT]) {
        config.data_root = Some(PathBuf::from(root));
    }
    if let Some(url) = first_set(&lookup, &ENV_BASE_URL) {
        config.llm.base_url = url;
    }
    if let Some(key) = first_set(&lookup, &[ENV_API_KEY]) {
        config.llm.api_key = Some(key);
    }
    if let Some(model) = first_set(&lookup, &ENV_MODEL) {
        config.llm.model = model;
    }
    if let Some(filter) = first_set(&lookup, &[ENV_LOG]) {
        config.logging.filter = filter;
    }
}

fn first_set(lookup: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| lookup(*k).filter(|v| !v.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigLoader::load_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ForgeConfig::default());
    }

    #[test]
    fn test_file_then_env_precedence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[llm]\nmodel = \"from-file\"\nbase_url = \"http://file\"\n\n[engine]\nmax_steps = 7\n",
        )
        .unwrap();
        let mut config = ConfigLoader::load_file(&path).unwrap();
        assert_eq!(config.engine.max_steps, 7);

        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_MODEL", "fallback-model"),
            ("AGENT_LLM_MODEL", "agent-model"),
            ("LLM_BASE_URL", "http://env"),
            ("OPENAI_API_KEY", ""),
        ]);
        apply_env(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.model, "agent-model");
        assert_eq!(config.llm.base_url, "http://env");
        // blank values are ignored
        assert_eq!(config.llm.api_key, None);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine\nmax_steps = ").unwrap();
        assert!(ConfigLoader::load_file(&path).is_err());
    }
}
