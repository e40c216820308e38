//! Orchestrator configuration types and loading.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration, per model tier.
    pub llm: LlmConfig,

    /// Scheduler/concurrency limits.
    pub concurrency: ConcurrencyConfig,

    /// Durable store configuration.
    pub store: StoreConfig,

    /// Git worktree configuration.
    pub git: GitConfig,
}

impl Config {
    /// Load configuration with fallback chain: explicit path, project-local
    /// `.orchestrator.yml`, user config, built-in defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".orchestrator.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("orchestrator").join("orchestrator.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("no config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("failed to parse config file")?;
        tracing::info!("loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration, with one model slot per `store::ModelTier`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "anthropic" is supported).
    pub provider: String,

    /// Model identifier used for `ModelTier::Capable` quests/sessions.
    #[serde(rename = "capable-model")]
    pub capable_model: String,

    /// Model identifier used for `ModelTier::Fast` quests/sessions.
    #[serde(rename = "fast-model")]
    pub fast_model: String,

    /// Environment variable containing the API key.
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL.
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response.
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds.
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Maximum LLM calls per minute across all sessions and the quest
    /// engine, enforced by the sliding-window rate limiter in front of
    /// the client.
    #[serde(rename = "max-calls-per-minute")]
    pub max_calls_per_minute: u32,
}

impl LlmConfig {
    pub fn model_for(&self, tier: store::ModelTier) -> &str {
        match tier {
            store::ModelTier::Capable => &self.capable_model,
            store::ModelTier::Fast => &self.fast_model,
        }
    }

    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .context(format!("environment variable {} is not set", self.api_key_env))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            capable_model: "claude-sonnet-4-20250514".to_string(),
            fast_model: "claude-haiku-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 8192,
            timeout_ms: 120_000,
            max_calls_per_minute: 50,
        }
    }
}

/// Scheduler and per-tier budget envelope limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Maximum number of SessionLoops running at once.
    #[serde(rename = "max-sessions")]
    pub max_sessions: u32,

    /// Maximum concurrent worktree allocations.
    #[serde(rename = "max-worktrees")]
    pub max_worktrees: u32,

    /// Iteration budget for a `ModelTier::Fast` session.
    #[serde(rename = "fast-iteration-budget")]
    pub fast_iteration_budget: u32,

    /// Iteration budget for a `ModelTier::Capable` session.
    #[serde(rename = "capable-iteration-budget")]
    pub capable_iteration_budget: u32,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_sessions: 8, max_worktrees: 8, fast_iteration_budget: 20, capable_iteration_budget: 60 }
    }
}

/// Durable store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the sqlite database file.
    #[serde(rename = "db-path")]
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { db_path: PathBuf::from(".orchestrator/orchestrator.db") }
    }
}

/// Git worktree configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Base directory under which per-objective worktrees are allocated.
    #[serde(rename = "worktree-dir")]
    pub worktree_dir: PathBuf,

    /// Disk quota for worktrees, in GB.
    #[serde(rename = "disk-quota-gb")]
    pub disk_quota_gb: u32,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self { worktree_dir: PathBuf::from("/tmp/orchestrator/worktrees"), disk_quota_gb: 50 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.concurrency.max_sessions, 8);
        assert_eq!(config.store.db_path, PathBuf::from(".orchestrator/orchestrator.db"));
    }

    #[test]
    fn llm_config_model_for_tier() {
        let config = LlmConfig::default();
        assert!(config.model_for(store::ModelTier::Capable).contains("sonnet"));
        assert!(config.model_for(store::ModelTier::Fast).contains("haiku"));
    }

    #[test]
    fn deserialize_config() {
        let yaml = r#"
llm:
  provider: anthropic
  capable-model: claude-opus-4
  fast-model: claude-haiku-4
  api-key-env: MY_API_KEY
  base-url: https://api.example.com
  max-tokens: 4096
  timeout-ms: 60000
  max-calls-per-minute: 30

concurrency:
  max-sessions: 4
  max-worktrees: 4
  fast-iteration-budget: 10
  capable-iteration-budget: 30

store:
  db-path: /data/orchestrator.db

git:
  worktree-dir: /data/worktrees
  disk-quota-gb: 20
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.llm.capable_model, "claude-opus-4");
        assert_eq!(config.llm.api_key_env, "MY_API_KEY");
        assert_eq!(config.concurrency.max_sessions, 4);
        assert_eq!(config.store.db_path, PathBuf::from("/data/orchestrator.db"));
        assert_eq!(config.git.disk_quota_gb, 20);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let yaml = r#"
llm:
  capable-model: claude-haiku
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.llm.capable_model, "claude-haiku");
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.concurrency.max_sessions, 8);
    }
}
