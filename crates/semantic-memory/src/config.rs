//! Configuration for the memory orchestrator

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Step names used when an upload request does not list any
pub const DEFAULT_STEPS: [&str; 4] = ["extract", "partition", "gen_embeddings", "save_records"];

/// Reserved step that removes a document's stored content
pub const DELETE_DOCUMENT_STEP: &str = "private_delete_document";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryConfig {
    /// Index used when callers pass none
    #[serde(default = "default_index")]
    pub default_index: String,
    /// Pipeline execution settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Pipeline state and content storage
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_index: default_index(),
            orchestrator: OrchestratorConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl MemoryConfig {
    /// Load from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Cannot read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate TOML
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| Error::config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        crate::types::clean_index_name(Some(&self.default_index))
            .map_err(|e| Error::config(format!("default_index: {}", e)))?;

        let o = &self.orchestrator;
        if o.default_steps.is_empty() {
            return Err(Error::config("orchestrator.default_steps is empty"));
        }
        if o.deletion_steps.is_empty() {
            return Err(Error::config("orchestrator.deletion_steps is empty"));
        }
        if let Some(step) = o
            .default_steps
            .iter()
            .chain(o.deletion_steps.iter())
            .find(|s| s.trim().is_empty())
        {
            return Err(Error::config(format!("Blank step name '{}'", step)));
        }
        if o.status_poll_interval_ms == 0 {
            return Err(Error::config("orchestrator.status_poll_interval_ms must be > 0"));
        }
        if o.step_timeout_secs == Some(0) {
            return Err(Error::config("orchestrator.step_timeout_secs must be > 0"));
        }
        Ok(())
    }
}

fn default_index() -> String {
    crate::types::DEFAULT_INDEX.to_string()
}

/// Whether import/delete calls wait for the run to finish
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Return after the pipeline reaches a terminal state
    #[default]
    Blocking,
    /// Return once the run is accepted; steps execute on a spawned task
    Background,
}

/// Pipeline execution settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    /// Steps used when an upload request lists none
    #[serde(default = "default_steps")]
    pub default_steps: Vec<String>,
    /// Reserved steps run by a deletion pipeline
    #[serde(default = "default_deletion_steps")]
    pub deletion_steps: Vec<String>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Upper bound for a single handler invocation (none = unbounded)
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,
    /// Polling interval of `wait_for_document`
    #[serde(default = "default_poll_interval")]
    pub status_poll_interval_ms: u64,
}

fn default_steps() -> Vec<String> {
    DEFAULT_STEPS.iter().map(|s| s.to_string()).collect()
}

fn default_deletion_steps() -> Vec<String> {
    vec![DELETE_DOCUMENT_STEP.to_string()]
}

fn default_poll_interval() -> u64 {
    250
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_steps: default_steps(),
            deletion_steps: default_deletion_steps(),
            execution_mode: ExecutionMode::Blocking,
            step_timeout_secs: None,
            status_poll_interval_ms: default_poll_interval(),
        }
    }
}

impl OrchestratorConfig {
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }
}

/// Storage backend for pipeline state and content
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Everything in process memory, lost on exit
    #[default]
    Memory,
    /// SQLite pipeline state plus files on local disk
    Local,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// SQLite database holding pipeline state (local backend)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Root directory for uploaded files and artifacts (local backend)
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/pipelines.db")
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("./data/content")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_path: default_database_path(),
            content_dir: default_content_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MemoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.orchestrator.default_steps.len(), 4);
        assert_eq!(config.orchestrator.deletion_steps, vec![DELETE_DOCUMENT_STEP]);
        assert_eq!(config.orchestrator.execution_mode, ExecutionMode::Blocking);
    }

    #[test]
    fn test_from_toml() {
        let config = MemoryConfig::from_toml_str(
            r#"
            default_index = "kb"

            [orchestrator]
            default_steps = ["extract", "embed"]
            execution_mode = "background"
            step_timeout_secs = 30

            [storage]
            backend = "local"
            database_path = "/tmp/p.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_index, "kb");
        assert_eq!(config.orchestrator.default_steps, vec!["extract", "embed"]);
        assert_eq!(config.orchestrator.execution_mode, ExecutionMode::Background);
        assert_eq!(config.orchestrator.step_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.orchestrator.deletion_steps, vec![DELETE_DOCUMENT_STEP]);
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.storage.database_path, PathBuf::from("/tmp/p.db"));
        assert_eq!(config.storage.content_dir, default_content_dir());
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let err = MemoryConfig::from_toml_str("[orchestrator]\ndefault_steps = []\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = MemoryConfig::from_toml_str("default_index = \"no*way\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err =
            MemoryConfig::from_toml_str("[orchestrator]\nstep_timeout_secs = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert!(MemoryConfig::from_toml_str("default_index = [").is_err());
    }
}
