use crate::error::{CadenceError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Live entry count above which `archive()` starts moving old entries out.
    #[serde(default = "default_max_live_entries")]
    pub max_live_entries: usize,
    /// Entries older than this many days are eligible for archival.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_live_entries: default_max_live_entries(),
            max_age_days: default_max_age_days(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// How many checkpoints to retain; the oldest is deleted on overflow.
    #[serde(default = "default_retain")]
    pub retain: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            retain: default_retain(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Abort the run once this many consecutive tasks end up blocked.
    #[serde(default = "default_abort_after_blocked")]
    pub abort_after_blocked: usize,
    /// Extra attempts after the first worker failure or timeout.
    #[serde(default = "default_worker_retries")]
    pub worker_retries: u32,
    /// Subprocess command for the default process worker (JSON over stdio).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_command: Option<String>,
    /// Shell command for full verification (build/test). Exit 0 = pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_command: Option<String>,
    /// Worker wall-clock budget in minutes, passed to worker implementations.
    #[serde(default = "default_worker_timeout_minutes")]
    pub worker_timeout_minutes: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            abort_after_blocked: default_abort_after_blocked(),
            worker_retries: default_worker_retries(),
            worker_command: None,
            verify_command: None,
            worker_timeout_minutes: default_worker_timeout_minutes(),
        }
    }
}

fn default_max_live_entries() -> usize {
    500
}

fn default_max_age_days() -> i64 {
    30
}

fn default_retain() -> usize {
    10
}

fn default_abort_after_blocked() -> usize {
    3
}

fn default_worker_retries() -> u32 {
    1
}

fn default_worker_timeout_minutes() -> u32 {
    45
}

fn default_version() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: String,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub checkpoints: CheckpointConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Codebase reference docs, filtered per task file scope when building
    /// worker context bundles.
    #[serde(default)]
    pub references: Vec<String>,
    /// Standards docs included in every worker bundle for matching scopes.
    #[serde(default)]
    pub standards: Vec<String>,
}

impl EngineConfig {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: project.into(),
            archive: ArchiveConfig::default(),
            checkpoints: CheckpointConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            references: Vec::new(),
            standards: Vec::new(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(CadenceError::NotInitialized);
        }
        crate::io::read_yaml(&path)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        crate::io::atomic_write_yaml(&paths::config_path(root), self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
