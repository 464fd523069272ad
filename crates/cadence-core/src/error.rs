use thiserror::Error;

#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("not initialized: run 'cadence init'")]
    NotInitialized,

    #[error("spec not found: {0}")]
    SpecNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("no active session: run 'cadence session start'")]
    SessionNotFound,

    #[error("invalid spec id '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidSpecId(String),

    #[error("schema error for {kind} entry: {reason}")]
    Schema { kind: String, reason: String },

    #[error("graph validation failed: {0}")]
    Validation(String),

    #[error("store at {path} is corrupt: {reason} (restore from an archive or checkpoint)")]
    CorruptStore { path: String, reason: String },

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("task {0} cannot pass without a non-empty artifacts record")]
    IncompleteArtifacts(String),

    #[error("graph schema version '{version}' does not support {operation}")]
    UnsupportedVersion { version: String, operation: String },

    #[error("invalid phase: {0}")]
    InvalidPhase(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CadenceError>;
