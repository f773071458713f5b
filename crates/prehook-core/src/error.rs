//! Error taxonomy for prehook.

use std::time::Duration;

/// Errors produced by a capability lookup.
///
/// Kept separate from [`PrehookError`] because entries are cached and the same
/// error value is handed to every caller until the entry expires.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapabilityError {
    #[error("build target '{name}' not found in build configuration")]
    NotFound { name: String },

    #[error("probe for build target '{name}' timed out")]
    ProbeTimeout { name: String },

    #[error("failed to find repository root: {message}")]
    RepoRoot { message: String },

    #[error("error checking build target '{name}': {message}")]
    Probe { name: String, message: String },
}

/// prehook errors.
#[derive(Debug, thiserror::Error)]
pub enum PrehookError {
    #[error("unable to determine repository root: {0}")]
    RepoRootUnresolvable(String),

    #[error("capability probe for '{0}' timed out")]
    CapabilityProbeTimeout(String),

    #[error("build target '{0}' not found in build configuration")]
    CapabilityNotFound(String),

    #[error("{tool} timed out after {}s", timeout.as_secs())]
    ValidatorTimedOut { tool: String, timeout: Duration },

    #[error("{tool} failed: {message}")]
    ValidatorToolFailure { tool: String, message: String },

    #[error("build constraints exclude all files even with detected tags {tags:?}")]
    ConstraintRetryExhausted { tags: Vec<String> },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git error: {0}")]
    Git(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<CapabilityError> for PrehookError {
    fn from(err: CapabilityError) -> Self {
        match err {
            CapabilityError::NotFound { name } => PrehookError::CapabilityNotFound(name),
            CapabilityError::ProbeTimeout { name } => PrehookError::CapabilityProbeTimeout(name),
            CapabilityError::RepoRoot { message } => PrehookError::RepoRootUnresolvable(message),
            CapabilityError::Probe { name, message } => PrehookError::ValidatorToolFailure {
                tool: format!("make -n {name}"),
                message,
            },
        }
    }
}

/// Result type for prehook operations.
pub type Result<T> = std::result::Result<T, PrehookError>;
