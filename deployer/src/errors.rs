//! Error types for the deployer

use thiserror::Error;

use crate::exec::command::CommandError;

/// Main error type for the deployer
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    CommandError(#[from] CommandError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Missing prerequisites: {0}")]
    PrerequisiteError(String),

    /// The identity exists but its session expired; a human has to log in again
    #[error("Interactive login required: {0}")]
    NeedsInteractiveLogin(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("deployment already in progress")]
    AlreadyInProgress,

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Whether the caller should prompt for a fresh login instead of retrying
    pub fn needs_login(&self) -> bool {
        matches!(self, DeployError::NeedsInteractiveLogin(_))
    }
}

impl From<anyhow::Error> for DeployError {
    fn from(err: anyhow::Error) -> Self {
        DeployError::Internal(format!("{err:#}"))
    }
}
