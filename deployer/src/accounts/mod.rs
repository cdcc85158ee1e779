//! Account and project context capability

pub mod cli;

use std::fmt;

use async_trait::async_trait;

use crate::errors::DeployError;

/// The two clouds a deployment spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Edge platform: worker, static site, database, secrets
    A,
    /// Cloud platform: storage buckets and project APIs
    B,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::A => f.write_str("provider-a"),
            Provider::B => f.write_str("provider-b"),
        }
    }
}

/// Result of switching the provider-B project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSwitch {
    /// Project active after the call
    pub current: String,

    /// False when the project was already active
    pub changed: bool,
}

/// Result of a read-only context check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextCheck {
    pub matches: bool,
    pub current: Option<String>,
}

/// Identity and project switching, provided by the caller
#[async_trait]
pub trait AccountContext: Send + Sync {
    /// Make `project` the active provider-B project. No side effects when it
    /// already is.
    async fn switch_project_context(&self, project: &str) -> Result<ProjectSwitch, DeployError>;

    /// Use `account` for `provider`. An unauthenticated identity fails with
    /// [`DeployError::NeedsInteractiveLogin`].
    async fn switch_identity(&self, provider: Provider, account: &str) -> Result<(), DeployError>;

    /// Compare the project the provider-B project file resolves to
    async fn verify_provider_b_context(&self, expected: &str) -> Result<ContextCheck, DeployError>;

    async fn is_authenticated(&self, provider: Provider) -> bool;
}
