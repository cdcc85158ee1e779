//! Persisted record formats
//!
//! Wire models shared between the orchestrator and anything that reads its
//! files: the per-environment deployment file and the run history.

pub mod environment;
pub mod history;

pub use environment::{ContextEntry, EnvironmentEntry, EnvironmentsFile};
pub use history::{DeploymentHistoryEntry, DeploymentResults, RunStatus, StepError, StepRecord, StepStatus};
