//! Run history models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a single pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Completed,
    Warning,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Warning => "warning",
            StepStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a run's step log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Stable step key, e.g. `deploy-worker`
    pub step: String,

    pub status: StepStatus,

    /// Human readable summary of the latest event
    pub details: String,

    /// Raw output lines, in arrival order
    #[serde(default)]
    pub logs: Vec<String>,
}

impl StepRecord {
    pub fn new(step: impl Into<String>, status: StepStatus, details: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status,
            details: details.into(),
            logs: Vec::new(),
        }
    }
}

/// A step-level error or advisory warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub step: String,
    pub error: String,
}

impl StepError {
    pub fn new(step: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            error: error.into(),
        }
    }
}

/// Overall status of a recorded run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

/// URLs produced by a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResults {
    #[serde(default)]
    pub compute_url: String,

    #[serde(default)]
    pub static_url: String,
}

/// One persisted run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentHistoryEntry {
    /// When the run started
    pub timestamp: DateTime<Utc>,

    /// When the run finished, absent while still running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    pub status: RunStatus,

    #[serde(default)]
    pub results: DeploymentResults,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<StepError>,

    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl DeploymentHistoryEntry {
    /// Start a new entry at the given instant
    pub fn started_at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            end_time: None,
            status: RunStatus::Running,
            results: DeploymentResults::default(),
            errors: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Look up the record for a step key
    pub fn step(&self, key: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step == key)
    }
}
