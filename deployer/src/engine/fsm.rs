//! Finite state machine for a single deployment run

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// No run has started
    Idle,

    /// Pipeline is executing
    Running,

    /// Last pipeline step ran, possibly with warnings
    Succeeded,

    /// A hard step failed
    Failed,
}

impl RunState {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

/// Run event
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Begin the pipeline
    Start,

    /// Every step ran
    Finish,

    /// A hard step threw
    Abort(String),

    /// Back to idle for the next run
    Reset,
}

/// Run FSM
#[derive(Debug, Clone)]
pub struct RunFsm {
    state: RunState,
    error: Option<String>,
}

impl RunFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Error that failed the run, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: RunEvent) -> Result<(), DeployError> {
        let new_state = match (self.state, &event) {
            (RunState::Idle, RunEvent::Start) => {
                self.error = None;
                RunState::Running
            }

            (RunState::Running, RunEvent::Finish) => RunState::Succeeded,
            (RunState::Running, RunEvent::Abort(err)) => {
                self.error = Some(err.clone());
                RunState::Failed
            }

            (RunState::Succeeded | RunState::Failed, RunEvent::Reset) => {
                self.error = None;
                RunState::Idle
            }

            (state, event) => {
                return Err(DeployError::InvalidTransition(format!(
                    "{:?} -> {:?}",
                    state, event
                )));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for RunFsm {
    fn default() -> Self {
        Self::new()
    }
}
