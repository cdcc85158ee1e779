pub mod fsm;
pub mod orchestrator;
pub mod pipeline;
pub mod step_log;

pub use orchestrator::{DeploymentResult, Engine};
