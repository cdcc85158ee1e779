//! Required CLI check

use async_trait::async_trait;
use futures::future::join_all;

use crate::errors::DeployError;
use crate::reconcile::{StepContext, StepOutcome, StepRunner};

/// Every prerequisite command must exit 0
pub struct CheckPrerequisites;

#[async_trait]
impl StepRunner for CheckPrerequisites {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let commands = &ctx.settings.commands.prerequisites;
        let options = ctx.settings.query_options();

        // Read-only and independent, so they run together
        let results = join_all(commands.iter().map(|command| ctx.executor.execute(command, &options))).await;

        let mut missing = Vec::new();
        for (command, result) in commands.iter().zip(results) {
            match result {
                Ok(result) => {
                    if let Some(version) = result.lines().next() {
                        ctx.log(&format!("{}: {}", command, version));
                    }
                }
                Err(err) => {
                    ctx.log(&err.message);
                    missing.push(command.split_whitespace().next().unwrap_or(command).to_string());
                }
            }
        }

        if !missing.is_empty() {
            return Err(DeployError::PrerequisiteError(format!(
                "required CLIs unavailable: {}",
                missing.join(", ")
            )));
        }

        Ok(StepOutcome::done(format!("{} CLIs available", commands.len())))
    }
}
