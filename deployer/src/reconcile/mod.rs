//! Idempotent provisioning steps

pub mod auth;
pub mod bucket;
pub mod compute;
pub mod cors;
pub mod database;
pub mod listing;
pub mod prerequisites;
pub mod provider_setup;
pub mod schema;
pub mod secrets;
pub mod static_site;
pub mod switch_accounts;

use async_trait::async_trait;
use deploy_records::StepStatus;

use crate::accounts::AccountContext;
use crate::engine::pipeline::StepKey;
use crate::engine::step_log::StepLog;
use crate::errors::DeployError;
use crate::exec::command::{CommandError, CommandOptions, CommandResult, OutputLine};
use crate::exec::executor::CommandExecutor;
use crate::models::spec::DeploymentSpec;
use crate::storage::settings::Settings;
use crate::utils::render_template;

/// What a step produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub details: String,

    /// Advisory problems; the step still counts as done
    pub warnings: Vec<String>,

    pub compute_url: Option<String>,
    pub static_url: Option<String>,
}

impl StepOutcome {
    pub fn done(details: impl Into<String>) -> Self {
        Self {
            details: details.into(),
            ..Default::default()
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// One pipeline step
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError>;
}

/// Everything a step may touch while it runs
pub struct StepContext<'a> {
    pub key: StepKey,
    pub spec: &'a DeploymentSpec,
    pub settings: &'a Settings,
    pub executor: &'a dyn CommandExecutor,
    pub accounts: &'a dyn AccountContext,
    pub log: &'a StepLog<'a>,
}

impl StepContext<'_> {
    pub fn render(&self, template: &str, vars: &[(&str, &str)]) -> Result<String, DeployError> {
        render_template(template, vars)
    }

    /// Append a line to this step's log
    pub fn log(&self, line: &str) {
        self.log.log_line(self.key.as_str(), line);
    }

    /// Update this step's details while it is still running
    pub fn progress(&self, details: &str) {
        self.log.report(self.key.as_str(), StepStatus::Running, details);
    }

    /// Options for a provider-A call: worker dir and selected account
    pub fn provider_a(&self, options: CommandOptions) -> CommandOptions {
        let options = options.with_cwd(self.settings.paths.worker_dir.clone());
        match self.spec.provider_a_account() {
            Some(account) => options.with_env(self.settings.provider_a_account_env.clone(), account),
            None => options,
        }
    }

    /// Run to completion; on failure the raw output lands in the step log
    pub async fn run(&self, command: &str, options: &CommandOptions) -> Result<CommandResult, CommandError> {
        self.executor.execute(command, options).await.inspect_err(|err| {
            for line in err.output_lines() {
                self.log(line);
            }
        })
    }

    /// Run while streaming every output line into the step log
    pub async fn run_streaming(&self, command: &str, options: &CommandOptions) -> Result<CommandResult, CommandError> {
        let sink = |line: &OutputLine| self.log(&line.text);
        self.executor.execute_interactive(command, options, &sink).await
    }
}
