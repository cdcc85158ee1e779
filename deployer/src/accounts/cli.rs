//! Account context driven through the provider CLIs

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::accounts::{AccountContext, ContextCheck, Provider, ProjectSwitch};
use crate::errors::DeployError;
use crate::exec::command::{CommandError, CommandOptions, CommandResult, FailureKind};
use crate::exec::executor::CommandExecutor;
use crate::storage::settings::Settings;
use crate::utils::render_template;

/// Output fragments of a CLI that wants a human to log in
const LOGIN_SIGNATURES: &[&str] = &[
    "not authenticated",
    "unauthenticated",
    "not logged in",
    "please login",
    "please log in",
    "run `wrangler login`",
    "gcloud auth login",
    "no credentialed accounts",
    "reauthentication",
    "invalid_grant",
    "token has expired",
];

fn asks_for_login(text: &str) -> bool {
    let text = text.to_lowercase();
    LOGIN_SIGNATURES.iter().any(|s| text.contains(s))
}

/// [`AccountContext`] backed by the configured command templates
pub struct CliAccountContext {
    executor: Arc<dyn CommandExecutor>,
    settings: Settings,

    /// Account last selected for provider A, passed to its CLI via env
    account_a: Mutex<Option<String>>,
}

impl CliAccountContext {
    pub fn new(executor: Arc<dyn CommandExecutor>, settings: Settings) -> Self {
        Self {
            executor,
            settings,
            account_a: Mutex::new(None),
        }
    }

    fn options(&self, provider: Provider, base: CommandOptions) -> CommandOptions {
        let worker_dir = self.settings.paths.worker_dir.clone();
        let base = base.with_cwd(worker_dir);
        if provider != Provider::A {
            return base;
        }

        let account = self
            .account_a
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default();
        match account {
            Some(account) => base.with_env(self.settings.provider_a_account_env.clone(), account),
            None => base,
        }
    }

    async fn query(&self, provider: Provider, command: &str) -> Result<CommandResult, CommandError> {
        let options = self.options(provider, self.settings.query_options());
        self.executor.execute(command, &options).await
    }

    /// Run an identity probe, mapping auth failures to a login request
    async fn probe_identity(&self, provider: Provider, command: &str) -> Result<(), DeployError> {
        match self.query(provider, command).await {
            Ok(result) if asks_for_login(&result.output) || asks_for_login(&result.stderr) => {
                Err(DeployError::NeedsInteractiveLogin(format!(
                    "{} identity is not authenticated",
                    provider
                )))
            }
            Ok(_) => Ok(()),
            Err(err) if err.kind == FailureKind::Network => Err(err.into()),
            Err(err) => {
                debug!("{} identity probe failed: {}", provider, err);
                Err(DeployError::NeedsInteractiveLogin(format!(
                    "{} identity is not authenticated: {}",
                    provider, err.message
                )))
            }
        }
    }
}

#[async_trait]
impl AccountContext for CliAccountContext {
    async fn switch_project_context(&self, project: &str) -> Result<ProjectSwitch, DeployError> {
        let commands = &self.settings.commands;
        let current = self.query(Provider::B, &commands.current_project).await?;
        let current = current.lines().last().unwrap_or_default().to_string();

        if current == project {
            debug!("Provider-B project already set to {}", project);
            return Ok(ProjectSwitch {
                current,
                changed: false,
            });
        }

        let command = render_template(&commands.switch_project, &[("project", project)])?;
        let options = self.options(Provider::B, self.settings.mutate_options());
        self.executor.execute(&command, &options).await?;
        info!("Switched provider-B project from {:?} to {}", current, project);

        Ok(ProjectSwitch {
            current: project.to_string(),
            changed: true,
        })
    }

    async fn switch_identity(&self, provider: Provider, account: &str) -> Result<(), DeployError> {
        let commands = &self.settings.commands;
        match provider {
            Provider::A => {
                if let Ok(mut active) = self.account_a.lock() {
                    *active = Some(account.to_string());
                }
                let command = render_template(&commands.identity_a, &[("account", account)])?;
                self.probe_identity(provider, &command).await
            }
            Provider::B => {
                // Selecting an account succeeds even without credentials, so probe after
                let command = render_template(&commands.identity_b, &[("account", account)])?;
                let options = self.options(provider, self.settings.mutate_options());
                self.executor.execute(&command, &options).await?;
                self.probe_identity(provider, &commands.auth_check_b).await
            }
        }
    }

    async fn verify_provider_b_context(&self, expected: &str) -> Result<ContextCheck, DeployError> {
        let result = self
            .query(Provider::B, &self.settings.commands.project_file_context)
            .await?;

        let tokens: Vec<&str> = result
            .output
            .split(|c: char| c.is_whitespace() || "()[]'\",:".contains(c))
            .filter(|t| !t.is_empty())
            .collect();
        let matches = tokens.contains(&expected);
        let current = if matches {
            Some(expected.to_string())
        } else {
            result.lines().next().map(str::to_string)
        };

        if !matches {
            warn!("Provider-B project file points at {:?}, expected {}", current, expected);
        }
        Ok(ContextCheck { matches, current })
    }

    async fn is_authenticated(&self, provider: Provider) -> bool {
        let command = match provider {
            Provider::A => &self.settings.commands.auth_check_a,
            Provider::B => &self.settings.commands.auth_check_b,
        };

        match self.query(provider, command).await {
            Ok(result) => !asks_for_login(&result.output),
            Err(err) => {
                debug!("{} auth check failed: {}", provider, err);
                false
            }
        }
    }
}
