//! Shared fakes and fixtures

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dualdeploy::accounts::{AccountContext, ContextCheck, Provider, ProjectSwitch};
use dualdeploy::engine::Engine;
use dualdeploy::errors::DeployError;
use dualdeploy::exec::command::{CommandError, CommandOptions, CommandResult};
use dualdeploy::exec::executor::{CommandExecutor, LineSink};
use dualdeploy::exec::scripted::ScriptedExecutor;
use dualdeploy::models::spec::{DeploymentSpec, ProviderContext};
use dualdeploy::storage::settings::Settings;
use tokio::sync::Notify;

pub const PROJECT: &str = "shop-prod";

/// A spec with every resource derived from `shop`
pub fn spec() -> DeploymentSpec {
    let mut spec = DeploymentSpec::new("shop")
        .with_secret("API_KEY", "key-123")
        .with_secret("JWT_SECRET", "jwt-456");
    spec.provider_a_context = Some(ProviderContext {
        account: Some("acc-1".to_string()),
        project: None,
    });
    spec.provider_b_context = Some(ProviderContext {
        account: Some("ops@example.com".to_string()),
        project: Some(PROJECT.to_string()),
    });
    spec
}

pub fn engine(executor: Arc<dyn CommandExecutor>, accounts: FakeAccounts, settings: Settings) -> Engine {
    Engine::new(executor, Arc::new(accounts), settings)
}

/// Account context with scripted identities
pub struct FakeAccounts {
    pub unauthenticated: Vec<Provider>,
    pub locked_out: Vec<Provider>,
    pub project_file: String,
    pub calls: Mutex<Vec<String>>,
}

impl FakeAccounts {
    pub fn new() -> Self {
        Self {
            unauthenticated: Vec::new(),
            locked_out: Vec::new(),
            project_file: PROJECT.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AccountContext for FakeAccounts {
    async fn switch_project_context(&self, project: &str) -> Result<ProjectSwitch, DeployError> {
        self.record(format!("project {project}"));
        Ok(ProjectSwitch {
            current: project.to_string(),
            changed: true,
        })
    }

    async fn switch_identity(&self, provider: Provider, account: &str) -> Result<(), DeployError> {
        self.record(format!("identity {provider} {account}"));
        if self.locked_out.contains(&provider) {
            return Err(DeployError::NeedsInteractiveLogin(format!("{provider} session expired")));
        }
        Ok(())
    }

    async fn verify_provider_b_context(&self, expected: &str) -> Result<ContextCheck, DeployError> {
        Ok(ContextCheck {
            matches: self.project_file == expected,
            current: Some(self.project_file.clone()),
        })
    }

    async fn is_authenticated(&self, provider: Provider) -> bool {
        !self.unauthenticated.contains(&provider)
    }
}

/// Holds commands containing `pattern` until the gate opens
pub struct GatedExecutor {
    pub inner: ScriptedExecutor,
    pattern: String,
    pub gate: Notify,
    pub reached: AtomicBool,
}

impl GatedExecutor {
    pub fn new(pattern: &str) -> Self {
        Self {
            inner: ScriptedExecutor::new(),
            pattern: pattern.to_string(),
            gate: Notify::new(),
            reached: AtomicBool::new(false),
        }
    }

    async fn wait(&self, command: &str) {
        if command.contains(&self.pattern) {
            self.reached.store(true, Ordering::SeqCst);
            self.gate.notified().await;
        }
    }
}

#[async_trait]
impl CommandExecutor for GatedExecutor {
    async fn execute(&self, command: &str, options: &CommandOptions) -> Result<CommandResult, CommandError> {
        self.wait(command).await;
        self.inner.execute(command, options).await
    }

    async fn execute_interactive(
        &self,
        command: &str,
        options: &CommandOptions,
        on_line: &LineSink<'_>,
    ) -> Result<CommandResult, CommandError> {
        self.wait(command).await;
        self.inner.execute_interactive(command, options, on_line).await
    }
}
