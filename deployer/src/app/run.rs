//! Main application run

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tracing::{error, info, warn};

use crate::accounts::cli::CliAccountContext;
use crate::app::options::AppOptions;
use crate::engine::{DeploymentResult, Engine};
use crate::errors::DeployError;
use crate::exec::executor::CommandExecutor;
use crate::exec::scripted::ScriptedExecutor;
use crate::exec::shell::ShellExecutor;
use crate::progress::ConsoleSink;
use crate::storage::environments::{load_environment, load_environments, select_environment};
use crate::storage::history::{HistoryStore, JsonHistoryStore};
use crate::storage::settings::Settings;

/// Deploy the selected environment. Returns whether the run succeeded.
///
/// A run stopped by an expired login comes back as
/// [`DeployError::NeedsInteractiveLogin`] so the caller can prompt for it.
pub async fn run(options: AppOptions, settings: Settings) -> Result<bool, DeployError> {
    let layout = &options.layout;
    let history = JsonHistoryStore::new(layout.history_dir(), settings.history_limit);

    if options.show_history {
        print_history(&options, &history).await?;
        return Ok(true);
    }

    let mut spec = load_environment(
        &layout.environments_file(),
        &options.environment,
        &settings.required_secrets,
    )
    .await?;
    if let Some(pages) = options.deploy_pages {
        spec.deploy_static_site = pages;
    }

    let scripted = options.dry_run.then(|| Arc::new(ScriptedExecutor::echoing()));
    let executor: Arc<dyn CommandExecutor> = match &scripted {
        Some(scripted) => scripted.clone(),
        None => Arc::new(ShellExecutor::new(
            options.shell.clone(),
            Duration::from_secs(settings.timeouts.grace_secs),
        )),
    };
    let accounts = Arc::new(CliAccountContext::new(executor.clone(), settings.clone()));
    let engine = Engine::new(executor, accounts, settings);

    info!("Deploying environment {} as {}", options.environment, spec.name);
    let sink = ConsoleSink::default();
    let result = engine.deploy(&spec, &sink).await?;

    match &scripted {
        Some(scripted) => println!("\nDry run issued {} commands, nothing was recorded", scripted.calls().len()),
        None => {
            if let Err(e) = history.append(&spec.id, &result.history).await {
                warn!("Failed to record deployment history: {}", e);
            }
        }
    }

    print_summary(&result);
    match result.login_required {
        Some(detail) => Err(DeployError::NeedsInteractiveLogin(detail)),
        None => Ok(result.success),
    }
}

fn print_summary(result: &DeploymentResult) {
    println!();
    if result.success {
        println!("{}", "Deployment succeeded".green().bold());
    } else {
        println!("{}", "Deployment failed".red().bold());
        if let Some(err) = &result.error {
            error!("{}", err);
            println!("  {}", err);
        }
    }

    if !result.compute_url.is_empty() {
        println!("  worker:      {}", result.compute_url);
    }
    if !result.static_url.is_empty() {
        println!("  static site: {}", result.static_url);
    }

    if result.success && !result.errors.is_empty() {
        println!("{}", "Completed with warnings:".yellow());
    }
    for err in &result.errors {
        println!("  - {}: {}", err.step, err.error);
    }
}

async fn print_history(options: &AppOptions, history: &JsonHistoryStore) -> Result<(), DeployError> {
    let environments = load_environments(&options.layout.environments_file()).await?;
    let spec = select_environment(&environments, &options.environment)?;
    let entries = history.list(&spec.id).await?;

    if entries.is_empty() {
        println!("No deployments recorded for {}", spec.id);
        return Ok(());
    }

    for entry in entries.iter().rev() {
        let status = format!("{:?}", entry.status).to_lowercase();
        let status = match entry.status {
            deploy_records::RunStatus::Succeeded => status.green(),
            deploy_records::RunStatus::Failed => status.red(),
            deploy_records::RunStatus::Running => status.yellow(),
        };
        println!(
            "{}  {:<9}  {}  ({} issues)",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            status,
            entry.results.compute_url,
            entry.errors.len()
        );
    }
    Ok(())
}
