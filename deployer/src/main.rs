//! dualdeploy - Entry Point
//!
//! Provisions and deploys one environment across both cloud providers.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use anyhow::Context;
use dualdeploy::app::options::AppOptions;
use dualdeploy::app::run::run;
use dualdeploy::logs::{init_logging, LogOptions};
use dualdeploy::storage::settings::Settings;
use dualdeploy::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to print version: {e}"),
        }
        return ExitCode::SUCCESS;
    }

    let options = match AppOptions::from_args(&cli_args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Retrieve the settings file
    let settings = match load_settings(&options).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to load settings: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging; the guard flushes the log file on exit
    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.json_logs,
        log_dir: Some(options.layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    info!("dualdeploy {} ({})", version.version, version.git_hash);
    tokio::select! {
        result = run(options, settings) => match result {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(e) => {
                error!("{}", e);
                if e.needs_login() {
                    eprintln!("Log in with the provider CLI and run again.");
                }
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        },
        _ = await_shutdown_signal() => {
            // Dropping the run kills child processes and removes scratch files
            eprintln!("Interrupted");
            ExitCode::from(130)
        }
    }
}

async fn load_settings(options: &AppOptions) -> anyhow::Result<Settings> {
    let layout = &options.layout;
    layout
        .setup()
        .await
        .with_context(|| format!("creating {}", layout.base_dir.display()))?;

    let settings_file = layout.settings_file();
    settings_file
        .read_json_or_default::<Settings>()
        .await
        .with_context(|| format!("reading {}", settings_file.path().display()))
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            return std::future::pending().await;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, stopping deployment...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, stopping deployment...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received, stopping deployment...");
    }
}
