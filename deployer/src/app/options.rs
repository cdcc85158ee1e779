//! Application configuration options

use std::collections::HashMap;

use crate::errors::DeployError;
use crate::storage::layout::{StorageLayout, HOME_ENV_VAR};

/// Environment variable selecting the environment
pub const ENV_VAR: &str = "DEPLOY_ENV";

/// Environment variable overriding whether the static site is deployed
pub const PAGES_VAR: &str = "DEPLOY_PAGES";

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Key into the environments file
    pub environment: String,

    /// Overrides the environment's static site flag
    pub deploy_pages: Option<bool>,

    /// Print stored history instead of deploying
    pub show_history: bool,

    /// Answer every command from an echoing in-memory executor
    pub dry_run: bool,

    /// Shell used to run command templates
    pub shell: String,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            layout: StorageLayout::default(),
            environment: "development".to_string(),
            deploy_pages: None,
            show_history: false,
            dry_run: false,
            shell: "sh".to_string(),
        }
    }
}

impl AppOptions {
    /// Build from `--key=value` arguments, falling back to the process environment
    pub fn from_args(cli_args: &HashMap<String, String>) -> Result<Self, DeployError> {
        Self::from_sources(cli_args, |key| std::env::var(key).ok())
    }

    /// Arguments win over environment variables, which win over defaults
    pub fn from_sources(
        cli_args: &HashMap<String, String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DeployError> {
        let mut options = Self::default();
        let lookup = |arg: &str, var: &str| cli_args.get(arg).cloned().or_else(|| env(var));

        if let Some(home) = lookup("home", HOME_ENV_VAR) {
            options.layout = StorageLayout::new(home);
        }
        if let Some(environment) = lookup("env", ENV_VAR).filter(|e| !e.trim().is_empty()) {
            options.environment = environment.trim().to_string();
        }
        if let Some(pages) = lookup("pages", PAGES_VAR) {
            options.deploy_pages = Some(parse_bool(&pages)?);
        }
        if let Some(shell) = cli_args.get("shell") {
            options.shell = shell.clone();
        }
        options.show_history = cli_args.contains_key("history");
        options.dry_run = cli_args.contains_key("dry-run");

        Ok(options)
    }
}

fn parse_bool(value: &str) -> Result<bool, DeployError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(DeployError::ValidationError(format!(
            "expected true or false for {}, got `{}`",
            PAGES_VAR, other
        ))),
    }
}
