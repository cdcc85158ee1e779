//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::exec::command::CommandOptions;
use crate::logs::LogLevel;

/// Deployer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub json_logs: bool,

    /// Public URL conventions
    #[serde(default)]
    pub urls: UrlSettings,

    /// Provider CLI command templates
    #[serde(default)]
    pub commands: CommandTemplates,

    /// Per-class subprocess timeouts
    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Retry policy for network-class failures
    #[serde(default)]
    pub retry: RetrySettings,

    /// Local working directories
    #[serde(default)]
    pub paths: PathSettings,

    /// Secret keys every environment must define
    #[serde(default)]
    pub required_secrets: Vec<String>,

    /// APIs enabled on the provider-B project during setup
    #[serde(default = "default_required_apis")]
    pub required_apis: Vec<String>,

    /// Extra allowed origins for bucket CORS, besides the static site
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Environment variable carrying the provider-A account to its CLI
    #[serde(default = "default_account_env_var")]
    pub provider_a_account_env: String,

    /// Number of runs kept per deployment
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_required_apis() -> Vec<String> {
    vec![
        "storage.googleapis.com".to_string(),
        "firebasestorage.googleapis.com".to_string(),
    ]
}

fn default_account_env_var() -> String {
    "CLOUDFLARE_ACCOUNT_ID".to_string()
}

fn default_history_limit() -> usize {
    20
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            urls: UrlSettings::default(),
            commands: CommandTemplates::default(),
            timeouts: TimeoutSettings::default(),
            retry: RetrySettings::default(),
            paths: PathSettings::default(),
            required_secrets: Vec::new(),
            required_apis: default_required_apis(),
            cors_origins: Vec::new(),
            provider_a_account_env: default_account_env_var(),
            history_limit: default_history_limit(),
        }
    }
}

impl Settings {
    /// Options for read-only provider queries
    pub fn query_options(&self) -> CommandOptions {
        self.options(self.timeouts.query_secs).silent()
    }

    /// Options for resource-creating calls
    pub fn mutate_options(&self) -> CommandOptions {
        self.options(self.timeouts.mutate_secs)
    }

    /// Options for actual deploy operations
    pub fn deploy_options(&self) -> CommandOptions {
        self.options(self.timeouts.deploy_secs)
    }

    fn options(&self, timeout_secs: u64) -> CommandOptions {
        CommandOptions::default()
            .with_timeout(Duration::from_secs(timeout_secs))
            .with_retries(
                self.retry.max_retries,
                Duration::from_millis(self.retry.base_delay_ms),
            )
    }
}

/// Public URL conventions: `https://{name}.{suffix}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlSettings {
    #[serde(default = "default_compute_suffix")]
    pub compute_suffix: String,

    #[serde(default = "default_static_suffix")]
    pub static_suffix: String,
}

fn default_compute_suffix() -> String {
    "workers.dev".to_string()
}

fn default_static_suffix() -> String {
    "pages.dev".to_string()
}

impl Default for UrlSettings {
    fn default() -> Self {
        Self {
            compute_suffix: default_compute_suffix(),
            static_suffix: default_static_suffix(),
        }
    }
}

impl UrlSettings {
    pub fn compute_url(&self, name: &str) -> String {
        format!("https://{}.{}", name, self.compute_suffix)
    }

    pub fn static_url(&self, name: &str) -> String {
        format!("https://{}.{}", name, self.static_suffix)
    }
}

/// Subprocess timeouts in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Read-only queries
    #[serde(default = "default_query_timeout")]
    pub query_secs: u64,

    /// Create/update calls
    #[serde(default = "default_mutate_timeout")]
    pub mutate_secs: u64,

    /// Worker and static site deploys
    #[serde(default = "default_deploy_timeout")]
    pub deploy_secs: u64,

    /// Wait between terminate and kill
    #[serde(default = "default_grace_period")]
    pub grace_secs: u64,
}

fn default_query_timeout() -> u64 {
    15
}

fn default_mutate_timeout() -> u64 {
    120
}

fn default_deploy_timeout() -> u64 {
    300
}

fn default_grace_period() -> u64 {
    5
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            query_secs: default_query_timeout(),
            mutate_secs: default_mutate_timeout(),
            deploy_secs: default_deploy_timeout(),
            grace_secs: default_grace_period(),
        }
    }
}

/// Retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// Local directories the provider CLIs run in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Worker project (holds the provider-B project file)
    #[serde(default = "default_worker_dir")]
    pub worker_dir: PathBuf,

    /// Built static site output, relative to the worker dir
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Declarative schema applied to the database
    #[serde(default)]
    pub schema_file: Option<PathBuf>,
}

fn default_worker_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("dist")
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            worker_dir: default_worker_dir(),
            static_dir: default_static_dir(),
            schema_file: None,
        }
    }
}

/// Command templates. `{placeholder}` slots are filled with shell-quoted
/// values; an empty optional template disables that call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    /// Each must exit 0 for the prerequisites check to pass
    pub prerequisites: Vec<String>,

    /// `{account}`; succeeds when the provider-A identity is usable
    pub identity_a: String,
    /// `{account}`
    pub identity_b: String,
    pub auth_check_a: String,
    pub auth_check_b: String,
    pub current_project: String,
    /// `{project}`
    pub switch_project: String,
    /// Prints the project the provider-B project file points at
    pub project_file_context: String,

    /// `{api}`, `{project}`
    pub enable_api: String,

    /// `{project}`
    pub list_buckets: String,
    /// `{bucket}`, `{project}`
    pub create_bucket: String,
    /// `{bucket}`, `{file}`
    pub set_bucket_cors: String,

    pub list_databases: String,
    /// `{database}`
    pub create_database: String,
    /// `{database}`, `{sql}`
    pub query_database: String,
    /// `{database}`, `{file}`
    pub apply_schema: String,

    /// `{file}`, `{worker}`
    pub push_secrets: String,
    /// `{worker}`
    pub deploy_worker: String,
    /// `{worker}`
    pub worker_url_lookup: String,

    pub list_sites: String,
    /// `{site}`
    pub create_site: String,
    /// `{dir}`, `{site}`
    pub deploy_site: String,
    /// `{site}`
    pub site_url_lookup: String,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            prerequisites: vec![
                "wrangler --version".to_string(),
                "gcloud --version".to_string(),
            ],
            identity_a: "wrangler whoami".to_string(),
            identity_b: "gcloud config set account {account}".to_string(),
            auth_check_a: "wrangler whoami".to_string(),
            auth_check_b: "gcloud auth print-access-token".to_string(),
            current_project: "gcloud config get-value project".to_string(),
            switch_project: "gcloud config set project {project}".to_string(),
            project_file_context: "firebase use".to_string(),
            enable_api: "gcloud services enable {api} --project {project}".to_string(),
            list_buckets: "gcloud storage buckets list --project {project} --format='value(name)'".to_string(),
            create_bucket: "gcloud storage buckets create gs://{bucket} --project {project}".to_string(),
            set_bucket_cors: "gcloud storage buckets update gs://{bucket} --cors-file={file}".to_string(),
            list_databases: "wrangler d1 list --json".to_string(),
            create_database: "wrangler d1 create {database}".to_string(),
            query_database: "wrangler d1 execute {database} --remote --json --command {sql}".to_string(),
            apply_schema: "wrangler d1 execute {database} --remote --yes --file {file}".to_string(),
            push_secrets: "wrangler secret bulk {file} --name {worker}".to_string(),
            deploy_worker: "wrangler deploy --name {worker}".to_string(),
            worker_url_lookup: "wrangler deployments list --name {worker}".to_string(),
            list_sites: "wrangler pages project list --json".to_string(),
            create_site: "wrangler pages project create {site} --production-branch main".to_string(),
            deploy_site: "wrangler pages deploy {dir} --project-name {site} --branch main".to_string(),
            site_url_lookup: "wrangler pages project list --json".to_string(),
        }
    }
}
