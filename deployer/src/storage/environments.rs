//! Environment selection from the persisted environments file

use deploy_records::EnvironmentsFile;
use tracing::debug;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::spec::DeploymentSpec;

/// Read the environments file, which must exist
pub async fn load_environments(environments_file: &File) -> Result<EnvironmentsFile, DeployError> {
    if !environments_file.exists().await {
        return Err(DeployError::ConfigError(format!(
            "environments file not found: {}",
            environments_file.path().display()
        )));
    }
    environments_file.read_json().await
}

/// Load the deployment spec for `environment`, validated against the required secret keys
pub async fn load_environment(
    environments_file: &File,
    environment: &str,
    required_secrets: &[String],
) -> Result<DeploymentSpec, DeployError> {
    let environments = load_environments(environments_file).await?;
    let spec = select_environment(&environments, environment)?;
    spec.validate(required_secrets)?;
    Ok(spec)
}

/// Pick one environment out of a parsed file
pub fn select_environment(
    environments: &EnvironmentsFile,
    environment: &str,
) -> Result<DeploymentSpec, DeployError> {
    let entry = environments.get(environment).ok_or_else(|| {
        let known: Vec<&str> = environments.keys().map(String::as_str).collect();
        DeployError::ValidationError(format!(
            "unknown environment `{}` (configured: {})",
            environment,
            if known.is_empty() { "none".to_string() } else { known.join(", ") }
        ))
    })?;

    debug!("Selected environment {}: {:?}", environment, entry);
    Ok(DeploymentSpec::from_entry(environment, entry))
}
