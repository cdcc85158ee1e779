//! Deployment spec: the immutable input of one run

use std::collections::BTreeMap;

use deploy_records::{ContextEntry, EnvironmentEntry};
use secrecy::{ExposeSecret, SecretString};

use crate::errors::DeployError;

/// Identity/project selector for one provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderContext {
    pub account: Option<String>,
    pub project: Option<String>,
}

impl From<&ContextEntry> for ProviderContext {
    fn from(entry: &ContextEntry) -> Self {
        Self {
            account: non_empty(entry.account.as_deref()),
            project: non_empty(entry.project.as_deref()),
        }
    }
}

/// Everything one deployment run needs to know
#[derive(Debug)]
pub struct DeploymentSpec {
    pub id: String,
    pub name: String,
    pub compute_name: String,
    pub static_site_name: String,
    pub database_name: String,
    pub bucket_name: String,
    pub provider_a_context: Option<ProviderContext>,
    pub provider_b_context: Option<ProviderContext>,
    pub secrets: BTreeMap<String, SecretString>,
    pub deploy_static_site: bool,
}

impl DeploymentSpec {
    /// Spec with every resource name derived from `name`
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            compute_name: format!("{name}-api"),
            static_site_name: name.clone(),
            database_name: format!("{name}-db"),
            bucket_name: format!("{name}-assets"),
            provider_a_context: None,
            provider_b_context: None,
            secrets: BTreeMap::new(),
            deploy_static_site: true,
            name,
        }
    }

    /// Build from a persisted environment entry, filling defaults
    pub fn from_entry(environment: &str, entry: &EnvironmentEntry) -> Self {
        let mut spec = Self::new(entry.name.clone());
        spec.id = non_empty(entry.id.as_deref()).unwrap_or_else(|| environment.to_string());

        if let Some(name) = non_empty(entry.compute_name.as_deref()) {
            spec.compute_name = name;
        }
        if let Some(name) = non_empty(entry.static_site_name.as_deref()) {
            spec.static_site_name = name;
        }
        if let Some(name) = non_empty(entry.database_name.as_deref()) {
            spec.database_name = name;
        }
        if let Some(name) = non_empty(entry.bucket_name.as_deref()) {
            spec.bucket_name = name;
        }

        spec.provider_a_context = entry.provider_a_context.as_ref().map(ProviderContext::from);
        spec.provider_b_context = entry.provider_b_context.as_ref().map(ProviderContext::from);
        spec.secrets = entry
            .secrets
            .iter()
            .map(|(k, v)| (k.clone(), SecretString::from(v.clone())))
            .collect();
        spec.deploy_static_site = entry.deploy_static_site.unwrap_or(true);
        spec
    }

    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(key.into(), SecretString::from(value.into()));
        self
    }

    /// Account selected for provider A, if any
    pub fn provider_a_account(&self) -> Option<&str> {
        self.provider_a_context.as_ref().and_then(|c| c.account.as_deref())
    }

    /// Project selected for provider B, if any
    pub fn provider_b_project(&self) -> Option<&str> {
        self.provider_b_context.as_ref().and_then(|c| c.project.as_deref())
    }

    /// Check the secrets before any provisioning starts
    pub fn validate(&self, required_secrets: &[String]) -> Result<(), DeployError> {
        if self.name.trim().is_empty() {
            return Err(DeployError::ValidationError("deployment name is empty".to_string()));
        }
        if self.secrets.is_empty() {
            return Err(DeployError::ValidationError(format!(
                "deployment `{}` has no secrets configured",
                self.id
            )));
        }

        let mut missing: Vec<&str> = required_secrets
            .iter()
            .filter(|key| {
                self.secrets
                    .get(key.as_str())
                    .is_none_or(|v| v.expose_secret().trim().is_empty())
            })
            .map(String::as_str)
            .collect();
        missing.extend(
            self.secrets
                .iter()
                .filter(|(k, v)| v.expose_secret().trim().is_empty() && !required_secrets.contains(k))
                .map(|(k, _)| k.as_str()),
        );

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DeployError::ValidationError(format!(
                "missing or empty secrets: {}",
                missing.join(", ")
            )))
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
