//! Persisted environment file models

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The environments file: entries keyed by environment name
pub type EnvironmentsFile = BTreeMap<String, EnvironmentEntry>;

/// Identity/project selector for one provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEntry {
    /// Account or identity to act as
    #[serde(default)]
    pub account: Option<String>,

    /// Project the provider CLI should target
    #[serde(default)]
    pub project: Option<String>,
}

/// One environment's deployment entry
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentEntry {
    #[serde(default)]
    pub id: Option<String>,

    pub name: String,

    #[serde(default)]
    pub compute_name: Option<String>,

    #[serde(default)]
    pub static_site_name: Option<String>,

    #[serde(default)]
    pub database_name: Option<String>,

    #[serde(default)]
    pub bucket_name: Option<String>,

    #[serde(default)]
    pub provider_a_context: Option<ContextEntry>,

    #[serde(default)]
    pub provider_b_context: Option<ContextEntry>,

    /// Secret name to value
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,

    #[serde(default)]
    pub deploy_static_site: Option<bool>,
}

// Secret values never reach logs.
impl fmt::Debug for EnvironmentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("compute_name", &self.compute_name)
            .field("static_site_name", &self.static_site_name)
            .field("database_name", &self.database_name)
            .field("bucket_name", &self.bucket_name)
            .field("provider_a_context", &self.provider_a_context)
            .field("provider_b_context", &self.provider_b_context)
            .field("secrets", &self.secrets.keys().collect::<Vec<_>>())
            .field("deploy_static_site", &self.deploy_static_site)
            .finish()
    }
}
