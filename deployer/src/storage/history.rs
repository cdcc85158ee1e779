//! Deployment history store

use async_trait::async_trait;
use deploy_records::DeploymentHistoryEntry;
use tracing::debug;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;

/// Persists one history record per run
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a run, evicting the oldest entries beyond the cap
    async fn append(&self, deployment_id: &str, entry: &DeploymentHistoryEntry) -> Result<(), DeployError>;

    /// All stored runs for a deployment, oldest first
    async fn list(&self, deployment_id: &str) -> Result<Vec<DeploymentHistoryEntry>, DeployError>;
}

/// JSON file per deployment id
pub struct JsonHistoryStore {
    dir: Dir,
    limit: usize,
}

impl JsonHistoryStore {
    pub fn new(dir: Dir, limit: usize) -> Self {
        Self {
            dir,
            limit: limit.max(1),
        }
    }

    fn file_name(deployment_id: &str) -> String {
        let safe: String = deployment_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{safe}.json")
    }
}

#[async_trait]
impl HistoryStore for JsonHistoryStore {
    async fn append(&self, deployment_id: &str, entry: &DeploymentHistoryEntry) -> Result<(), DeployError> {
        let file = self.dir.file(&Self::file_name(deployment_id));
        let mut entries: Vec<DeploymentHistoryEntry> = file.read_json_or_default().await?;
        entries.push(entry.clone());

        if entries.len() > self.limit {
            let evicted = entries.len() - self.limit;
            entries.drain(..evicted);
            debug!("Evicted {} old history entries for {}", evicted, deployment_id);
        }

        file.write_json(&entries).await
    }

    async fn list(&self, deployment_id: &str) -> Result<Vec<DeploymentHistoryEntry>, DeployError> {
        self.dir
            .file(&Self::file_name(deployment_id))
            .read_json_or_default()
            .await
    }
}
