//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Environment variable overriding the base directory
pub const HOME_ENV_VAR: &str = "DUALDEPLOY_HOME";

/// Where the deployer keeps its configuration, history and logs
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Tool settings
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Per-environment deployment specs
    pub fn environments_file(&self) -> File {
        File::new(self.base_dir.join("environments.json"))
    }

    /// One history file per deployment id
    pub fn history_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("history"))
    }

    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Create the directories the deployer writes into
    pub async fn setup(&self) -> Result<(), crate::errors::DeployError> {
        self.history_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        let base_dir = std::env::var_os(HOME_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".dualdeploy"));

        Self::new(base_dir)
    }
}
