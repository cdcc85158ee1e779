//! The ordered step table

use std::fmt;

use crate::reconcile::auth::CheckAuth;
use crate::reconcile::bucket::EnsureBucket;
use crate::reconcile::compute::DeployWorker;
use crate::reconcile::cors::ConfigureBucketCors;
use crate::reconcile::database::EnsureDatabase;
use crate::reconcile::prerequisites::CheckPrerequisites;
use crate::reconcile::provider_setup::SetupProviderB;
use crate::reconcile::secrets::DeploySecrets;
use crate::reconcile::static_site::DeployStaticSite;
use crate::reconcile::switch_accounts::SwitchAccounts;
use crate::reconcile::StepRunner;

/// Stable step identifiers, also the step record keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKey {
    CheckPrerequisites,
    SwitchAccounts,
    CheckAuth,
    SetupProviderB,
    EnsureBucket,
    EnsureDatabase,
    ConfigureBucketCors,
    DeploySecrets,
    DeployWorker,
    DeployStaticSite,
}

impl StepKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKey::CheckPrerequisites => "check-prerequisites",
            StepKey::SwitchAccounts => "switch-accounts",
            StepKey::CheckAuth => "check-auth",
            StepKey::SetupProviderB => "setup-provider-b",
            StepKey::EnsureBucket => "ensure-bucket",
            StepKey::EnsureDatabase => "ensure-database",
            StepKey::ConfigureBucketCors => "configure-bucket-cors",
            StepKey::DeploySecrets => "deploy-secrets",
            StepKey::DeployWorker => "deploy-worker",
            StepKey::DeployStaticSite => "deploy-static-site",
        }
    }

    /// Details shown when the step starts
    pub fn start_message(&self) -> &'static str {
        match self {
            StepKey::CheckPrerequisites => "Checking required CLIs",
            StepKey::SwitchAccounts => "Switching provider accounts",
            StepKey::CheckAuth => "Checking provider authentication",
            StepKey::SetupProviderB => "Enabling provider-B project APIs",
            StepKey::EnsureBucket => "Ensuring storage bucket exists",
            StepKey::EnsureDatabase => "Ensuring database exists and matches schema",
            StepKey::ConfigureBucketCors => "Configuring bucket CORS",
            StepKey::DeploySecrets => "Pushing secrets",
            StepKey::DeployWorker => "Deploying worker",
            StepKey::DeployStaticSite => "Deploying static site",
        }
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a step failure does to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    /// Abort the run
    Hard,
    /// Record the error and continue
    Soft,
}

pub struct StepDescriptor {
    pub key: StepKey,
    pub criticality: Criticality,
    pub runner: Box<dyn StepRunner>,
}

impl StepDescriptor {
    pub fn new(key: StepKey, criticality: Criticality, runner: impl StepRunner + 'static) -> Self {
        Self {
            key,
            criticality,
            runner: Box::new(runner),
        }
    }
}

/// Steps in execution order
pub struct Pipeline {
    steps: Vec<StepDescriptor>,
}

impl Pipeline {
    pub fn new(steps: Vec<StepDescriptor>) -> Self {
        Self { steps }
    }

    /// The full provisioning pipeline
    pub fn standard() -> Self {
        use Criticality::{Hard, Soft};

        Self::new(vec![
            StepDescriptor::new(StepKey::CheckPrerequisites, Hard, CheckPrerequisites),
            // Identity switching is hard; the verification half reports warnings itself
            StepDescriptor::new(StepKey::SwitchAccounts, Hard, SwitchAccounts),
            StepDescriptor::new(StepKey::CheckAuth, Hard, CheckAuth),
            StepDescriptor::new(StepKey::SetupProviderB, Soft, SetupProviderB),
            StepDescriptor::new(StepKey::EnsureBucket, Soft, EnsureBucket),
            StepDescriptor::new(StepKey::EnsureDatabase, Soft, EnsureDatabase),
            StepDescriptor::new(StepKey::ConfigureBucketCors, Soft, ConfigureBucketCors),
            StepDescriptor::new(StepKey::DeploySecrets, Hard, DeploySecrets),
            StepDescriptor::new(StepKey::DeployWorker, Hard, DeployWorker),
            StepDescriptor::new(StepKey::DeployStaticSite, Soft, DeployStaticSite),
        ])
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    /// Key and criticality of each step, in order
    pub fn policy(&self) -> Vec<(StepKey, Criticality)> {
        self.steps.iter().map(|s| (s.key, s.criticality)).collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}
