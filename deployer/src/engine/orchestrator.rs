//! Deployment orchestration engine

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use deploy_records::{DeploymentHistoryEntry, DeploymentResults, RunStatus, StepError, StepStatus};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::accounts::AccountContext;
use crate::engine::fsm::{RunEvent, RunFsm, RunState};
use crate::engine::pipeline::{Criticality, Pipeline};
use crate::engine::step_log::StepLog;
use crate::errors::DeployError;
use crate::exec::executor::CommandExecutor;
use crate::models::spec::DeploymentSpec;
use crate::progress::ProgressSink;
use crate::reconcile::StepContext;
use crate::storage::settings::Settings;

/// Outcome of one `deploy` call
#[derive(Debug, Clone)]
pub struct DeploymentResult {
    /// The hard steps all completed
    pub success: bool,
    pub compute_url: String,
    pub static_url: String,

    /// Why the run failed, when it did
    pub error: Option<String>,

    /// A hard step stopped on an expired or missing login; holds its detail
    pub login_required: Option<String>,

    /// Step errors and advisory warnings, in pipeline order
    pub errors: Vec<StepError>,

    pub history: DeploymentHistoryEntry,
}

/// Clears the in-flight flag when the run ends, however it ends
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Runs the provisioning pipeline, one deployment at a time
pub struct Engine {
    executor: Arc<dyn CommandExecutor>,
    accounts: Arc<dyn AccountContext>,
    settings: Settings,
    pipeline: Pipeline,
    in_flight: AtomicBool,
    fsm: RwLock<RunFsm>,
}

impl Engine {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        accounts: Arc<dyn AccountContext>,
        settings: Settings,
    ) -> Self {
        Self::with_pipeline(executor, accounts, settings, Pipeline::standard())
    }

    pub fn with_pipeline(
        executor: Arc<dyn CommandExecutor>,
        accounts: Arc<dyn AccountContext>,
        settings: Settings,
        pipeline: Pipeline,
    ) -> Self {
        Self {
            executor,
            accounts,
            settings,
            pipeline,
            in_flight: AtomicBool::new(false),
            fsm: RwLock::new(RunFsm::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// State of the current or most recent run
    pub async fn last_state(&self) -> RunState {
        self.fsm.read().await.state()
    }

    /// Run every pipeline step for `spec`.
    ///
    /// A concurrent call is rejected with [`DeployError::AlreadyInProgress`]
    /// before it touches anything. Hard step failures come back as
    /// `success: false` results carrying the partial step log.
    pub async fn deploy(
        &self,
        spec: &DeploymentSpec,
        sink: &dyn ProgressSink,
    ) -> Result<DeploymentResult, DeployError> {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight) else {
            warn!("Rejected deployment of {}: another run is in flight", spec.id);
            return Err(DeployError::AlreadyInProgress);
        };

        {
            let mut fsm = self.fsm.write().await;
            if fsm.state().is_finished() {
                fsm.process(RunEvent::Reset)?;
            }
            fsm.process(RunEvent::Start)?;
        }

        info!("Starting deployment {} ({})", spec.id, spec.name);
        let started = Utc::now();
        let log = StepLog::new(sink);
        let mut errors = Vec::new();
        let mut fatal = None;
        let mut login_required = None;
        let mut compute_url = String::new();
        let mut static_url = String::new();

        for descriptor in self.pipeline.steps() {
            let key = descriptor.key;
            let ctx = StepContext {
                key,
                spec,
                settings: &self.settings,
                executor: self.executor.as_ref(),
                accounts: self.accounts.as_ref(),
                log: &log,
            };

            log.report(key.as_str(), StepStatus::Running, key.start_message());
            match descriptor.runner.run(&ctx).await {
                Ok(outcome) => {
                    if let Some(url) = outcome.compute_url {
                        compute_url = url;
                    }
                    if let Some(url) = outcome.static_url {
                        static_url = url;
                    }

                    let status = if outcome.warnings.is_empty() {
                        StepStatus::Completed
                    } else {
                        StepStatus::Warning
                    };
                    for warning in outcome.warnings {
                        warn!("{}: {}", key, warning);
                        errors.push(StepError::new(key.as_str(), warning));
                    }
                    log.report(key.as_str(), status, &outcome.details);
                }
                Err(err) => {
                    let message = err.to_string();
                    errors.push(StepError::new(key.as_str(), message.clone()));

                    match descriptor.criticality {
                        Criticality::Soft => {
                            warn!("{} failed, continuing: {}", key, message);
                            log.report(key.as_str(), StepStatus::Warning, &message);
                        }
                        Criticality::Hard => {
                            error!("{} failed, aborting: {}", key, message);
                            log.report(key.as_str(), StepStatus::Failed, &message);
                            fatal = Some(format!("{} failed: {}", key, message));
                            if let DeployError::NeedsInteractiveLogin(detail) = err {
                                login_required = Some(detail);
                            }
                            break;
                        }
                    }
                }
            }
        }

        if fatal.is_none() {
            // URLs follow from the names even when discovery or the step itself failed
            if compute_url.is_empty() {
                compute_url = self.settings.urls.compute_url(&spec.compute_name);
            }
            if static_url.is_empty() && spec.deploy_static_site {
                static_url = self.settings.urls.static_url(&spec.static_site_name);
            }
        }

        let status = {
            let mut fsm = self.fsm.write().await;
            match &fatal {
                Some(message) => fsm.process(RunEvent::Abort(message.clone()))?,
                None => fsm.process(RunEvent::Finish)?,
            }
            match fsm.state() {
                RunState::Succeeded => RunStatus::Succeeded,
                _ => RunStatus::Failed,
            }
        };

        let history = DeploymentHistoryEntry {
            timestamp: started,
            end_time: Some(Utc::now()),
            status,
            results: DeploymentResults {
                compute_url: compute_url.clone(),
                static_url: static_url.clone(),
            },
            errors: errors.clone(),
            steps: log.snapshot(),
        };

        match &fatal {
            None if errors.is_empty() => info!("Deployment {} succeeded", spec.id),
            None => info!("Deployment {} succeeded with {} warnings", spec.id, errors.len()),
            Some(message) => error!("Deployment {} failed: {}", spec.id, message),
        }

        Ok(DeploymentResult {
            success: fatal.is_none(),
            compute_url,
            static_url,
            error: fatal,
            login_required,
            errors,
            history,
        })
    }
}
