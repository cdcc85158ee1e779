//! Provider identity and project selection

use async_trait::async_trait;
use tracing::{info, warn};

use crate::accounts::Provider;
use crate::errors::DeployError;
use crate::reconcile::{StepContext, StepOutcome, StepRunner};

/// Switch both providers to the configured identities.
///
/// Identity and project switches fail the step. The provider-B project
/// file check only produces a warning, since that CLI follows its own
/// project file regardless of the active project.
pub struct SwitchAccounts;

#[async_trait]
impl StepRunner for SwitchAccounts {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let spec = ctx.spec;
        let mut done = Vec::new();

        if let Some(account) = spec.provider_a_account() {
            ctx.progress(&format!("Selecting provider-A account {}", account));
            ctx.accounts.switch_identity(Provider::A, account).await?;
            done.push(format!("provider-A account {}", account));
        }

        let context_b = spec.provider_b_context.as_ref();
        if let Some(account) = context_b.and_then(|c| c.account.as_deref()) {
            ctx.progress(&format!("Selecting provider-B account {}", account));
            ctx.accounts.switch_identity(Provider::B, account).await?;
            done.push(format!("provider-B account {}", account));
        }

        let Some(project) = spec.provider_b_project() else {
            if done.is_empty() {
                return Ok(StepOutcome::done("No contexts configured, using active CLI identities"));
            }
            return Ok(StepOutcome::done(format!("Using {}", done.join(", "))));
        };

        let switch = ctx.accounts.switch_project_context(project).await?;
        if switch.changed {
            info!("Provider-B project switched to {}", switch.current);
        }
        done.push(format!("provider-B project {}", switch.current));

        let mut outcome = StepOutcome::done(format!("Using {}", done.join(", ")));
        match ctx.accounts.verify_provider_b_context(project).await {
            Ok(check) if check.matches => {}
            Ok(check) => {
                let current = check.current.unwrap_or_else(|| "nothing".to_string());
                outcome = outcome.with_warning(format!(
                    "provider-B project file points at {}, expected {}",
                    current, project
                ));
            }
            Err(err) => {
                warn!("Could not verify provider-B project file: {}", err);
                outcome = outcome.with_warning(format!("could not verify provider-B project file: {}", err));
            }
        }

        Ok(outcome)
    }
}
