//! Provider-B project prerequisites

use async_trait::async_trait;

use crate::errors::DeployError;
use crate::exec::command::FailureKind;
use crate::reconcile::{StepContext, StepOutcome, StepRunner};

/// Enable the APIs the bucket steps depend on
pub struct SetupProviderB;

#[async_trait]
impl StepRunner for SetupProviderB {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let Some(project) = ctx.spec.provider_b_project() else {
            return Ok(StepOutcome::done("Skipped")
                .with_warning("no provider-B project configured, API setup skipped"));
        };

        let options = ctx.settings.mutate_options();
        for api in &ctx.settings.required_apis {
            ctx.progress(&format!("Enabling {}", api));
            let command = ctx.render(
                &ctx.settings.commands.enable_api,
                &[("api", api.as_str()), ("project", project)],
            )?;

            match ctx.run(&command, &options).await {
                Ok(_) => ctx.log(&format!("{} enabled", api)),
                Err(err) if err.kind == FailureKind::AlreadyExists => {
                    ctx.log(&format!("{} already enabled", api))
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(StepOutcome::done(format!(
            "{} APIs enabled on {}",
            ctx.settings.required_apis.len(),
            project
        )))
    }
}
