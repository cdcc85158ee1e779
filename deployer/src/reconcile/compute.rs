//! Worker deployment

use async_trait::async_trait;
use tracing::{debug, info};

use crate::errors::DeployError;
use crate::reconcile::listing::extract_url;
use crate::reconcile::{StepContext, StepOutcome, StepRunner};

/// Deploy the worker and work out its public URL.
///
/// URL discovery is best effort: deploy output first, then the lookup
/// command, then the naming convention. A failed lookup never fails the
/// step.
pub struct DeployWorker;

impl DeployWorker {
    async fn lookup_url(ctx: &StepContext<'_>, worker: &str) -> Option<String> {
        let template = &ctx.settings.commands.worker_url_lookup;
        if template.trim().is_empty() {
            return None;
        }

        let command = match ctx.render(template, &[("worker", worker)]) {
            Ok(command) => command,
            Err(err) => {
                debug!("Worker URL lookup not rendered: {}", err);
                return None;
            }
        };

        match ctx.executor.execute(&command, &ctx.provider_a(ctx.settings.query_options())).await {
            Ok(result) => extract_url(&result.output, worker),
            Err(err) => {
                ctx.log(&format!("URL lookup failed: {}", err));
                None
            }
        }
    }
}

#[async_trait]
impl StepRunner for DeployWorker {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let worker = ctx.spec.compute_name.as_str();
        let command = ctx.render(&ctx.settings.commands.deploy_worker, &[("worker", worker)])?;

        let result = ctx
            .run_streaming(&command, &ctx.provider_a(ctx.settings.deploy_options()))
            .await?;

        let url = match extract_url(&result.output, worker) {
            Some(url) => url,
            None => match Self::lookup_url(ctx, worker).await {
                Some(url) => url,
                None => {
                    let url = ctx.settings.urls.compute_url(worker);
                    ctx.log(&format!("Using conventional URL {}", url));
                    url
                }
            },
        };
        info!("Worker {} deployed at {}", worker, url);

        Ok(StepOutcome {
            details: format!("Worker {} live at {}", worker, url),
            compute_url: Some(url),
            ..Default::default()
        })
    }
}
