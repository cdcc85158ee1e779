//! Object storage bucket

use async_trait::async_trait;

use crate::errors::DeployError;
use crate::reconcile::listing::ensure_exists;
use crate::reconcile::{StepContext, StepOutcome, StepRunner};

pub struct EnsureBucket;

#[async_trait]
impl StepRunner for EnsureBucket {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let bucket = ctx.spec.bucket_name.as_str();
        let Some(project) = ctx.spec.provider_b_project() else {
            return Ok(StepOutcome::done("Skipped")
                .with_warning(format!("no provider-B project configured, bucket {} not checked", bucket)));
        };

        let commands = &ctx.settings.commands;
        let vars = [("bucket", bucket), ("project", project)];
        let list = ctx.render(&commands.list_buckets, &vars)?;
        let create = ctx.render(&commands.create_bucket, &vars)?;

        let ensured = ensure_exists(
            ctx,
            bucket,
            &list,
            &ctx.settings.query_options(),
            &create,
            &ctx.settings.mutate_options(),
        )
        .await?;

        Ok(StepOutcome::done(ensured.describe("Bucket", bucket)))
    }
}
