//! Bucket CORS policy

use async_trait::async_trait;
use serde_json::json;

use crate::errors::DeployError;
use crate::filesys::file::ScratchFile;
use crate::reconcile::{StepContext, StepOutcome, StepRunner};

/// Allow the static site (and any configured origins) to use the bucket
pub struct ConfigureBucketCors;

impl ConfigureBucketCors {
    pub fn origins(ctx: &StepContext<'_>) -> Vec<String> {
        let mut origins = vec![ctx.settings.urls.static_url(&ctx.spec.static_site_name)];
        for origin in &ctx.settings.cors_origins {
            if !origins.contains(origin) {
                origins.push(origin.clone());
            }
        }
        origins
    }
}

#[async_trait]
impl StepRunner for ConfigureBucketCors {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let bucket = ctx.spec.bucket_name.as_str();
        if ctx.spec.provider_b_project().is_none() {
            return Ok(StepOutcome::done("Skipped")
                .with_warning(format!("no provider-B project configured, CORS on {} not set", bucket)));
        }
        let origins = Self::origins(ctx);

        let policy = json!([{
            "origin": origins,
            "method": ["GET", "HEAD", "PUT", "POST", "DELETE"],
            "responseHeader": ["Content-Type", "Authorization", "Content-Length"],
            "maxAgeSeconds": 3600
        }]);
        let file = ScratchFile::create("dualdeploy-cors", "json", &serde_json::to_vec_pretty(&policy)?).await?;

        let path = file.path_str();
        let command = ctx.render(
            &ctx.settings.commands.set_bucket_cors,
            &[("bucket", bucket), ("file", path.as_str())],
        )?;
        ctx.run(&command, &ctx.settings.mutate_options()).await?;

        Ok(StepOutcome::done(format!(
            "CORS on {} allows {}",
            bucket,
            origins.join(", ")
        )))
    }
}
