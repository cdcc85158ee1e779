//! Static frontend deployment

use async_trait::async_trait;

use crate::errors::DeployError;
use crate::reconcile::listing::{ensure_exists, extract_url};
use crate::reconcile::{StepContext, StepOutcome, StepRunner};

pub struct DeployStaticSite;

impl DeployStaticSite {
    async fn lookup_url(ctx: &StepContext<'_>, site: &str) -> Option<String> {
        let template = &ctx.settings.commands.site_url_lookup;
        if template.trim().is_empty() {
            return None;
        }

        let command = ctx.render(template, &[("site", site)]).ok()?;
        match ctx.executor.execute(&command, &ctx.provider_a(ctx.settings.query_options())).await {
            Ok(result) => extract_url(&result.output, site),
            Err(err) => {
                ctx.log(&format!("URL lookup failed: {}", err));
                None
            }
        }
    }
}

#[async_trait]
impl StepRunner for DeployStaticSite {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        if !ctx.spec.deploy_static_site {
            return Ok(StepOutcome::done("Static site deployment disabled, skipped"));
        }

        let site = ctx.spec.static_site_name.as_str();
        let commands = &ctx.settings.commands;
        let dir = ctx.settings.paths.static_dir.to_string_lossy();

        let create = ctx.render(&commands.create_site, &[("site", site)])?;
        ensure_exists(
            ctx,
            site,
            &commands.list_sites,
            &ctx.provider_a(ctx.settings.query_options()),
            &create,
            &ctx.provider_a(ctx.settings.mutate_options()),
        )
        .await?;

        ctx.progress(&format!("Uploading {}", dir));
        let command = ctx.render(&commands.deploy_site, &[("dir", dir.as_ref()), ("site", site)])?;
        ctx.run_streaming(&command, &ctx.provider_a(ctx.settings.deploy_options()))
            .await?;

        let url = match Self::lookup_url(ctx, site).await {
            Some(url) => url,
            None => ctx.settings.urls.static_url(site),
        };

        Ok(StepOutcome {
            details: format!("Static site {} live at {}", site, url),
            static_url: Some(url),
            ..Default::default()
        })
    }
}
