//! Bulk secret push

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{Map, Value};

use crate::errors::DeployError;
use crate::filesys::file::ScratchFile;
use crate::reconcile::{StepContext, StepOutcome, StepRunner};

/// Push every secret in one call.
///
/// The payload file is owner-only and removed when the guard drops, so it
/// never outlives the step even when the push fails.
pub struct DeploySecrets;

#[async_trait]
impl StepRunner for DeploySecrets {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let secrets = &ctx.spec.secrets;
        if secrets.is_empty() {
            return Err(DeployError::ValidationError("no secrets to deploy".to_string()));
        }

        let payload: Map<String, Value> = secrets
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.expose_secret().to_string())))
            .collect();
        let file = ScratchFile::create("dualdeploy-secrets", "json", &serde_json::to_vec(&payload)?).await?;

        let path = file.path_str();
        let command = ctx.render(
            &ctx.settings.commands.push_secrets,
            &[("file", path.as_str()), ("worker", ctx.spec.compute_name.as_str())],
        )?;
        ctx.run(&command, &ctx.provider_a(ctx.settings.mutate_options()))
            .await?;

        let keys: Vec<&str> = secrets.keys().map(String::as_str).collect();
        Ok(StepOutcome::done(format!(
            "Pushed {} secrets to {}: {}",
            keys.len(),
            ctx.spec.compute_name,
            keys.join(", ")
        )))
    }
}
