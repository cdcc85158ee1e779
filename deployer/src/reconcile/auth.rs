//! Provider authentication check

use async_trait::async_trait;

use crate::accounts::Provider;
use crate::errors::DeployError;
use crate::reconcile::{StepContext, StepOutcome, StepRunner};

pub struct CheckAuth;

#[async_trait]
impl StepRunner for CheckAuth {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let (a, b) = tokio::join!(
            ctx.accounts.is_authenticated(Provider::A),
            ctx.accounts.is_authenticated(Provider::B),
        );

        let missing: Vec<String> = [(Provider::A, a), (Provider::B, b)]
            .into_iter()
            .filter(|(_, authenticated)| !authenticated)
            .map(|(provider, _)| provider.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(DeployError::NeedsInteractiveLogin(format!(
                "not authenticated with {}",
                missing.join(" and ")
            )));
        }

        Ok(StepOutcome::done("Both providers authenticated"))
    }
}
