//! Retry loop with exponential backoff

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::exec::command::CommandError;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Run `attempt_fn` until it succeeds, fails terminally, or retries run out.
///
/// `attempt_fn` receives the 1-based attempt number. Only retryable
/// failures are retried; the wait before retry `n` is
/// `base_delay * 2^(n-1)`, slept through `sleep_fn`.
pub async fn retry_with_backoff<T, A, AF, S, SF>(
    max_retries: u32,
    base_delay: Duration,
    mut attempt_fn: A,
    sleep_fn: S,
) -> Result<T, CommandError>
where
    A: FnMut(u32) -> AF,
    AF: Future<Output = Result<T, CommandError>>,
    S: Fn(Duration) -> SF,
    SF: Future<Output = ()>,
{
    let cooldown = CooldownOptions::doubling(base_delay);
    let mut attempt = 1;

    loop {
        match attempt_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt <= max_retries => {
                let delay = calc_exp_backoff(&cooldown, attempt - 1);
                warn!(
                    "Attempt {}/{} of `{}` failed ({}), retrying in {:?}",
                    attempt,
                    max_retries + 1,
                    err.command,
                    err.message,
                    delay
                );
                sleep_fn(delay).await;
                attempt += 1;
            }
            Err(err) => {
                debug!(
                    "Giving up on `{}` after attempt {} ({:?})",
                    err.command, attempt, err.kind
                );
                return Err(err);
            }
        }
    }
}
