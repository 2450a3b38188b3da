//! Exponential backoff for transient request failures.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{RagError, Result};

impl RetryConfig {
    fn policy(&self) -> ExponentialBackoff {
        let initial = Duration::from_millis(self.initial_backoff_ms);
        ExponentialBackoffBuilder::new()
            .with_initial_interval(initial)
            .with_max_interval(Duration::from_millis(self.max_backoff_ms).max(initial))
            .with_multiplier(2.0)
            .with_randomization_factor(0.1)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Run `operation` until it succeeds, fails permanently, or has been tried
/// `config.max_attempts` times. Only errors for which
/// [`RagError::is_transient`] holds are retried.
///
/// Returns the final result together with the number of attempts made.
pub(crate) async fn retry<T, F, Fut>(
    config: &RetryConfig,
    provider: &str,
    mut operation: F,
) -> (Result<T>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = AtomicU32::new(0);
    let max_attempts = config.max_attempts.max(1);

    let result = backoff::future::retry_notify(
        config.policy(),
        || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let request = operation();
            async move {
                match request.await {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_transient() && attempt < max_attempts => {
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        },
        |e: RagError, delay: Duration| {
            warn!(
                provider,
                error = %e,
                retry_in_ms = delay.as_millis() as u64,
                "request failed, retrying"
            );
        },
    )
    .await;

    (result, attempts.load(Ordering::SeqCst))
}
