//! Backoff retry for transient provider errors.
//!
//! Wraps a provider call in an exponential-backoff loop using the shared
//! [`RetryConfig`]. Only errors the provider marks retryable are retried;
//! anything else (auth failures, unknown models, parse errors) returns
//! immediately so the orchestrator can react.

use std::future::Future;

use metrics::counter;
use parley_core::retry::{RetryConfig, calculate_backoff_delay};
use rand::Rng;
use tracing::warn;

use crate::provider::{ProviderError, ProviderResult};

/// Run `operation`, retrying transient failures with exponential backoff.
///
/// A provider-supplied `retry-after` hint overrides the computed delay when
/// it is longer.
pub async fn with_backoff<T, F, Fut>(config: &RetryConfig, operation: F) -> ProviderResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < config.max_retries => {
                let jitter_unit = rand::rng().random_range(-1.0..=1.0);
                let mut delay_ms = calculate_backoff_delay(
                    attempt,
                    config.base_delay_ms,
                    config.max_delay_ms,
                    config.jitter_factor,
                    jitter_unit,
                );
                if let Some(hint) = err.retry_after_ms() {
                    delay_ms = delay_ms.max(hint);
                }
                counter!("provider_retries_total", "category" => err.category().to_string())
                    .increment(1);
                warn!(
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms,
                    category = err.category(),
                    "retrying provider call: {err}"
                );
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
