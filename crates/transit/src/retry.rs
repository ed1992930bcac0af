//! Back-off for rate-limited requests.
//!
//! Only HTTP 429 responses are retried. Every other failure is reported to
//! the caller on the first attempt; the migration itself never retries an
//! item within a run.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::migrate::{
    INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_RATE_LIMIT_RETRIES, MigrationProgress,
    ProgressCallback, emit,
};

/// Exponential back-off for 429s: 1s initial, 60s cap, 5 retries, jittered.
#[must_use]
pub fn rate_limit_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(INITIAL_BACKOFF_MS))
        .with_max_delay(Duration::from_millis(MAX_BACKOFF_MS))
        .with_max_times(MAX_RATE_LIMIT_RETRIES as usize)
        .with_jitter()
}

/// Run `operation`, retrying while `is_rate_limited` holds for its error.
///
/// Each retry is logged at debug level and reported as
/// [`MigrationProgress::RateLimitBackoff`] when a callback is given.
pub async fn with_retry<T, E, F, Fut, IsRateLimit, ShortMsg>(
    mut operation: F,
    is_rate_limited: IsRateLimit,
    short_message: ShortMsg,
    target: &str,
    on_progress: Option<&ProgressCallback>,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
    IsRateLimit: Fn(&E) -> bool + Send + Sync + 'static,
    ShortMsg: Fn(&E) -> String + Send + Sync + 'static,
{
    let attempts = AtomicU32::new(0);

    let counted = || {
        attempts.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    counted
        .retry(rate_limit_backoff())
        .when(is_rate_limited)
        .notify(|err, delay| {
            let attempt = attempts.load(Ordering::SeqCst);
            tracing::debug!(
                target_url = target,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %short_message(err),
                "Rate limited, backing off"
            );
            emit(
                on_progress,
                MigrationProgress::RateLimitBackoff {
                    target: target.to_string(),
                    retry_after_ms: delay.as_millis() as u64,
                    attempt,
                },
            );
        })
        .await
}
