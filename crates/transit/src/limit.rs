//! Per-system request limiters.
//!
//! Each external system gets its own [`RequestLimiter`]: a semaphore bounding
//! the number of in-flight requests, optionally combined with a governor
//! pacer bounding requests per second.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::{AcquireError, Semaphore, SemaphorePermit};

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// A requests-per-second pacer using the governor crate.
///
/// ```ignore
/// let limiter = ApiRateLimiter::new(10); // 10 requests per second
/// limiter.wait().await;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a new rate limiter with the specified requests per second.
    ///
    /// A value of zero is treated as one.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rps));

        Self {
            inner: Arc::new(rate_limiter),
        }
    }

    /// Wait until a request is allowed by the rate limiter.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

/// Bounds concurrent requests to one external system.
///
/// Cloning shares the underlying semaphore, so every clone of a client
/// draws from the same pool of permits.
#[derive(Clone)]
pub struct RequestLimiter {
    permits: Arc<Semaphore>,
    limit: usize,
    pacer: Option<ApiRateLimiter>,
}

impl RequestLimiter {
    /// Create a limiter allowing `limit` simultaneous requests (minimum 1).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            pacer: None,
        }
    }

    /// Additionally pace requests to `requests_per_second`.
    #[must_use]
    pub fn with_rate(mut self, requests_per_second: Option<u32>) -> Self {
        self.pacer = requests_per_second.map(ApiRateLimiter::new);
        self
    }

    /// Maximum number of simultaneous requests.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a slot. The request must be issued while the permit is held.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        let permit = self.permits.acquire().await?;
        if let Some(ref pacer) = self.pacer {
            pacer.wait().await;
        }
        Ok(permit)
    }
}

impl std::fmt::Debug for RequestLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLimiter")
            .field("limit", &self.limit)
            .field("available", &self.available())
            .field("paced", &self.pacer.is_some())
            .finish()
    }
}
