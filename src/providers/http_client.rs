//! Outbound HTTP plumbing shared by the remote service clients
//!
//! A single reqwest client (connection pool) is shared by the identity,
//! store and inference clients. Each call sets its own total timeout; the
//! inference client additionally gets a retry policy with exponential
//! backoff and an optional requests-per-minute limiter.

use governor::{clock::DefaultClock, middleware::NoOpMiddleware, state::{InMemoryState, NotKeyed}, Quota, RateLimiter};
use rand::Rng;
use reqwest::Client;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use crate::config::InferenceSettings;

/// Longest body excerpt kept in errors and logs
const BODY_SNIPPET_CHARS: usize = 500;

/// Build the shared HTTP client
pub fn build_http_client() -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .user_agent(concat!("r-image-relay/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// First characters of a response body, for diagnostics
pub fn body_snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_CHARS).collect()
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &InferenceSettings) -> Self {
        RetryPolicy {
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }

    /// Wait before retry number `attempt` (0-based).
    ///
    /// A hint from the remote service replaces the exponential step; either
    /// way the wait is capped at `max_backoff` and gets up to 10% jitter.
    pub fn delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let base = match hint {
            Some(hint) => hint,
            None => self
                .initial_backoff
                .checked_mul(2u32.saturating_pow(attempt))
                .unwrap_or(self.max_backoff),
        }
        .min(self.max_backoff);

        let jitter_ms = base.as_millis() as u64 / 10;
        let jitter = rand::thread_rng().gen_range(0..=jitter_ms);
        (base + Duration::from_millis(jitter)).min(self.max_backoff)
    }
}

/// Requests-per-minute limiter for an outbound endpoint
pub struct OutboundLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>,
    per_minute: u32,
}

impl OutboundLimiter {
    /// `None` when no limit is configured
    pub fn per_minute(requests: Option<u32>) -> Option<Self> {
        let rate = NonZeroU32::new(requests?)?;
        Some(OutboundLimiter {
            limiter: RateLimiter::direct(Quota::per_minute(rate)),
            per_minute: rate.get(),
        })
    }

    /// Wait for a permit
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
        debug!(per_minute = self.per_minute, "Outbound permit acquired");
    }
}
