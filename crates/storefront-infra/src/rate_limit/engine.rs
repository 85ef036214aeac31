//! Store-backed limiter engine.

use std::sync::Arc;

use async_trait::async_trait;

use storefront_core::domain::{Algorithm, Decision, LimitKey, RateLimitConfig};
use storefront_core::ports::{Clock, CounterStore, RateLimitError, RateLimiter};

use super::{fixed_window, sliding_window, token_bucket};
use crate::clock::SystemClock;

/// Rate limiter that keeps its counters in a shared [`CounterStore`].
///
/// Stateless between calls: every decision is derived from the store, so
/// any number of processes pointing at the same Redis enforce one limit.
pub struct LimiterEngine {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl LimiterEngine {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl RateLimiter for LimiterEngine {
    async fn evaluate(
        &self,
        config: &RateLimitConfig,
        key: &LimitKey,
    ) -> Result<Decision, RateLimitError> {
        let now = self.clock.now_millis();
        let store = self.store.as_ref();
        let limit = u64::from(config.max_requests);

        let (allowed, current_count) = match config.algorithm {
            Algorithm::FixedWindow => {
                let count = fixed_window::count(store, config, key).await?;
                (count <= limit, count)
            }
            Algorithm::SlidingWindow => {
                let outcome = sliding_window::evaluate(store, config, key, now).await?;
                (outcome.allowed, outcome.current_count)
            }
            Algorithm::TokenBucket => {
                let outcome = token_bucket::evaluate(store, config, key, now).await?;
                (outcome.allowed, outcome.current_count)
            }
        };

        let reset_at = now.saturating_add(config.window_millis()) / 1000;

        tracing::trace!(
            key = %key,
            allowed,
            current_count,
            limit,
            "Rate limit evaluated"
        );

        Ok(Decision::new(
            allowed,
            config.max_requests,
            current_count,
            reset_at,
        ))
    }
}
