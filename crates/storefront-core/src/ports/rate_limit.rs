//! Rate limiting port.

use async_trait::async_trait;

use crate::domain::{Decision, LimitKey, RateLimitConfig};
use crate::ports::StoreError;

/// Rate limiter trait - decides whether one more request fits the policy.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Account for a request under `key` and return the decision.
    ///
    /// Backend failures are returned as errors; choosing between failing
    /// open and failing closed is left to the caller.
    async fn evaluate(
        &self,
        config: &RateLimitConfig,
        key: &LimitKey,
    ) -> Result<Decision, RateLimitError>;
}

/// Rate limit errors.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Counter store error: {0}")]
    Store(#[from] StoreError),
}
