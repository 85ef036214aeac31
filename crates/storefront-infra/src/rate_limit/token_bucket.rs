//! Token bucket.
//!
//! State lives in two keys, `K:tokens` and `K:lastRefill`, both kept for two
//! windows so idle buckets disappear. A full bucket refills over one window.
//!
//! The read and the write are separate round-trips. Concurrent requests
//! for the same identity can read the same token count and both be
//! admitted, so over-admission is bounded by the number of racers.

use std::time::Duration;

use storefront_core::domain::{LimitKey, RateLimitConfig};
use storefront_core::ports::{CounterStore, StoreError};

pub(crate) const TOKENS_SUFFIX: &str = "tokens";
pub(crate) const LAST_REFILL_SUFFIX: &str = "lastRefill";

/// Outcome of one bucket pass.
pub(crate) struct BucketCount {
    pub allowed: bool,
    pub current_count: u64,
}

pub(crate) async fn evaluate(
    store: &dyn CounterStore,
    config: &RateLimitConfig,
    key: &LimitKey,
    now: u64,
) -> Result<BucketCount, StoreError> {
    let capacity = f64::from(config.max_requests);
    let tokens_key = key.child(TOKENS_SUFFIX);
    let refill_key = key.child(LAST_REFILL_SUFFIX);

    let tokens = read_number::<f64>(store, &tokens_key)
        .await?
        .unwrap_or(capacity);
    let last_refill = read_number::<u64>(store, &refill_key)
        .await?
        .unwrap_or(now);

    let elapsed = now.saturating_sub(last_refill) as f64;
    let refill = (elapsed * capacity / config.window_millis() as f64).floor();
    let tokens = (tokens + refill).min(capacity);

    // A fractional remainder is not a token; admitting on it would go negative
    if tokens < 1.0 {
        return Ok(BucketCount {
            allowed: false,
            current_count: u64::from(config.max_requests) + 1,
        });
    }

    let tokens = tokens - 1.0;
    let ttl = Some(config.window.saturating_mul(2).max(Duration::from_millis(1)));
    store.set(&tokens_key, &tokens.to_string(), ttl).await?;
    store.set(&refill_key, &now.to_string(), ttl).await?;

    Ok(BucketCount {
        allowed: true,
        current_count: (capacity - tokens).max(0.0) as u64,
    })
}

async fn read_number<T: std::str::FromStr>(
    store: &dyn CounterStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };

    match raw.parse() {
        Ok(value) => Ok(Some(value)),
        Err(_) => {
            tracing::warn!(key = %key, value = %raw, "Ignoring unreadable token bucket state");
            Ok(None)
        }
    }
}
