//! Fixed window counter.
//!
//! One integer per key, expiring a full window after the first request.
//! A burst straddling two windows can admit up to twice the limit in a
//! short span; this is inherent to the algorithm.

use storefront_core::domain::{LimitKey, RateLimitConfig};
use storefront_core::ports::{CounterStore, StoreError};

/// Returns the request count in the current window, this request included.
pub(crate) async fn count(
    store: &dyn CounterStore,
    config: &RateLimitConfig,
    key: &LimitKey,
) -> Result<u64, StoreError> {
    store.incr_with_expiry(key.as_str(), config.window).await
}
