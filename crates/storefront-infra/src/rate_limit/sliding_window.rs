//! Sliding window log.
//!
//! Each accepted request appends an entry stamped with its epoch millis to
//! the identity's log, which expires one window after the last write. The
//! rolling count is the number of entries younger than the window. How the
//! log is laid out is up to the store: see [`CounterStore::log_append`].

use uuid::Uuid;

use storefront_core::domain::{LimitKey, RateLimitConfig};
use storefront_core::ports::{CounterStore, StoreError};

/// Outcome of one sliding-window pass.
pub(crate) struct SlidingCount {
    pub allowed: bool,
    pub current_count: u64,
}

pub(crate) async fn evaluate(
    store: &dyn CounterStore,
    config: &RateLimitConfig,
    key: &LimitKey,
    now: u64,
) -> Result<SlidingCount, StoreError> {
    // The nonce keeps two requests in the same millisecond apart
    let member = Uuid::new_v4().simple().to_string();
    // An entry exactly one window old has expired, as its TTL says
    let cutoff = now.saturating_add(1).saturating_sub(config.window_millis());

    let current_count = store
        .log_append(key.as_str(), &member, now, cutoff, config.window)
        .await?;
    let allowed = current_count <= u64::from(config.max_requests);

    if !allowed {
        // Only accepted requests occupy the window
        store.log_remove(key.as_str(), &member, now).await?;
    }

    Ok(SlidingCount {
        allowed,
        current_count,
    })
}
