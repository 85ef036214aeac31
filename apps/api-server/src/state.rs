//! Application state - shared across all handlers.

use std::sync::Arc;
use std::time::Duration;

use storefront_core::ports::{CounterStore, RateLimiter, StoreError};
use storefront_infra::{InMemoryCounterStore, LimiterEngine};

use crate::config::AppConfig;

#[cfg(feature = "redis")]
use storefront_infra::RedisCounterStore;

/// How often expired entries are purged from the in-memory store.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub counter_store: Arc<dyn CounterStore>,
    pub limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    /// Build the application state, choosing the counter store backend.
    ///
    /// Must run inside the actix system: the in-memory sweeper is spawned
    /// on the current runtime.
    pub async fn new(config: &AppConfig) -> Result<Self, StoreError> {
        let counter_store = Self::counter_store(config).await?;
        let limiter: Arc<dyn RateLimiter> = Arc::new(LimiterEngine::new(counter_store.clone()));

        tracing::info!(
            backend = counter_store.backend(),
            "Application state initialized"
        );

        Ok(Self {
            counter_store,
            limiter,
        })
    }

    #[cfg(feature = "redis")]
    async fn counter_store(config: &AppConfig) -> Result<Arc<dyn CounterStore>, StoreError> {
        let Some(redis) = &config.redis else {
            tracing::warn!("REDIS_URL not set. Counting in memory (single instance only).");
            return Ok(Self::memory_store());
        };

        match RedisCounterStore::new(redis.clone()).await {
            Ok(store) => Ok(Arc::new(store)),
            Err(e) if redis.fallback_to_memory => {
                tracing::error!(
                    "Failed to connect to Redis: {}. Using in-memory fallback.",
                    e
                );
                Ok(Self::memory_store())
            }
            Err(e) => Err(e),
        }
    }

    #[cfg(not(feature = "redis"))]
    async fn counter_store(_config: &AppConfig) -> Result<Arc<dyn CounterStore>, StoreError> {
        tracing::info!("Running without redis feature - counting in memory");
        Ok(Self::memory_store())
    }

    fn memory_store() -> Arc<dyn CounterStore> {
        let store = Arc::new(InMemoryCounterStore::new());
        spawn_sweeper(Arc::downgrade(&store));
        store
    }
}

/// Periodically drop expired counters. Stops once the store is dropped.
fn spawn_sweeper(store: std::sync::Weak<InMemoryCounterStore>) {
    actix_rt::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        // First tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            let Some(store) = store.upgrade() else {
                break;
            };

            let purged = store.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "Swept expired rate limit counters");
            }
        }
    });
}
