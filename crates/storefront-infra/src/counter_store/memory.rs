//! In-memory counter store - used as fallback when Redis is unavailable.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use storefront_core::ports::{Clock, CounterStore, StoreError};

use crate::clock::SystemClock;

struct Entry {
    value: String,
    expires_at: Option<u64>,
}

impl Entry {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.is_none_or(|exp| now < exp)
    }
}

/// In-memory counter store using an ordered map behind an async RwLock.
///
/// Keys are kept sorted so a prefix listing only visits the matching
/// range. TTLs are measured against the injected clock, so tests can
/// expire windows without sleeping.
/// Note: Counters are per-process and lost on restart.
pub struct InMemoryCounterStore {
    store: RwLock<BTreeMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    fn deadline(&self, ttl: Duration) -> u64 {
        let ttl = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self.clock.now_millis().saturating_add(ttl)
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut store = self.store.write().await;
        let before = store.len();
        store.retain(|_, entry| entry.is_live(now));
        before - store.len()
    }

    /// Number of stored entries, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn increment<'a>(
        store: &'a mut BTreeMap<String, Entry>,
        key: &str,
        now: u64,
    ) -> Result<(u64, &'a mut Entry), StoreError> {
        let entry = store.entry(key.to_string()).or_insert(Entry {
            value: "0".to_string(),
            expires_at: None,
        });

        if !entry.is_live(now) {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }

        let count = entry
            .value
            .parse::<u64>()
            .map_err(|_| StoreError::NotACounter {
                key: key.to_string(),
                value: entry.value.clone(),
            })?
            + 1;
        entry.value = count.to_string();

        Ok((count, entry))
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now_millis();
        let store = self.store.read().await;
        let Some(entry) = store.get(key) else {
            return Ok(None);
        };

        if !entry.is_live(now) {
            drop(store);
            // Clean up expired entry with write lock
            let mut store = self.store.write().await;
            if store.get(key).is_some_and(|entry| !entry.is_live(now)) {
                store.remove(key);
            }
            return Ok(None);
        }

        Ok(Some(entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(|ttl| self.deadline(ttl));
        let mut store = self.store.write().await;

        store.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );

        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let now = self.clock.now_millis();
        let mut store = self.store.write().await;
        let (count, _) = Self::increment(&mut store, key, now)?;
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = self.clock.now_millis();
        let deadline = self.deadline(ttl);
        let mut store = self.store.write().await;

        match store.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = Some(deadline);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = self.clock.now_millis();
        let deadline = self.deadline(ttl);
        // Single write lock: no reader observes the counter without its TTL
        let mut store = self.store.write().await;
        let (count, entry) = Self::increment(&mut store, key, now)?;
        if count == 1 {
            entry.expires_at = Some(deadline);
        }
        Ok(count)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now_millis();
        let store = self.store.read().await;

        // Expired entries are left for the sweeper
        Ok(store
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut store = self.store.write().await;
        store.remove(key);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
