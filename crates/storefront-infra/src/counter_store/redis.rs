//! Redis counter store with connection management and optional fallback.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client, RedisError, Script};

use storefront_core::ConfigError;
use storefront_core::env::{parse_bool, parse_var};
use storefront_core::ports::{CounterStore, StoreError};

/// Keys requested per SCAN round-trip.
const SCAN_BATCH: usize = 256;

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Upper bound on one command round-trip. A stalled server surfaces as
    /// a store error instead of holding the request.
    pub response_timeout: Duration,
    /// Whether to fallback to the in-memory store if Redis is unavailable
    pub fallback_to_memory: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_millis(1000),
            fallback_to_memory: true,
        }
    }
}

impl RedisConfig {
    /// Read the `REDIS_*` variables. `None` when `REDIS_URL` is unset.
    pub fn from_lookup(
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        let Some(url) = lookup("REDIS_URL") else {
            return Ok(None);
        };
        let defaults = Self::default();

        Ok(Some(Self {
            url,
            connect_timeout: parse_var(lookup, "REDIS_CONNECT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            response_timeout: parse_var(lookup, "REDIS_RESPONSE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.response_timeout),
            fallback_to_memory: parse_bool(lookup, "REDIS_FALLBACK_TO_MEMORY")?
                .unwrap_or(defaults.fallback_to_memory),
        }))
    }
}

/// Redis-backed counter store.
///
/// Uses connection manager for automatic reconnection. Increment-with-expiry
/// runs as a Lua script so a counter is never left without a TTL. Sliding
/// window logs live in one sorted set per identity, scored by timestamp.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    incr_script: Script,
    log_script: Script,
}

impl RedisCounterStore {
    pub async fn new(config: RedisConfig) -> Result<Self, StoreError> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| StoreError::Connection(e.to_string()))?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(config.connect_timeout)
            .set_response_timeout(config.response_timeout);

        // The manager retries internally, bound the whole attempt
        let conn_manager_fut = ConnectionManager::new_with_config(client, manager_config);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| StoreError::Connection("Connection timed out".to_string()))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        // Returns the post-increment count
        let incr_script = Script::new(
            r#"
            local current = redis.call('INCR', KEYS[1])
            if current == 1 then
                redis.call('PEXPIRE', KEYS[1], ARGV[1])
            end
            return current
            "#,
        );

        // ARGV: member, stamp, cutoff, ttl millis. Returns the live entry count
        let log_script = Script::new(
            r#"
            redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', '(' .. ARGV[3])
            redis.call('ZADD', KEYS[1], ARGV[2], ARGV[1])
            redis.call('PEXPIRE', KEYS[1], ARGV[4])
            return redis.call('ZCARD', KEYS[1])
            "#,
        );

        tracing::info!(url = %config.url, "Connected to Redis counter store");

        Ok(Self {
            conn,
            incr_script,
            log_script,
        })
    }
}

fn op_err(e: RedisError) -> StoreError {
    StoreError::Operation(e.to_string())
}

/// Millisecond TTL for Redis. Sub-millisecond durations round up to 1ms
/// because PSETEX and PEXPIRE reject zero.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Turn a literal prefix into a SCAN MATCH pattern.
fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key).await.map_err(op_err)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();

        match ttl {
            Some(duration) => {
                conn.pset_ex::<_, _, ()>(key, value, ttl_millis(duration))
                    .await
                    .map_err(op_err)?;
            }
            None => {
                conn.set::<_, _, ()>(key, value).await.map_err(op_err)?;
            }
        }

        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        conn.incr::<_, _, u64>(key, 1u64).await.map_err(op_err)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let millis = i64::try_from(ttl_millis(ttl)).unwrap_or(i64::MAX);
        conn.pexpire::<_, bool>(key, millis).await.map_err(op_err)
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        self.incr_script
            .key(key)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(op_err)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = prefix_pattern(prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        // SCAN instead of KEYS so a large keyspace does not block the server
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(op_err)?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(op_err)
    }

    async fn log_append(
        &self,
        key: &str,
        member: &str,
        stamped_at: u64,
        cutoff: u64,
        ttl: Duration,
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        self.log_script
            .key(key)
            .arg(member)
            .arg(stamped_at)
            .arg(cutoff)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(op_err)
    }

    async fn log_remove(&self, key: &str, member: &str, _stamped_at: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.zrem::<_, _, ()>(key, member).await.map_err(op_err)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
