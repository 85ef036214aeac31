use async_trait::async_trait;
use std::time::Duration;

/// Counter store trait - abstraction over the shared key-value store
/// holding rate limit counters (Redis, in-memory).
///
/// Unlike a best-effort cache, every operation reports backend failures so
/// the caller can decide how to degrade.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Get a value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a value with optional TTL. A `None` TTL removes any existing expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Atomically increment an integer value, creating it at 1 if absent.
    /// An existing expiry is kept.
    async fn incr(&self, key: &str) -> Result<u64, StoreError>;

    /// Set the TTL of an existing key. Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Increment and, when the key was just created, set its TTL.
    ///
    /// The default runs two round-trips, so a failure between them leaves a
    /// counter without expiry. Backends with scripting override this with a
    /// single atomic operation.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let count = self.incr(key).await?;
        if count == 1 {
            self.expire(key, ttl).await?;
        }
        Ok(count)
    }

    /// List every live key starting with `prefix`. The prefix is literal,
    /// not a glob pattern.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Append `member` stamped at `stamped_at` (epoch millis) to the
    /// time-ordered log at `key`, drop entries stamped before `cutoff`, and
    /// return how many entries remain, the new one included. Entries expire
    /// after `ttl`. `member` must be unique and hex encoded.
    ///
    /// The default keeps one key per entry, `key:<stamp>-<member>`, and finds
    /// them with [`keys_with_prefix`](Self::keys_with_prefix). That costs a
    /// prefix listing per call, so backends with ordered sets override it.
    async fn log_append(
        &self,
        key: &str,
        member: &str,
        stamped_at: u64,
        cutoff: u64,
        ttl: Duration,
    ) -> Result<u64, StoreError> {
        self.set(&log_entry_key(key, member, stamped_at), "1", Some(ttl))
            .await?;

        let prefix = format!("{key}:");
        let mut live: u64 = 0;

        for stored in self.keys_with_prefix(&prefix).await? {
            // Keys of other logs can share the prefix, e.g. `a` and `a:b`
            let Some(stamp) = log_entry_stamp(&stored[prefix.len()..]) else {
                continue;
            };

            if stamp < cutoff {
                self.delete(&stored).await?;
            } else {
                live += 1;
            }
        }

        // The new entry counts even if the listing raced it
        Ok(live.max(1))
    }

    /// Remove an entry previously added with [`log_append`](Self::log_append).
    async fn log_remove(&self, key: &str, member: &str, stamped_at: u64) -> Result<(), StoreError> {
        self.delete(&log_entry_key(key, member, stamped_at)).await
    }

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

fn log_entry_key(key: &str, member: &str, stamped_at: u64) -> String {
    format!("{key}:{stamped_at}-{member}")
}

/// Parse the stamp out of an entry suffix `<millis>-<hex member>`.
fn log_entry_stamp(suffix: &str) -> Option<u64> {
    let (millis, member) = suffix.split_once('-')?;
    if millis.is_empty()
        || !millis.bytes().all(|b| b.is_ascii_digit())
        || member.is_empty()
        || !member.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return None;
    }
    millis.parse().ok()
}

/// Counter store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Value at {key} is not a counter: {value}")]
    NotACounter { key: String, value: String },
}
