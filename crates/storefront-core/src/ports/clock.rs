//! Window clock port.

/// Wall-clock source used for window boundaries and bucket refills.
///
/// Timestamps are epoch milliseconds so they can be embedded in store keys
/// and compared across processes sharing the same counter store.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}
