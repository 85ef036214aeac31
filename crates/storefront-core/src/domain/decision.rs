/// Outcome of evaluating one request against a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Configured maximum per window.
    pub limit: u32,
    /// Requests counted in the current window, including this one. May
    /// exceed `limit` for rejected requests.
    pub current_count: u64,
    /// `max(0, limit - current_count)`.
    pub remaining: u32,
    /// When the window ends, in epoch seconds.
    pub reset_at_epoch_seconds: u64,
}

impl Decision {
    pub fn new(allowed: bool, limit: u32, current_count: u64, reset_at_epoch_seconds: u64) -> Self {
        let remaining = u64::from(limit).saturating_sub(current_count) as u32;
        Self {
            allowed,
            limit,
            current_count,
            remaining,
            reset_at_epoch_seconds,
        }
    }
}
