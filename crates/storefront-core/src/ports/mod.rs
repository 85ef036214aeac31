//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod auth;
mod clock;
mod counter_store;
mod rate_limit;

pub use auth::{AuthError, TokenClaims, TokenService};
pub use clock::Clock;
pub use counter_store::{CounterStore, StoreError};
pub use rate_limit::{RateLimitError, RateLimiter};
