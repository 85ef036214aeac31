//! # Storefront Infrastructure
//!
//! Concrete implementations of the ports defined in `storefront-core`:
//! counter stores, clocks, the limiter engine and bearer token validation.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `auth` - JWT bearer token validation
//! - `redis` - Redis counter store

pub mod clock;
pub mod counter_store;
pub mod rate_limit;

#[cfg(feature = "auth")]
pub mod auth;

// Re-exports - In-Memory
pub use clock::{ManualClock, SystemClock};
pub use counter_store::InMemoryCounterStore;
pub use rate_limit::LimiterEngine;

#[cfg(feature = "auth")]
pub use auth::{JwtConfig, JwtTokenService};

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use counter_store::{RedisConfig, RedisCounterStore};
