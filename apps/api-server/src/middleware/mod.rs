//! Middleware modules.

pub mod error;
pub mod rate_limit;

#[cfg(feature = "auth")]
pub mod auth;
