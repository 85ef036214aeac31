//! # Storefront Core
//!
//! The domain layer of the Storefront rate limiter.
//! This crate contains policy types and port definitions with zero
//! infrastructure dependencies.

pub mod domain;
pub mod env;
pub mod error;
pub mod ports;

pub use error::ConfigError;
