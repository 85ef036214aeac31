//! Configuration errors.
//!
//! These surface while the process starts up, never per request.

use thiserror::Error;

/// A rate limit policy that cannot be enforced.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_requests must be at least 1")]
    ZeroMaxRequests,

    #[error("window duration must be at least one millisecond")]
    ZeroWindow,

    #[error("sliding window allows at most {ceiling} requests per window, got {requested}")]
    SlidingWindowTooLarge { requested: u32, ceiling: u32 },

    #[error("Unknown rate limit algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Unknown identity strategy: {0}")]
    UnknownStrategy(String),

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
}
