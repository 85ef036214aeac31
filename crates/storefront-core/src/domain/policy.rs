//! Rate limit policy - what a protected route allows.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::CallerContext;
use crate::error::ConfigError;

/// Largest `max_requests` accepted for [`Algorithm::SlidingWindow`].
///
/// Stores without an ordered log enumerate the identity's entries on every
/// sliding-window evaluation. Only accepted requests keep one, so this
/// bounds each enumeration.
pub const SLIDING_WINDOW_MAX_REQUESTS: u32 = 10_000;

/// Default body message for rejected requests.
pub const DEFAULT_REJECTION_MESSAGE: &str = "Too many requests, please try again later.";

/// Throttling algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    FixedWindow,
    SlidingWindow,
    TokenBucket,
}

impl Algorithm {
    /// Tag used in store keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::FixedWindow => "fixed-window",
            Algorithm::SlidingWindow => "sliding-window",
            Algorithm::TokenBucket => "token-bucket",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fixed-window" | "fixed" => Ok(Algorithm::FixedWindow),
            "sliding-window" | "sliding" => Ok(Algorithm::SlidingWindow),
            "token-bucket" | "bucket" => Ok(Algorithm::TokenBucket),
            _ => Err(ConfigError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// How the caller is identified for accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IdentityStrategy {
    /// Caller network address.
    #[default]
    ByAddress,
    /// Authenticated principal, falling back to the address.
    ByPrincipal,
    /// API credential, falling back to the address.
    ByCredential,
}

impl FromStr for IdentityStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "address" | "ip" => Ok(IdentityStrategy::ByAddress),
            "principal" | "user" => Ok(IdentityStrategy::ByPrincipal),
            "credential" | "api-key" | "api_key" => Ok(IdentityStrategy::ByCredential),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Predicate deciding that a request skips rate limiting entirely.
pub type BypassFn = Arc<dyn Fn(&CallerContext) -> bool + Send + Sync>;

/// Rate limit policy for one protected route or scope.
///
/// Built once at startup and shared read-only by every request.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Window duration.
    pub window: Duration,
    /// Maximum requests per window.
    pub max_requests: u32,
    pub algorithm: Algorithm,
    pub identity_strategy: IdentityStrategy,
    /// Message placed in the 429 body.
    pub message: String,
    bypass: Option<BypassFn>,
}

impl RateLimitConfig {
    pub fn new(window: Duration, max_requests: u32, algorithm: Algorithm) -> Self {
        Self {
            window,
            max_requests,
            algorithm,
            identity_strategy: IdentityStrategy::default(),
            message: DEFAULT_REJECTION_MESSAGE.to_string(),
            bypass: None,
        }
    }

    pub fn with_identity_strategy(mut self, strategy: IdentityStrategy) -> Self {
        self.identity_strategy = strategy;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Skip accounting for requests matching `predicate`.
    pub fn with_bypass<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CallerContext) -> bool + Send + Sync + 'static,
    {
        self.bypass = Some(Arc::new(predicate));
        self
    }

    pub fn is_bypassed(&self, caller: &CallerContext) -> bool {
        self.bypass.as_ref().is_some_and(|bypass| bypass(caller))
    }

    pub fn window_millis(&self) -> u64 {
        u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX)
    }

    /// Window length in whole seconds, rounded up, as advertised to clients.
    pub fn retry_after_secs(&self) -> u64 {
        self.window_millis().div_ceil(1000)
    }

    /// Reject policies that cannot be enforced.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests == 0 {
            return Err(ConfigError::ZeroMaxRequests);
        }
        if self.window_millis() == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.algorithm == Algorithm::SlidingWindow
            && self.max_requests > SLIDING_WINDOW_MAX_REQUESTS
        {
            return Err(ConfigError::SlidingWindowTooLarge {
                requested: self.max_requests,
                ceiling: SLIDING_WINDOW_MAX_REQUESTS,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for RateLimitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitConfig")
            .field("window", &self.window)
            .field("max_requests", &self.max_requests)
            .field("algorithm", &self.algorithm)
            .field("identity_strategy", &self.identity_strategy)
            .field("message", &self.message)
            .field("bypass", &self.bypass.is_some())
            .finish()
    }
}
