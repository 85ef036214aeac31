//! Application configuration loaded from environment variables.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use storefront_core::ConfigError;
use storefront_core::env::{parse_bool, parse_var};
use storefront_core::domain::{Algorithm, IdentityStrategy, RateLimitConfig};
use storefront_core::ports::RateLimiter;

use crate::middleware::rate_limit::{CredentialSource, RateLimitMiddleware};

#[cfg(feature = "auth")]
use storefront_infra::JwtConfig;
#[cfg(feature = "redis")]
use storefront_infra::RedisConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rate_limits: RateLimitSettings,
    /// Shared counter store. `None` counts in memory.
    #[cfg(feature = "redis")]
    pub redis: Option<RedisConfig>,
    #[cfg(feature = "auth")]
    pub jwt: JwtConfig,
}

/// Rate limit policies and how callers are identified.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    /// Applied to every route except the health check.
    pub global: RateLimitConfig,
    /// Authenticated routes, keyed by principal.
    pub auth: RateLimitConfig,
    /// Partner routes, keyed by API credential.
    pub partner: RateLimitConfig,
    pub trust_proxy: bool,
    pub credential_header: String,
    pub credential_query: String,
}

/// Fallback values for one policy when its variables are unset.
struct PolicyDefaults {
    max_requests: u32,
    window_secs: u64,
    algorithm: Algorithm,
    strategy: IdentityStrategy,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_var(&lookup, "PORT")?.unwrap_or(8080),
            rate_limits: RateLimitSettings::from_lookup(&lookup)?,
            #[cfg(feature = "redis")]
            redis: RedisConfig::from_lookup(&lookup)?,
            #[cfg(feature = "auth")]
            jwt: JwtConfig::from_lookup(&lookup)?,
        })
    }
}

impl RateLimitSettings {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            global: policy(
                lookup,
                "RATE_LIMIT",
                PolicyDefaults {
                    max_requests: 100,
                    window_secs: 60,
                    algorithm: Algorithm::FixedWindow,
                    strategy: IdentityStrategy::ByAddress,
                },
            )?,
            auth: policy(
                lookup,
                "AUTH_RATE_LIMIT",
                PolicyDefaults {
                    max_requests: 30,
                    window_secs: 60,
                    algorithm: Algorithm::TokenBucket,
                    strategy: IdentityStrategy::ByPrincipal,
                },
            )?,
            partner: policy(
                lookup,
                "PARTNER_RATE_LIMIT",
                PolicyDefaults {
                    max_requests: 60,
                    window_secs: 60,
                    algorithm: Algorithm::SlidingWindow,
                    strategy: IdentityStrategy::ByCredential,
                },
            )?,
            trust_proxy: parse_bool(lookup, "RATE_LIMIT_TRUST_PROXY")?.unwrap_or(false),
            credential_header: lookup("RATE_LIMIT_CREDENTIAL_HEADER")
                .unwrap_or_else(|| "x-api-key".to_string()),
            credential_query: lookup("RATE_LIMIT_CREDENTIAL_QUERY")
                .unwrap_or_else(|| "api_key".to_string()),
        })
    }

    /// Build the middleware enforcing `policy` with the shared caller settings.
    pub fn middleware(
        &self,
        policy: RateLimitConfig,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<RateLimitMiddleware, ConfigError> {
        let credential = CredentialSource::new(&self.credential_header, &self.credential_query)?;

        Ok(RateLimitMiddleware::new(policy, limiter)?
            .with_credential_source(credential)
            .trust_proxy(self.trust_proxy))
    }
}

fn policy(
    lookup: &impl Fn(&str) -> Option<String>,
    prefix: &str,
    defaults: PolicyDefaults,
) -> Result<RateLimitConfig, ConfigError> {
    let max_requests = parse_var(lookup, &format!("{prefix}_MAX_REQUESTS"))?
        .unwrap_or(defaults.max_requests);
    let window_secs =
        parse_var(lookup, &format!("{prefix}_WINDOW_SECS"))?.unwrap_or(defaults.window_secs);

    // Algorithm and strategy carry their own error variants
    let algorithm = match lookup(&format!("{prefix}_ALGORITHM")) {
        Some(raw) => raw.parse()?,
        None => defaults.algorithm,
    };
    let strategy = match lookup(&format!("{prefix}_STRATEGY")) {
        Some(raw) => raw.parse()?,
        None => defaults.strategy,
    };

    let mut config =
        RateLimitConfig::new(Duration::from_secs(window_secs), max_requests, algorithm)
            .with_identity_strategy(strategy);
    if let Some(message) = lookup(&format!("{prefix}_MESSAGE")) {
        config = config.with_message(message);
    }
    config.validate()?;
    Ok(config)
}
