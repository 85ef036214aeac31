//! Structured logging for the limiter and the HTTP layer.
//!
//! `RUST_LOG` wins when set. Otherwise the limiter crates log at debug so
//! allow/reject decisions and fail-open events are visible, and everything
//! else at info.

use std::env;
use std::fmt;
use std::str::FromStr;

use storefront_core::ConfigError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info,api_server=debug,storefront_infra=debug,tracing_actix_web=info";

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human readable. Local development.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per event, for log shippers.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidValue {
                var: "LOG_FORMAT".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    /// Recorded on the startup event so shipped logs can be told apart.
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            service_name: "storefront-api".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Read `LOG_FORMAT` and `SERVICE_NAME`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            format: match lookup("LOG_FORMAT") {
                Some(raw) => raw.parse()?,
                None => defaults.format,
            },
            service_name: lookup("SERVICE_NAME").unwrap_or(defaults.service_name),
        })
    }
}

/// Install the global tracing subscriber.
pub fn init_telemetry(config: &TelemetryConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }

    tracing::info!(
        service = %config.service_name,
        format = %config.format,
        "Telemetry initialized"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" compact ".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_config_from_lookup() {
        let config = TelemetryConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.service_name, "storefront-api");

        let config = TelemetryConfig::from_lookup(|var| match var {
            "LOG_FORMAT" => Some("json".to_string()),
            "SERVICE_NAME" => Some("checkout-edge".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.service_name, "checkout-edge");

        assert!(TelemetryConfig::from_lookup(|_| Some("yaml".to_string())).is_err());
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
