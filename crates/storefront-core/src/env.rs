//! Typed reads of configuration variables.
//!
//! Every reader takes a lookup function rather than touching the process
//! environment, so configuration can be loaded from a map in tests. A
//! variable that is set but unparseable is an error, never a silent default.

use std::str::FromStr;

use crate::ConfigError;

/// Parse `var` into `T`. Unset yields `None`.
pub fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Result<Option<T>, ConfigError> {
    lookup(var)
        .map(|raw| {
            raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw.clone(),
            })
        })
        .transpose()
}

/// Parse a boolean flag. Accepts `true`/`false`, `1`/`0` and `yes`/`no`.
pub fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Result<Option<bool>, ConfigError> {
    lookup(var)
        .map(|raw| match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw.clone(),
            }),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(value: &'static str) -> impl Fn(&str) -> Option<String> {
        move |_| Some(value.to_string())
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var::<u64>(&lookup(" 250 "), "X"), Ok(Some(250)));
        assert_eq!(parse_var::<u64>(&|_| None, "X"), Ok(None));
        assert_eq!(
            parse_var::<u64>(&lookup("soon"), "X"),
            Err(ConfigError::InvalidValue {
                var: "X".to_string(),
                value: "soon".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool(&lookup("YES"), "X"), Ok(Some(true)));
        assert_eq!(parse_bool(&lookup("0"), "X"), Ok(Some(false)));
        assert!(parse_bool(&lookup("maybe"), "X").is_err());
    }
}
