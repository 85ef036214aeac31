//! Caller identity resolution.

use crate::domain::IdentityStrategy;

/// Everything the rate limiter knows about an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    /// Caller network address, always present.
    pub address: String,
    /// Authenticated principal identifier, if any.
    pub principal: Option<String>,
    /// API credential from the designated header or query parameter.
    pub credential: Option<String>,
    pub method: String,
    /// Literal request path, used as the route tag.
    pub path: String,
}

impl CallerContext {
    pub fn new(
        address: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            principal: None,
            credential: None,
            method: method.into(),
            path: path.into(),
        }
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Pick the identity string for `strategy`. Never empty as long as the
    /// address is not.
    pub fn resolve(&self, strategy: IdentityStrategy) -> &str {
        let preferred = match strategy {
            IdentityStrategy::ByAddress => None,
            IdentityStrategy::ByPrincipal => self.principal.as_deref(),
            IdentityStrategy::ByCredential => self.credential.as_deref(),
        };

        preferred
            .filter(|value| !value.is_empty())
            .unwrap_or(self.address.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller() -> CallerContext {
        CallerContext::new("203.0.113.7", "GET", "/api/orders")
    }

    #[test]
    fn test_by_address_ignores_principal_and_credential() {
        let caller = caller().with_principal("user-1").with_credential("key-1");
        assert_eq!(caller.resolve(IdentityStrategy::ByAddress), "203.0.113.7");
    }

    #[test]
    fn test_by_principal() {
        let caller = caller().with_principal("user-1");
        assert_eq!(caller.resolve(IdentityStrategy::ByPrincipal), "user-1");
    }

    #[test]
    fn test_by_principal_falls_back_to_address() {
        assert_eq!(caller().resolve(IdentityStrategy::ByPrincipal), "203.0.113.7");

        let empty = caller().with_principal("");
        assert_eq!(empty.resolve(IdentityStrategy::ByPrincipal), "203.0.113.7");
    }

    #[test]
    fn test_by_credential() {
        let caller = caller().with_principal("user-1").with_credential("key-1");
        assert_eq!(caller.resolve(IdentityStrategy::ByCredential), "key-1");
    }

    #[test]
    fn test_by_credential_falls_back_to_address() {
        let caller = caller().with_principal("user-1");
        assert_eq!(caller.resolve(IdentityStrategy::ByCredential), "203.0.113.7");
    }
}
