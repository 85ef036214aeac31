//! Limit key composition.

use std::fmt;

use crate::domain::Algorithm;

/// Namespace shared by every rate limit key.
pub const KEY_NAMESPACE: &str = "ratelimit";

/// Deterministic store key for one (algorithm, route, identity) triple.
///
/// Layout: `ratelimit:<algorithm>:<route>:<identity>`. Colons and percent
/// signs in the route are percent-escaped so the first three separators
/// are unambiguous and distinct triples cannot produce the same key. The
/// identity is the trailing component and is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey(String);

impl LimitKey {
    pub fn build(algorithm: Algorithm, route: &str, identity: &str) -> Self {
        let route = route.replace('%', "%25").replace(':', "%3A");
        Self(format!(
            "{}:{}:{}:{}",
            KEY_NAMESPACE,
            algorithm.as_str(),
            route,
            identity
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of a sub-record stored under this key, e.g. `K:tokens`.
    pub fn child(&self, suffix: &str) -> String {
        format!("{}:{}", self.0, suffix)
    }
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LimitKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let key = LimitKey::build(Algorithm::FixedWindow, "/api/orders", "203.0.113.7");
        assert_eq!(key.as_str(), "ratelimit:fixed-window:/api/orders:203.0.113.7");
    }

    #[test]
    fn test_same_triple_same_key() {
        let a = LimitKey::build(Algorithm::TokenBucket, "/api/cart", "user-1");
        let b = LimitKey::build(Algorithm::TokenBucket, "/api/cart", "user-1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_components_do_not_alias() {
        // Without escaping both would render as ratelimit:fixed-window:/a:b:c
        let a = LimitKey::build(Algorithm::FixedWindow, "/a:b", "c");
        let b = LimitKey::build(Algorithm::FixedWindow, "/a", "b:c");
        assert_ne!(a, b);

        let a = LimitKey::build(Algorithm::FixedWindow, "/a%3A", "c");
        let b = LimitKey::build(Algorithm::FixedWindow, "/a:", "c");
        assert_ne!(a, b);

        let fixed = LimitKey::build(Algorithm::FixedWindow, "/a", "c");
        let sliding = LimitKey::build(Algorithm::SlidingWindow, "/a", "c");
        assert_ne!(fixed, sliding);
    }

    #[test]
    fn test_ipv6_identity_kept_verbatim() {
        let key = LimitKey::build(Algorithm::SlidingWindow, "/api/orders", "2001:db8::1");
        assert!(key.as_str().ends_with(":/api/orders:2001:db8::1"));
    }

    #[test]
    fn test_child_key() {
        let key = LimitKey::build(Algorithm::TokenBucket, "/api/cart", "user-1");
        assert_eq!(key.child("tokens"), "ratelimit:token-bucket:/api/cart:user-1:tokens");
    }
}
