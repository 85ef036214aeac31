//! Domain types - rate limit policies, caller identity and decisions.

mod decision;
mod identity;
mod key;
mod policy;

pub use decision::Decision;
pub use identity::CallerContext;
pub use key::{KEY_NAMESPACE, LimitKey};
pub use policy::{
    Algorithm, BypassFn, DEFAULT_REJECTION_MESSAGE, IdentityStrategy, RateLimitConfig,
    SLIDING_WINDOW_MAX_REQUESTS,
};
