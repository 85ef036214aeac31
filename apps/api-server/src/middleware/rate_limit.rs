//! Rate limiting middleware.
//!
//! Resolves the caller, asks the limiter for a decision, publishes the
//! `X-RateLimit-*` headers and rejects with 429 once the policy is spent.
//! When the counter store misbehaves the request goes through unaccounted:
//! availability wins over strict enforcement.

use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{self, HeaderMap, HeaderName, HeaderValue},
    web,
};
use std::collections::HashMap;
use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use storefront_core::ConfigError;
use storefront_core::domain::{CallerContext, Decision, LimitKey, RateLimitConfig};
use storefront_core::ports::RateLimiter;
use storefront_shared::ErrorResponse;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Where an API credential is looked up: the header first, then the query.
#[derive(Debug, Clone)]
pub struct CredentialSource {
    header: HeaderName,
    query_param: String,
}

impl CredentialSource {
    pub fn new(header: &str, query_param: impl Into<String>) -> Result<Self, ConfigError> {
        let header = HeaderName::from_bytes(header.as_bytes()).map_err(|_| {
            ConfigError::InvalidValue {
                var: "credential header".to_string(),
                value: header.to_string(),
            }
        })?;

        Ok(Self {
            header,
            query_param: query_param.into(),
        })
    }

    fn extract(&self, req: &ServiceRequest) -> Option<String> {
        let from_header = req
            .headers()
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);

        from_header.or_else(|| {
            web::Query::<HashMap<String, String>>::from_query(req.query_string())
                .ok()
                .and_then(|query| query.into_inner().remove(&self.query_param))
                .filter(|v| !v.is_empty())
        })
    }
}

impl Default for CredentialSource {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static("x-api-key"),
            query_param: "api_key".to_string(),
        }
    }
}

struct Inner {
    config: RateLimitConfig,
    limiter: Arc<dyn RateLimiter>,
    credential: CredentialSource,
    trust_proxy: bool,
}

impl Inner {
    fn caller_context(&self, req: &ServiceRequest) -> CallerContext {
        let address = if self.trust_proxy {
            req.connection_info().realip_remote_addr().map(String::from)
        } else {
            req.peer_addr().map(|addr| addr.ip().to_string())
        };

        CallerContext {
            address: address.unwrap_or_else(|| "unknown".to_string()),
            principal: principal(req),
            credential: self.credential.extract(req),
            method: req.method().to_string(),
            path: req.path().to_string(),
        }
    }

    fn rejection(&self, decision: &Decision) -> HttpResponse {
        let retry_after = self.config.retry_after_secs();
        let body = ErrorResponse::rate_limited(self.config.message.clone(), retry_after);

        let mut response = HttpResponse::TooManyRequests()
            .insert_header((header::RETRY_AFTER, retry_after.to_string()))
            .json(body);
        apply_headers(response.headers_mut(), decision);
        response
    }
}

#[cfg(feature = "auth")]
fn principal(req: &ServiceRequest) -> Option<String> {
    crate::middleware::auth::bearer_claims(req.request())
        .ok()
        .map(|claims| claims.subject)
}

#[cfg(not(feature = "auth"))]
fn principal(_req: &ServiceRequest) -> Option<String> {
    None
}

fn apply_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(decision.reset_at_epoch_seconds),
    );
}

/// Publish `decision` unless a nested limiter already reported one with
/// less quota left. A scoped 429 keeps its own headers under a global policy.
fn merge_headers(headers: &mut HeaderMap, decision: &Decision) {
    let nested_remaining = headers
        .get(&X_RATELIMIT_REMAINING)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u32>().ok());

    if nested_remaining.is_some_and(|remaining| remaining <= decision.remaining) {
        return;
    }
    apply_headers(headers, decision);
}

/// Rate limiting middleware factory.
///
/// Wrap an `App` for a global policy or a `Scope` for a per-route one:
/// ```ignore
/// let limiter = RateLimitMiddleware::new(config, engine)?;
/// App::new().service(web::scope("/api/orders").wrap(limiter).route(...))
/// ```
#[derive(Clone)]
pub struct RateLimitMiddleware {
    inner: Arc<Inner>,
}

impl RateLimitMiddleware {
    /// Fails when the policy cannot be enforced, so a bad configuration
    /// stops the process at startup rather than surfacing per request.
    pub fn new(config: RateLimitConfig, limiter: Arc<dyn RateLimiter>) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                limiter,
                credential: CredentialSource::default(),
                trust_proxy: false,
            }),
        })
    }

    pub fn with_credential_source(self, credential: CredentialSource) -> Self {
        self.map_inner(|inner| inner.credential = credential)
    }

    /// Take the caller address from `Forwarded`/`X-Forwarded-For`. Only
    /// enable behind a proxy that overwrites those headers.
    pub fn trust_proxy(self, trust: bool) -> Self {
        self.map_inner(|inner| inner.trust_proxy = trust)
    }

    fn map_inner(self, f: impl FnOnce(&mut Inner)) -> Self {
        let mut inner = match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner,
            Err(shared) => Inner {
                config: shared.config.clone(),
                limiter: shared.limiter.clone(),
                credential: shared.credential.clone(),
                trust_proxy: shared.trust_proxy,
            },
        };
        f(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            inner: self.inner.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    inner: Arc<Inner>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let inner = Arc::clone(&self.inner);

        Box::pin(async move {
            let caller = inner.caller_context(&req);
            // Handlers can read how the caller was identified
            req.extensions_mut().insert(caller.clone());

            if inner.config.is_bypassed(&caller) {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            let identity = caller.resolve(inner.config.identity_strategy);
            let key = LimitKey::build(inner.config.algorithm, &caller.path, identity);

            let decision = match inner.limiter.evaluate(&inner.config, &key).await {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Rate limiter unavailable, failing open");
                    let res = service.call(req).await?;
                    return Ok(res.map_into_left_body());
                }
            };

            if !decision.allowed {
                tracing::warn!(
                    key = %key,
                    count = decision.current_count,
                    limit = decision.limit,
                    "Rate limit exceeded"
                );

                let response = inner.rejection(&decision);
                let (http_req, _payload) = req.into_parts();
                return Ok(ServiceResponse::new(http_req, response).map_into_right_body());
            }

            let mut res = service.call(req).await?;
            merge_headers(res.headers_mut(), &decision);
            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};
    use async_trait::async_trait;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use storefront_core::domain::{Algorithm, IdentityStrategy};
    use storefront_core::ports::{Clock, RateLimitError, StoreError};
    use storefront_infra::{InMemoryCounterStore, LimiterEngine, ManualClock};

    fn engine() -> (Arc<dyn RateLimiter>, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        let store = Arc::new(InMemoryCounterStore::with_clock(Arc::new(clock.clone())));
        let engine = LimiterEngine::with_clock(store, Arc::new(clock.clone()));
        (Arc::new(engine), clock)
    }

    fn peer(ip: &str) -> SocketAddr {
        format!("{ip}:40000").parse().unwrap()
    }

    async fn ok() -> HttpResponse {
        HttpResponse::Ok().body("ok")
    }

    fn get(uri: &str, ip: &str) -> test::TestRequest {
        test::TestRequest::get().uri(uri).peer_addr(peer(ip))
    }

    struct UnavailableLimiter;

    #[async_trait]
    impl RateLimiter for UnavailableLimiter {
        async fn evaluate(
            &self,
            _config: &RateLimitConfig,
            _key: &LimitKey,
        ) -> Result<Decision, RateLimitError> {
            Err(StoreError::Connection("Connection refused".to_string()).into())
        }
    }

    /// Counts evaluations and delegates to a real engine.
    struct CountingLimiter {
        calls: AtomicUsize,
        inner: Arc<dyn RateLimiter>,
    }

    #[async_trait]
    impl RateLimiter for CountingLimiter {
        async fn evaluate(
            &self,
            config: &RateLimitConfig,
            key: &LimitKey,
        ) -> Result<Decision, RateLimitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.evaluate(config, key).await
        }
    }

    #[actix_web::test]
    async fn test_fixed_window_allows_then_rejects() {
        let (limiter, clock) = engine();
        let config = RateLimitConfig::new(Duration::from_secs(60), 3, Algorithm::FixedWindow);
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(config, limiter).unwrap())
                .route("/api/orders", web::get().to(ok)),
        )
        .await;

        for expected_remaining in ["2", "1", "0"] {
            let res = test::call_service(&app, get("/api/orders", "198.51.100.1").to_request()).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(res.headers().get(X_RATELIMIT_LIMIT).unwrap(), "3");
            assert_eq!(
                res.headers().get(X_RATELIMIT_REMAINING).unwrap(),
                expected_remaining
            );
        }

        let res = test::call_service(&app, get("/api/orders", "198.51.100.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers().get(header::RETRY_AFTER).unwrap(), "60");
        assert_eq!(res.headers().get(X_RATELIMIT_REMAINING).unwrap(), "0");

        let reset: u64 = res
            .headers()
            .get(X_RATELIMIT_RESET)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(reset >= clock.now_millis() / 1000);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["error"]["retryAfter"], 60);
        assert!(body["message"].is_string());
    }

    #[actix_web::test]
    async fn test_addresses_limited_independently() {
        let (limiter, _) = engine();
        let config = RateLimitConfig::new(Duration::from_secs(60), 1, Algorithm::FixedWindow);
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(config, limiter).unwrap())
                .route("/api/orders", web::get().to(ok)),
        )
        .await;

        let first = test::call_service(&app, get("/api/orders", "198.51.100.1").to_request()).await;
        let second = test::call_service(&app, get("/api/orders", "198.51.100.2").to_request()).await;
        let again = test::call_service(&app, get("/api/orders", "198.51.100.1").to_request()).await;

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(again.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[actix_web::test]
    async fn test_routes_limited_independently() {
        let (limiter, _) = engine();
        let config = RateLimitConfig::new(Duration::from_secs(60), 1, Algorithm::FixedWindow);
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(config, limiter).unwrap())
                .route("/api/orders", web::get().to(ok))
                .route("/api/cart", web::get().to(ok)),
        )
        .await;

        let orders = test::call_service(&app, get("/api/orders", "198.51.100.1").to_request()).await;
        let cart = test::call_service(&app, get("/api/cart", "198.51.100.1").to_request()).await;

        assert_eq!(orders.status(), StatusCode::OK);
        assert_eq!(cart.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_fails_open_when_store_unavailable() {
        let config = RateLimitConfig::new(Duration::from_secs(60), 1, Algorithm::TokenBucket);
        let middleware = RateLimitMiddleware::new(config, Arc::new(UnavailableLimiter)).unwrap();
        let app = test::init_service(
            App::new()
                .wrap(middleware)
                .route("/api/orders", web::get().to(ok)),
        )
        .await;

        for _ in 0..3 {
            let res = test::call_service(&app, get("/api/orders", "198.51.100.1").to_request()).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert!(res.headers().get(X_RATELIMIT_LIMIT).is_none());
        }
    }

    #[actix_web::test]
    async fn test_bypass_skips_accounting() {
        let (inner, _) = engine();
        let counting = Arc::new(CountingLimiter {
            calls: AtomicUsize::new(0),
            inner,
        });
        let config = RateLimitConfig::new(Duration::from_secs(60), 1, Algorithm::SlidingWindow)
            .with_bypass(|caller| caller.path == "/api/health");
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(config, counting.clone()).unwrap())
                .route("/api/health", web::get().to(ok))
                .route("/api/orders", web::get().to(ok)),
        )
        .await;

        for _ in 0..3 {
            let res = test::call_service(&app, get("/api/health", "198.51.100.1").to_request()).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert!(res.headers().get(X_RATELIMIT_LIMIT).is_none());
            assert!(res.headers().get(X_RATELIMIT_REMAINING).is_none());
            assert!(res.headers().get(X_RATELIMIT_RESET).is_none());
        }
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);

        let res = test::call_service(&app, get("/api/orders", "198.51.100.1").to_request()).await;
        assert!(res.headers().get(X_RATELIMIT_LIMIT).is_some());
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn test_credential_identity_from_header_or_query() {
        let (limiter, _) = engine();
        let config = RateLimitConfig::new(Duration::from_secs(60), 1, Algorithm::SlidingWindow)
            .with_identity_strategy(IdentityStrategy::ByCredential);
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(config, limiter).unwrap())
                .route("/api/partner/status", web::get().to(ok)),
        )
        .await;

        let by_header = get("/api/partner/status", "198.51.100.1")
            .insert_header(("x-api-key", "key-a"))
            .to_request();
        assert_eq!(test::call_service(&app, by_header).await.status(), StatusCode::OK);

        // Same credential from another address and via the query string
        let by_query = get("/api/partner/status?api_key=key-a", "198.51.100.2").to_request();
        assert_eq!(
            test::call_service(&app, by_query).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );

        let other_key = get("/api/partner/status", "198.51.100.1")
            .insert_header(("x-api-key", "key-b"))
            .to_request();
        assert_eq!(test::call_service(&app, other_key).await.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_custom_credential_source() {
        let (limiter, _) = engine();
        let config = RateLimitConfig::new(Duration::from_secs(60), 1, Algorithm::FixedWindow)
            .with_identity_strategy(IdentityStrategy::ByCredential);
        let middleware = RateLimitMiddleware::new(config, limiter)
            .unwrap()
            .with_credential_source(CredentialSource::new("X-Partner-Token", "token").unwrap());
        let app = test::init_service(
            App::new()
                .wrap(middleware)
                .route("/api/partner/status", web::get().to(ok)),
        )
        .await;

        let first = get("/api/partner/status", "198.51.100.1")
            .insert_header(("x-partner-token", "p-1"))
            .to_request();
        let second = get("/api/partner/status?token=p-1", "198.51.100.9").to_request();

        assert_eq!(test::call_service(&app, first).await.status(), StatusCode::OK);
        assert_eq!(
            test::call_service(&app, second).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[actix_web::test]
    async fn test_trust_proxy_uses_forwarded_address() {
        let (limiter, _) = engine();
        let config = RateLimitConfig::new(Duration::from_secs(60), 1, Algorithm::FixedWindow);
        let middleware = RateLimitMiddleware::new(config, limiter)
            .unwrap()
            .trust_proxy(true);
        let app = test::init_service(
            App::new()
                .wrap(middleware)
                .route("/api/orders", web::get().to(ok)),
        )
        .await;

        // Same proxy address, different clients
        for client in ["203.0.113.10", "203.0.113.11"] {
            let req = get("/api/orders", "10.0.0.1")
                .insert_header(("x-forwarded-for", client))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        }
    }

    #[actix_web::test]
    async fn test_token_bucket_headers_consistent() {
        let (limiter, _) = engine();
        let config = RateLimitConfig::new(Duration::from_secs(10), 2, Algorithm::TokenBucket);
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(config, limiter).unwrap())
                .route("/api/orders", web::get().to(ok)),
        )
        .await;

        let mut remaining = Vec::new();
        for _ in 0..3 {
            let res = test::call_service(&app, get("/api/orders", "198.51.100.1").to_request()).await;
            let value = res.headers().get(X_RATELIMIT_REMAINING).unwrap();
            remaining.push(value.to_str().unwrap().to_string());
        }

        assert_eq!(remaining, vec!["1", "0", "0"]);
    }

    fn layered_app_limiters(
        global_max: u32,
        scoped_max: u32,
    ) -> (RateLimitMiddleware, RateLimitMiddleware) {
        let (limiter, _) = engine();
        let window = Duration::from_secs(60);
        let global = RateLimitConfig::new(window, global_max, Algorithm::FixedWindow);
        let scoped = RateLimitConfig::new(window, scoped_max, Algorithm::SlidingWindow);
        (
            RateLimitMiddleware::new(global, limiter.clone()).unwrap(),
            RateLimitMiddleware::new(scoped, limiter).unwrap(),
        )
    }

    #[actix_web::test]
    async fn test_scoped_rejection_keeps_its_headers_under_global_limit() {
        let (global, scoped) = layered_app_limiters(100, 1);
        let app = test::init_service(
            App::new().wrap(global).service(
                web::scope("/api/partner")
                    .wrap(scoped)
                    .route("/status", web::get().to(ok)),
            ),
        )
        .await;

        let first = test::call_service(&app, get("/api/partner/status", "198.51.100.1").to_request()).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers().get(X_RATELIMIT_LIMIT).unwrap(), "1");
        assert_eq!(first.headers().get(X_RATELIMIT_REMAINING).unwrap(), "0");

        let second = test::call_service(&app, get("/api/partner/status", "198.51.100.1").to_request()).await;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers().get(X_RATELIMIT_LIMIT).unwrap(), "1");
        assert_eq!(second.headers().get(X_RATELIMIT_REMAINING).unwrap(), "0");
    }

    #[actix_web::test]
    async fn test_tighter_global_limit_wins_headers() {
        let (global, scoped) = layered_app_limiters(1, 10);
        let app = test::init_service(
            App::new().wrap(global).service(
                web::scope("/api/partner")
                    .wrap(scoped)
                    .route("/status", web::get().to(ok)),
            ),
        )
        .await;

        let res = test::call_service(&app, get("/api/partner/status", "198.51.100.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get(X_RATELIMIT_LIMIT).unwrap(), "1");
        assert_eq!(res.headers().get(X_RATELIMIT_REMAINING).unwrap(), "0");
    }

    #[actix_web::test]
    async fn test_factory_rejects_invalid_config() {
        let (limiter, _) = engine();
        let config = RateLimitConfig::new(Duration::from_secs(60), 0, Algorithm::FixedWindow);
        assert!(matches!(
            RateLimitMiddleware::new(config, limiter),
            Err(ConfigError::ZeroMaxRequests)
        ));
    }

    #[actix_web::test]
    async fn test_credential_source_rejects_bad_header() {
        assert!(CredentialSource::new("bad header", "api_key").is_err());
    }
}
