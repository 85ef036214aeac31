//! HTTP handlers and route configuration.

#[cfg(feature = "auth")]
mod auth;
mod health;
mod partner;

use actix_web::{HttpRequest, HttpResponse, web};

use storefront_core::domain::CallerContext;

use crate::middleware::error::{AppError, AppResult};
use crate::middleware::rate_limit::RateLimitMiddleware;

/// Path of the health check, exempt from the global limiter.
pub const HEALTH_PATH: &str = "/api/health";

/// Per-route limiters layered under the global one.
#[derive(Clone)]
pub struct RouteLimiters {
    #[cfg(feature = "auth")]
    pub auth: RateLimitMiddleware,
    pub partner: RateLimitMiddleware,
}

/// Bypass predicate for the global policy.
pub fn is_health_check(caller: &CallerContext) -> bool {
    caller.path == HEALTH_PATH
}

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig, limiters: &RouteLimiters) {
    let api = web::scope("/api").route("/health", web::get().to(health::health_check));

    #[cfg(feature = "auth")]
    let api = api.service(
        web::scope("/auth")
            .wrap(limiters.auth.clone())
            .route("/me", web::get().to(auth::me)),
    );

    cfg.service(
        api.service(
            web::scope("/partner")
                .wrap(limiters.partner.clone())
                .route("/status", web::get().to(partner::status)),
        ),
    );
}

/// Fallback for unmatched routes.
pub async fn not_found(req: HttpRequest) -> AppResult<HttpResponse> {
    Err(AppError::NotFound(format!("No route for {}", req.path())))
}
