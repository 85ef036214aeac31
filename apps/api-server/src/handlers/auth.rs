//! Authenticated handlers.

use actix_web::HttpResponse;

use storefront_shared::ApiResponse;
use storefront_shared::dto::PrincipalResponse;

use crate::middleware::auth::Identity;
use crate::middleware::error::AppResult;

/// GET /api/auth/me - Protected route
pub async fn me(identity: Identity) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::ok(PrincipalResponse {
        subject: identity.subject,
        roles: identity.roles,
    })))
}
