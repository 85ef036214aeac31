//! Partner API handlers.

use actix_web::{HttpMessage, HttpRequest, HttpResponse};

use storefront_core::domain::CallerContext;
use storefront_shared::ApiResponse;
use storefront_shared::dto::PartnerStatusResponse;

/// GET /api/partner/status
pub async fn status(req: HttpRequest) -> HttpResponse {
    let authenticated = req
        .extensions()
        .get::<CallerContext>()
        .is_some_and(|caller| caller.credential.is_some());

    HttpResponse::Ok().json(ApiResponse::ok(PartnerStatusResponse {
        status: "ok".to_string(),
        authenticated,
    }))
}
