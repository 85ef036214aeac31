//! Health check endpoint.

use actix_web::{HttpResponse, web};

use storefront_shared::dto::HealthResponse;

use crate::state::AppState;

/// Health check endpoint - returns server status and the counter store in use.
///
/// GET /api/health
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        counter_store: state.counter_store.backend().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    HttpResponse::Ok().json(response)
}
