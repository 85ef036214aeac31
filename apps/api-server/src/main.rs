//! # Storefront API Server
//!
//! The main entry point for the Actix-web HTTP server.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - In-memory counter store, address and credential policies only
//! - `auth` - Bearer authentication and principal-keyed limits
//! - `redis` - Redis counter store shared across instances

use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

mod config;
mod handlers;
mod middleware;
mod state;
mod telemetry;

use config::AppConfig;
use handlers::RouteLimiters;
use state::AppState;
use telemetry::{TelemetryConfig, init_telemetry};

#[cfg(feature = "auth")]
use std::sync::Arc;
#[cfg(feature = "auth")]
use storefront_core::ports::TokenService;
#[cfg(feature = "auth")]
use storefront_infra::JwtTokenService;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_telemetry(&TelemetryConfig::from_env().map_err(std::io::Error::other)?);

    // Invalid settings stop the server before it binds
    let config = AppConfig::from_env().map_err(std::io::Error::other)?;

    tracing::info!(
        "Starting Storefront API Server on {}:{}",
        config.host,
        config.port
    );

    let state = AppState::new(&config).await.map_err(std::io::Error::other)?;

    let limits = &config.rate_limits;
    let global = limits
        .middleware(
            limits.global.clone().with_bypass(handlers::is_health_check),
            state.limiter.clone(),
        )
        .map_err(std::io::Error::other)?;
    let routes = RouteLimiters {
        #[cfg(feature = "auth")]
        auth: limits
            .middleware(limits.auth.clone(), state.limiter.clone())
            .map_err(std::io::Error::other)?,
        partner: limits
            .middleware(limits.partner.clone(), state.limiter.clone())
            .map_err(std::io::Error::other)?,
    };

    tracing::info!(
        global = ?limits.global,
        auth = ?limits.auth,
        partner = ?limits.partner,
        trust_proxy = limits.trust_proxy,
        "Rate limit policies loaded"
    );

    #[cfg(feature = "auth")]
    let token_service: Arc<dyn TokenService> = Arc::new(JwtTokenService::new(config.jwt.clone()));

    HttpServer::new(move || {
        let app = App::new()
            .wrap(global.clone())
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()));

        #[cfg(feature = "auth")]
        let app = app.app_data(web::Data::new(token_service.clone()));

        app.configure(|cfg| handlers::configure_routes(cfg, &routes))
            .default_service(web::to(handlers::not_found))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
