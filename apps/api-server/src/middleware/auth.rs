//! Bearer authentication extractors.

use actix_web::{FromRequest, HttpRequest, dev::Payload, http::header, web};
use std::future::{Ready, ready};
use std::sync::Arc;

use storefront_core::ports::{AuthError, TokenClaims, TokenService};

use super::error::AppError;

/// Validate the `Authorization: Bearer <token>` header of a request.
///
/// Anonymous requests yield [`AuthError::MissingAuth`] without touching the
/// token service.
pub fn bearer_claims(req: &HttpRequest) -> Result<TokenClaims, AuthError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuth)?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| AuthError::InvalidToken("Invalid authorization header".to_string()))?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidToken("Expected Bearer token".to_string()))?;

    let token_service = req
        .app_data::<web::Data<Arc<dyn TokenService>>>()
        .ok_or_else(|| {
            tracing::error!("TokenService not found in app data");
            AuthError::InvalidToken("Server configuration error".to_string())
        })?;

    token_service.validate_token(token)
}

/// Authenticated principal extractor.
///
/// ```ignore
/// async fn me(identity: Identity) -> impl Responder {
///     format!("Hello, {}!", identity.subject)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
    pub roles: Vec<String>,
}

impl From<TokenClaims> for Identity {
    fn from(claims: TokenClaims) -> Self {
        Self {
            subject: claims.subject,
            roles: claims.roles,
        }
    }
}

impl FromRequest for Identity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            bearer_claims(req)
                .map(Identity::from)
                .map_err(AppError::from),
        )
    }
}
