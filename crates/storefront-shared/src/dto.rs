//! Data Transfer Objects - response payloads for the API.

use serde::{Deserialize, Serialize};

/// Authenticated principal as seen by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalResponse {
    pub subject: String,
    pub roles: Vec<String>,
}

/// Service health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Counter store backing the rate limiter (`redis` or `memory`).
    pub counter_store: String,
    pub timestamp: String,
}

/// Partner API status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerStatusResponse {
    pub status: String,
    /// Whether the request carried an API key.
    pub authenticated: bool,
}
