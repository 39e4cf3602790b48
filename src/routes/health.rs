//! Service health endpoint used for readiness checks and tests.

use crate::registry::RunRegistry;
use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

/// Basic response payload describing API health.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Static status string reporting application readiness.
    pub status: String,
    /// Crate version serving the request.
    pub version: String,
    /// Runs still in progress.
    pub active_runs: usize,
}

/// Health check endpoint returning a small JSON payload.
#[openapi(tag = "Health")]
#[get("/health")]
pub fn health_check(registry: &State<RunRegistry>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_runs: registry.running(),
    })
}
