//! Health handler.

use crate::api::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub ruleset_version: u64,
    pub ledger_length: u64,
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        ruleset_version: state.registry.current().version(),
        ledger_length: state.ledger.len(),
    })
}
