//! Rule reload handler.

use crate::api::state::AppState;
use crate::error::ApiResult;
use axum::{extract::State, Json};
use palisade_rules::RuleSetDocument;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub version: u64,
    pub content_hash: String,
    pub rule_count: usize,
}

/// Validate and publish a new rule set.
///
/// On rejection the response names the offending rule and the previously
/// active rule set stays in force.
pub async fn reload_rules(
    State(state): State<AppState>,
    Json(document): Json<RuleSetDocument>,
) -> ApiResult<Json<RulesResponse>> {
    let snapshot = state.registry.load(document)?;

    Ok(Json(RulesResponse {
        version: snapshot.version(),
        content_hash: snapshot.content_hash().to_string(),
        rule_count: snapshot.len(),
    }))
}
