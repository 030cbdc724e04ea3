//! Decision submission handler.

use crate::api::state::AppState;
use crate::error::ApiResult;
use axum::{extract::State, Json};
use palisade_engine::RawAction;
use palisade_types::{CorrelationId, Verdict};
use serde::{Deserialize, Serialize};

/// A proposed action plus its caller-supplied correlation id.
#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub action: RawAction,
}

#[derive(Debug, Serialize)]
pub struct DecideResponse {
    pub correlation_id: String,
    pub verdict: Verdict,
    pub matched_rules: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub ledger_sequence: u64,
    pub ruleset_version: u64,
}

/// Evaluate a proposed action and seal the decision into the ledger.
///
/// The decision is not final until durably recorded: a ledger failure is
/// surfaced as an error and the caller must resubmit the whole decision.
pub async fn decide(
    State(state): State<AppState>,
    Json(request): Json<DecideRequest>,
) -> ApiResult<Json<DecideResponse>> {
    let correlation_id = request
        .correlation_id
        .map(CorrelationId::new)
        .unwrap_or_else(CorrelationId::generate);

    let decision = state
        .engine
        .decide(correlation_id, request.action)
        .await?;
    let record = state.ledger.append(decision).await?;

    Ok(Json(DecideResponse {
        correlation_id: record.decision.correlation_id.to_string(),
        verdict: record.decision.verdict,
        matched_rules: record
            .decision
            .matched_rule_ids()
            .into_iter()
            .map(|id| id.0)
            .collect(),
        warnings: record
            .decision
            .warnings
            .iter()
            .map(|id| id.0.clone())
            .collect(),
        ledger_sequence: record.seq,
        ruleset_version: record.decision.ruleset_version,
    }))
}
