//! Application state for API handlers.

use palisade_engine::DecisionEngine;
use palisade_ledger::AuditLedger;
use palisade_rules::RuleRegistry;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DecisionEngine>,
    pub registry: Arc<RuleRegistry>,
    pub ledger: AuditLedger,
    pub version: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        engine: Arc<DecisionEngine>,
        registry: Arc<RuleRegistry>,
        ledger: AuditLedger,
    ) -> Self {
        Self {
            engine,
            registry,
            ledger,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string.
    pub fn uptime(&self) -> String {
        let duration = chrono::Utc::now() - self.started_at;
        let secs = duration.num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        }
    }
}
