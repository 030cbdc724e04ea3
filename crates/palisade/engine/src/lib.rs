//! Palisade Engine - turns proposed actions into sealed decisions.
//!
//! The decision engine orchestrates context building, the geofence
//! validator, and the constraint evaluator, then composes a single verdict
//! under a default-deny policy: absence of a rule is never read as absence
//! of risk, and any uncertainty about a blocking rule resolves against the
//! action.

#![deny(unsafe_code)]

pub mod context;
pub mod evaluator;
pub mod geofence;

pub use context::{ContextBuilder, MalformedActionError, RawAction};
pub use evaluator::{
    ConstraintEvaluator, EvaluationResult, EvaluatorConfig, NativeRunner, PredicateRunner,
};
pub use geofence::{GeofenceValidator, GeofenceVerdict};

use chrono::Utc;
use palisade_rules::RuleRegistry;
use palisade_types::{
    ActionCategory, CorrelationId, Decision, RuleDisposition, Severity, Verdict,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

/// Engine-level policy knobs.
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    /// Action categories exempt from default-deny when no rule matches.
    pub no_rule_required: BTreeSet<ActionCategory>,
    pub evaluator: EvaluatorConfig,
}

pub struct DecisionEngine {
    registry: Arc<RuleRegistry>,
    geofence: GeofenceValidator,
    evaluator: ConstraintEvaluator,
    no_rule_required: BTreeSet<ActionCategory>,
}

impl DecisionEngine {
    pub fn new(registry: Arc<RuleRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            geofence: GeofenceValidator,
            evaluator: ConstraintEvaluator::new(config.evaluator),
            no_rule_required: config.no_rule_required,
        }
    }

    /// Replace the predicate runner. Test seam.
    pub fn with_evaluator(mut self, evaluator: ConstraintEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Evaluate one proposed action and seal the outcome into a decision.
    ///
    /// Malformed input is the only error path; every evaluation-time failure
    /// resolves into the verdict instead. The rule-set snapshot is pinned
    /// before evaluation starts, so a concurrent publish never changes the
    /// rules this decision sees.
    pub async fn decide(
        &self,
        correlation_id: CorrelationId,
        raw: RawAction,
    ) -> Result<Decision, MalformedActionError> {
        let proposition = ContextBuilder::build(raw)?;
        let snapshot = self.registry.current();
        let now = Utc::now();
        let started = Instant::now();

        let mut findings = self.geofence.evaluate(&proposition, &snapshot, now);
        let geofence_denied = findings
            .iter()
            .any(|f| f.severity == Severity::Blocking && f.disposition == RuleDisposition::Fired);

        let evaluation = self.evaluator.evaluate(&proposition, &snapshot, now).await;
        let mut warnings = evaluation.warnings();
        warnings.extend(
            findings
                .iter()
                .filter(|f| {
                    f.severity == Severity::Advisory
                        && f.disposition == RuleDisposition::Fired
                })
                .map(|f| f.rule_id.clone()),
        );

        let constraint_violation = evaluation.violations().next().is_some();
        let unresolved_blocking = evaluation.has_unevaluated_blocking();
        findings.extend(evaluation.findings);

        let verdict = if geofence_denied || constraint_violation {
            Verdict::Block
        } else if findings.is_empty() && !self.no_rule_required.contains(&proposition.category) {
            // Default-deny: no rule covered this action and nothing exempts
            // the category.
            Verdict::Block
        } else if unresolved_blocking {
            Verdict::Indeterminate
        } else {
            Verdict::Permit
        };

        let decision = Decision {
            correlation_id,
            proposition,
            verdict,
            findings,
            warnings,
            ruleset_version: snapshot.version(),
            eval_latency_us: started.elapsed().as_micros() as u64,
            decided_at: now,
        };

        tracing::debug!(
            correlation = %decision.correlation_id,
            verdict = ?decision.verdict,
            ruleset_version = decision.ruleset_version,
            matched = decision.findings.len(),
            "decision composed"
        );

        Ok(decision)
    }
}
