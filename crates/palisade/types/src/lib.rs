//! Palisade Types - shared vocabulary for the compliance gate
#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);
impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}
impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Region code naming a legal jurisdiction. Compared verbatim.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Jurisdiction(pub String);
impl Jurisdiction {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }
}
impl std::fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionCategory(pub String);
impl ActionCategory {
    pub fn new(category: impl Into<String>) -> Self {
        Self(category.into())
    }
}
impl std::fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied correlation id tying a decision back to the submitting system.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub String);
impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);
impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}
impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Domain-specific attribute value carried by a proposition.
///
/// Unknown attributes are preserved verbatim so rules can reference fields
/// the context builder does not itself understand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}
impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}
impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

/// Severity of a rule: advisory rules warn, blocking rules deny.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Advisory,
    Blocking,
}

/// Normalized, immutable description of one proposed action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposition {
    pub category: ActionCategory,
    pub actor: ActorId,
    pub actor_jurisdiction: Jurisdiction,
    pub data_jurisdiction: Jurisdiction,
    pub classifications: BTreeSet<String>,
    pub attributes: BTreeMap<String, AttrValue>,
}

/// Final verdict for a proposition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Permit,
    Block,
    Indeterminate,
}

impl Verdict {
    pub fn permits_execution(&self) -> bool {
        matches!(self, Verdict::Permit)
    }

    /// CLI front-end exit code contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Permit => 0,
            Verdict::Block => 2,
            Verdict::Indeterminate => 3,
        }
    }
}

/// Per-rule outcome of one evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDisposition {
    /// Predicate evaluated false; the rule did not fire.
    Passed,
    /// Predicate evaluated true; a blocking rule that fires is a violation.
    Fired,
    /// Predicate evaluation itself failed. Fail-closed for blocking rules.
    Errored { reason: String },
    /// The per-rule deadline expired. Fail-closed for blocking rules.
    TimedOut,
    /// The overall evaluation deadline expired before this rule completed.
    Unevaluated,
}

impl RuleDisposition {
    /// True when a blocking rule with this disposition must deny the action.
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            RuleDisposition::Fired
                | RuleDisposition::Errored { .. }
                | RuleDisposition::TimedOut
        )
    }
}

/// One matched rule and how it resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFinding {
    pub rule_id: RuleId,
    pub severity: Severity,
    pub disposition: RuleDisposition,
}

/// The sealed outcome of evaluating one proposition.
///
/// Created exactly once per evaluated proposition and owned by the audit
/// ledger afterwards; nothing mutates a decision once issued.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub correlation_id: CorrelationId,
    pub proposition: Proposition,
    pub verdict: Verdict,
    pub findings: Vec<RuleFinding>,
    /// Advisory rules that fired. Never affect the verdict.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<RuleId>,
    pub ruleset_version: u64,
    pub eval_latency_us: u64,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn matched_rule_ids(&self) -> Vec<RuleId> {
        self.findings.iter().map(|f| f.rule_id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_value_deserializes_untagged() {
        let v: AttrValue = serde_json::from_str("\"eu-west\"").unwrap();
        assert_eq!(v, AttrValue::String("eu-west".to_string()));

        let v: AttrValue = serde_json::from_str("42.5").unwrap();
        assert_eq!(v.as_number(), Some(42.5));

        let v: AttrValue = serde_json::from_str("true").unwrap();
        assert_eq!(v.as_bool(), Some(true));
    }

    #[test]
    fn verdict_exit_codes_match_cli_contract() {
        assert_eq!(Verdict::Permit.exit_code(), 0);
        assert_eq!(Verdict::Block.exit_code(), 2);
        assert_eq!(Verdict::Indeterminate.exit_code(), 3);
    }

    #[test]
    fn blocking_dispositions_fail_closed() {
        assert!(RuleDisposition::Fired.is_violation());
        assert!(RuleDisposition::TimedOut.is_violation());
        assert!(RuleDisposition::Errored {
            reason: "missing attribute".to_string()
        }
        .is_violation());
        assert!(!RuleDisposition::Passed.is_violation());
        assert!(!RuleDisposition::Unevaluated.is_violation());
    }

    #[test]
    fn decision_round_trips_through_json() {
        let decision = Decision {
            correlation_id: CorrelationId::new("req-1"),
            proposition: Proposition {
                category: ActionCategory::new("data_transfer"),
                actor: ActorId::new("svc-export"),
                actor_jurisdiction: Jurisdiction::new("US"),
                data_jurisdiction: Jurisdiction::new("KE"),
                classifications: BTreeSet::from(["pii".to_string()]),
                attributes: BTreeMap::from([(
                    "record_count".to_string(),
                    AttrValue::Number(120.0),
                )]),
            },
            verdict: Verdict::Block,
            findings: vec![RuleFinding {
                rule_id: RuleId::new("ke-residency"),
                severity: Severity::Blocking,
                disposition: RuleDisposition::Fired,
            }],
            warnings: vec![],
            ruleset_version: 1,
            eval_latency_us: 84,
            decided_at: Utc::now(),
        };

        let encoded = serde_json::to_string(&decision).unwrap();
        let decoded: Decision = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, decision);
    }
}
