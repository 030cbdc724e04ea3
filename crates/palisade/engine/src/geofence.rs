//! Residency checks: where may this data be processed.
//!
//! Kept apart from the general constraint evaluator because jurisdiction
//! membership is a cheap, total check that is never subject to the
//! evaluator deadline.

use chrono::{DateTime, Utc};
use palisade_rules::{RuleBody, RuleSet};
use palisade_types::{
    Proposition, RuleDisposition, RuleFinding, RuleId, Severity,
};

/// Outcome of the residency check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GeofenceVerdict {
    Allowed,
    Denied { rule_id: RuleId, reason: String },
}

pub struct GeofenceValidator;

impl GeofenceValidator {
    /// Evaluate every applicable residency rule.
    ///
    /// A residency rule applies when its jurisdiction scope covers the
    /// *data* jurisdiction; it fires when the *actor* (processing) location
    /// is outside the rule's allowed set. Absence of a residency rule for a
    /// jurisdiction is not a violation; residency is opt-in per
    /// jurisdiction.
    pub fn evaluate(
        &self,
        proposition: &Proposition,
        ruleset: &RuleSet,
        at: DateTime<Utc>,
    ) -> Vec<RuleFinding> {
        let mut findings = Vec::new();

        for rule in ruleset.rules() {
            let RuleBody::Residency { allowed } = &rule.body else {
                continue;
            };
            if !rule.in_effect(at)
                || !rule.categories.covers(&proposition.category)
                || !rule.jurisdictions.covers(&proposition.data_jurisdiction)
            {
                continue;
            }

            let disposition = if allowed.contains(&proposition.actor_jurisdiction) {
                RuleDisposition::Passed
            } else {
                RuleDisposition::Fired
            };

            findings.push(RuleFinding {
                rule_id: rule.id.clone(),
                severity: rule.severity,
                disposition,
            });
        }

        findings
    }

    /// The residency verdict for a proposition.
    pub fn check(
        &self,
        proposition: &Proposition,
        ruleset: &RuleSet,
        at: DateTime<Utc>,
    ) -> GeofenceVerdict {
        for finding in self.evaluate(proposition, ruleset, at) {
            // Advisory residency rules warn; only blocking ones deny.
            if finding.disposition == RuleDisposition::Fired
                && finding.severity == Severity::Blocking
            {
                return GeofenceVerdict::Denied {
                    reason: format!(
                        "data in {} may not be processed in {} under rule {}",
                        proposition.data_jurisdiction,
                        proposition.actor_jurisdiction,
                        finding.rule_id
                    ),
                    rule_id: finding.rule_id,
                };
            }
        }
        GeofenceVerdict::Allowed
    }
}
