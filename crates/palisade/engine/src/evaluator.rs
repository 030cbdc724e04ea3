//! Bounded-time, fail-closed constraint evaluation.
//!
//! Every matching constraint rule is evaluated under a per-rule deadline; a
//! rule whose predicate errors or exhausts its deadline cannot be proven
//! false and is reported as a violation, never skipped. An optional overall
//! deadline bounds the whole evaluation; rules still in flight at expiry are
//! abandoned (not awaited further) and reported unevaluated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use palisade_rules::{Predicate, Rule, RuleBody, RuleSet};
use palisade_types::{Proposition, RuleDisposition, RuleFinding, RuleId, Severity};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};

/// Deadlines for one evaluation.
#[derive(Clone, Copy, Debug)]
pub struct EvaluatorConfig {
    /// Budget for a single rule's predicate.
    pub rule_deadline: Duration,
    /// Budget for the evaluation as a whole. `None` disables the bound.
    pub overall_deadline: Option<Duration>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            rule_deadline: Duration::from_millis(250),
            overall_deadline: Some(Duration::from_secs(2)),
        }
    }
}

/// Seam through which predicates are executed.
///
/// The production runner evaluates the closed predicate set directly; tests
/// inject runners that stall or fail to exercise the deadline paths.
#[async_trait]
pub trait PredicateRunner: Send + Sync {
    /// Run a predicate; the error string becomes the errored disposition's
    /// reason.
    async fn run(
        &self,
        predicate: &Predicate,
        proposition: &Proposition,
    ) -> Result<bool, String>;
}

/// Evaluates predicates on the blocking pool so an expired deadline abandons
/// the work without cancelling it mid-computation.
pub struct NativeRunner;

#[async_trait]
impl PredicateRunner for NativeRunner {
    async fn run(
        &self,
        predicate: &Predicate,
        proposition: &Proposition,
    ) -> Result<bool, String> {
        let predicate = predicate.clone();
        let proposition = proposition.clone();
        match tokio::task::spawn_blocking(move || predicate.evaluate(&proposition)).await {
            Ok(Ok(held)) => Ok(held),
            Ok(Err(err)) => Err(err.to_string()),
            Err(join) => Err(format!("predicate evaluation aborted: {join}")),
        }
    }
}

/// Everything the evaluator learned about one proposition.
#[derive(Clone, Debug, Default)]
pub struct EvaluationResult {
    pub findings: Vec<RuleFinding>,
}

impl EvaluationResult {
    /// Blocking rules that fired, errored, or timed out. Any of these denies
    /// the action.
    pub fn violations(&self) -> impl Iterator<Item = &RuleFinding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Blocking && f.disposition.is_violation())
    }

    /// Advisory rules that fired.
    pub fn warnings(&self) -> Vec<RuleId> {
        self.findings
            .iter()
            .filter(|f| {
                f.severity == Severity::Advisory && f.disposition == RuleDisposition::Fired
            })
            .map(|f| f.rule_id.clone())
            .collect()
    }

    /// True when at least one blocking rule was left unevaluated by the
    /// overall deadline.
    pub fn has_unevaluated_blocking(&self) -> bool {
        self.findings.iter().any(|f| {
            f.severity == Severity::Blocking && f.disposition == RuleDisposition::Unevaluated
        })
    }
}

pub struct ConstraintEvaluator {
    config: EvaluatorConfig,
    runner: Arc<dyn PredicateRunner>,
}

impl ConstraintEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self::with_runner(config, Arc::new(NativeRunner))
    }

    pub fn with_runner(config: EvaluatorConfig, runner: Arc<dyn PredicateRunner>) -> Self {
        Self { config, runner }
    }

    /// Evaluate every matching constraint rule against a proposition.
    ///
    /// Residency rules are the geofence validator's concern and are skipped
    /// here.
    pub async fn evaluate(
        &self,
        proposition: &Proposition,
        ruleset: &RuleSet,
        at: DateTime<Utc>,
    ) -> EvaluationResult {
        let matched: Vec<&Rule> = ruleset
            .rules()
            .filter(|rule| !rule.is_residency() && rule.applies_to(proposition, at))
            .collect();

        let mut pending: FuturesUnordered<_> = matched
            .iter()
            .filter_map(|rule| {
                let RuleBody::Constraint { predicate } = &rule.body else {
                    return None;
                };
                let runner = Arc::clone(&self.runner);
                let deadline = self.config.rule_deadline;
                Some(async move {
                    let disposition = match timeout(deadline, runner.run(predicate, proposition))
                        .await
                    {
                        Ok(Ok(true)) => RuleDisposition::Fired,
                        Ok(Ok(false)) => RuleDisposition::Passed,
                        Ok(Err(reason)) => {
                            tracing::warn!(rule = %rule.id, %reason, "predicate evaluation failed");
                            RuleDisposition::Errored { reason }
                        }
                        Err(_) => {
                            tracing::warn!(rule = %rule.id, "predicate deadline expired");
                            RuleDisposition::TimedOut
                        }
                    };
                    RuleFinding {
                        rule_id: rule.id.clone(),
                        severity: rule.severity,
                        disposition,
                    }
                })
            })
            .collect();

        let mut findings = Vec::with_capacity(matched.len());
        let cutoff = self.config.overall_deadline.map(|d| Instant::now() + d);

        while !pending.is_empty() {
            let item = match cutoff {
                Some(deadline) => {
                    tokio::select! {
                        biased;
                        item = pending.next() => item,
                        _ = tokio::time::sleep_until(deadline) => break,
                    }
                }
                None => pending.next().await,
            };
            match item {
                Some(finding) => findings.push(finding),
                None => break,
            }
        }

        // Rules still in flight at the overall deadline are abandoned, not
        // claimed one way or the other.
        if findings.len() < matched.len() {
            let done: BTreeSet<RuleId> = findings.iter().map(|f| f.rule_id.clone()).collect();
            for rule in &matched {
                if !done.contains(&rule.id) {
                    findings.push(RuleFinding {
                        rule_id: rule.id.clone(),
                        severity: rule.severity,
                        disposition: RuleDisposition::Unevaluated,
                    });
                }
            }
        }

        EvaluationResult { findings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use palisade_rules::{CategoryScope, JurisdictionScope, RuleRegistry, RuleSetDocument};
    use palisade_types::{ActionCategory, ActorId, AttrValue, Jurisdiction};
    use std::collections::BTreeMap;

    /// Never completes; exercises the deadline paths deterministically under
    /// paused time.
    struct StallRunner;

    #[async_trait]
    impl PredicateRunner for StallRunner {
        async fn run(&self, _: &Predicate, _: &Proposition) -> Result<bool, String> {
            futures::future::pending().await
        }
    }

    fn constraint_rule(id: &str, severity: Severity, predicate: Predicate) -> Rule {
        Rule {
            id: RuleId::new(id),
            description: "test constraint".to_string(),
            jurisdictions: JurisdictionScope::Any,
            categories: CategoryScope::Any,
            severity,
            effective_from: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            effective_until: None,
            body: RuleBody::Constraint { predicate },
        }
    }

    fn proposition() -> Proposition {
        Proposition {
            category: ActionCategory::new("data_transfer"),
            actor: ActorId::new("svc"),
            actor_jurisdiction: Jurisdiction::new("US"),
            data_jurisdiction: Jurisdiction::new("US"),
            classifications: BTreeSet::new(),
            attributes: BTreeMap::from([("encrypted".to_string(), AttrValue::from(false))]),
        }
    }

    fn ruleset(rules: Vec<Rule>) -> std::sync::Arc<RuleSet> {
        RuleRegistry::new()
            .load(RuleSetDocument { rules })
            .unwrap()
    }

    fn fires() -> Predicate {
        Predicate::Equals {
            attribute: "encrypted".to_string(),
            value: AttrValue::from(false),
        }
    }

    fn passes() -> Predicate {
        Predicate::Equals {
            attribute: "encrypted".to_string(),
            value: AttrValue::from(true),
        }
    }

    #[tokio::test]
    async fn blocking_rule_that_fires_is_a_violation() {
        let evaluator = ConstraintEvaluator::new(EvaluatorConfig::default());
        let set = ruleset(vec![
            constraint_rule("fires", Severity::Blocking, fires()),
            constraint_rule("passes", Severity::Blocking, passes()),
        ]);

        let result = evaluator.evaluate(&proposition(), &set, Utc::now()).await;
        assert_eq!(result.findings.len(), 2);

        let violations: Vec<_> = result.violations().collect();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_id.0, "fires");
    }

    #[tokio::test]
    async fn advisory_rules_warn_but_never_violate() {
        let evaluator = ConstraintEvaluator::new(EvaluatorConfig::default());
        let set = ruleset(vec![constraint_rule("adv", Severity::Advisory, fires())]);

        let result = evaluator.evaluate(&proposition(), &set, Utc::now()).await;
        assert_eq!(result.violations().count(), 0);
        assert_eq!(result.warnings(), vec![RuleId::new("adv")]);
    }

    #[tokio::test]
    async fn predicate_errors_fail_closed() {
        let evaluator = ConstraintEvaluator::new(EvaluatorConfig::default());
        let missing = Predicate::Equals {
            attribute: "not-present".to_string(),
            value: AttrValue::from(true),
        };
        let set = ruleset(vec![constraint_rule("errs", Severity::Blocking, missing)]);

        let result = evaluator.evaluate(&proposition(), &set, Utc::now()).await;
        assert_eq!(result.violations().count(), 1);
        assert!(matches!(
            result.findings[0].disposition,
            RuleDisposition::Errored { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn rule_deadline_expiry_is_reported_as_timed_out() {
        let evaluator = ConstraintEvaluator::with_runner(
            EvaluatorConfig {
                rule_deadline: Duration::from_millis(50),
                overall_deadline: None,
            },
            Arc::new(StallRunner),
        );
        let set = ruleset(vec![constraint_rule("stalls", Severity::Blocking, fires())]);

        let result = evaluator.evaluate(&proposition(), &set, Utc::now()).await;
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].disposition, RuleDisposition::TimedOut);
        assert_eq!(result.violations().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overall_deadline_leaves_rules_unevaluated() {
        let evaluator = ConstraintEvaluator::with_runner(
            EvaluatorConfig {
                rule_deadline: Duration::from_secs(60),
                overall_deadline: Some(Duration::from_millis(100)),
            },
            Arc::new(StallRunner),
        );
        let set = ruleset(vec![constraint_rule(
            "unfinished",
            Severity::Blocking,
            fires(),
        )]);

        let result = evaluator.evaluate(&proposition(), &set, Utc::now()).await;
        assert_eq!(result.findings.len(), 1);
        assert_eq!(
            result.findings[0].disposition,
            RuleDisposition::Unevaluated
        );
        assert_eq!(result.violations().count(), 0);
        assert!(result.has_unevaluated_blocking());
    }

    #[tokio::test]
    async fn residency_rules_are_not_evaluated_here() {
        let evaluator = ConstraintEvaluator::new(EvaluatorConfig::default());
        let residency = Rule {
            id: RuleId::new("residency"),
            description: "residency".to_string(),
            jurisdictions: JurisdictionScope::Any,
            categories: CategoryScope::Any,
            severity: Severity::Blocking,
            effective_from: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            effective_until: None,
            body: RuleBody::Residency {
                allowed: BTreeSet::from([Jurisdiction::new("US")]),
            },
        };
        let set = ruleset(vec![residency]);

        let result = evaluator.evaluate(&proposition(), &set, Utc::now()).await;
        assert!(result.findings.is_empty());
    }
}
