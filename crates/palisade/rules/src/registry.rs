//! The rule registry: validates, versions, and atomically publishes rule
//! sets.
//!
//! Readers call [`RuleRegistry::current`] and get a complete snapshot behind
//! an `Arc`; a concurrent publish swaps the pointer and never touches a
//! snapshot already handed out.

use crate::{Rule, RuleBody, RuleSet, RuleSetDocument};
use palisade_types::RuleId;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Emitted on every successful publish. Consumed by logging paths only;
/// evaluation always pins the snapshot it started with.
#[derive(Clone, Debug)]
pub struct RuleSetChanged {
    pub version: u64,
    pub content_hash: String,
    pub rule_count: usize,
}

/// Rejection of an administrative rule load. The active rule set is left
/// untouched on any failure.
#[derive(Debug, Error)]
pub enum RuleValidationError {
    #[error("duplicate rule identifier '{0}' within one load")]
    DuplicateRule(RuleId),

    #[error("rule '{0}' has an empty jurisdiction scope")]
    EmptyJurisdictionScope(RuleId),

    #[error("rule '{0}' has an empty category scope")]
    EmptyCategoryScope(RuleId),

    #[error("rule '{0}' has an empty residency set")]
    EmptyResidencySet(RuleId),

    #[error("rule '{rule}' has a malformed predicate: {reason}")]
    MalformedPredicate { rule: RuleId, reason: String },

    #[error("rule '{0}' has effective-until earlier than effective-from")]
    InvalidEffectiveWindow(RuleId),
}

impl RuleValidationError {
    /// The identifier of the rule that failed validation.
    pub fn rule_id(&self) -> &RuleId {
        match self {
            RuleValidationError::DuplicateRule(id)
            | RuleValidationError::EmptyJurisdictionScope(id)
            | RuleValidationError::EmptyCategoryScope(id)
            | RuleValidationError::EmptyResidencySet(id)
            | RuleValidationError::InvalidEffectiveWindow(id) => id,
            RuleValidationError::MalformedPredicate { rule, .. } => rule,
        }
    }
}

pub struct RuleRegistry {
    current: RwLock<Arc<RuleSet>>,
    events: broadcast::Sender<RuleSetChanged>,
}

impl RuleRegistry {
    /// Create a registry holding the empty version-0 snapshot.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            current: RwLock::new(Arc::new(RuleSet::empty())),
            events,
        }
    }

    /// Validate a rule document and publish it as the next snapshot.
    ///
    /// Returns the published snapshot. On any validation failure the
    /// previously published snapshot stays active.
    pub fn load(&self, document: RuleSetDocument) -> Result<Arc<RuleSet>, RuleValidationError> {
        let rules = validate(document)?;

        let mut slot = self.current.write().unwrap_or_else(|e| e.into_inner());
        let next_version = slot.version() + 1;
        let snapshot = Arc::new(RuleSet::from_validated(next_version, rules));
        *slot = Arc::clone(&snapshot);
        drop(slot);

        self.announce(&snapshot);
        Ok(snapshot)
    }

    /// Swap in an already-built snapshot. In-flight evaluations holding the
    /// previous `Arc` are unaffected.
    pub fn publish(&self, snapshot: Arc<RuleSet>) {
        let mut slot = self.current.write().unwrap_or_else(|e| e.into_inner());
        *slot = Arc::clone(&snapshot);
        drop(slot);

        self.announce(&snapshot);
    }

    /// The latest published snapshot.
    pub fn current(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Subscribe to publish events.
    pub fn subscribe(&self) -> broadcast::Receiver<RuleSetChanged> {
        self.events.subscribe()
    }

    fn announce(&self, snapshot: &RuleSet) {
        tracing::debug!(
            version = snapshot.version(),
            rules = snapshot.len(),
            "rule set published"
        );
        // No subscribers is fine; the event stream is observational.
        let _ = self.events.send(RuleSetChanged {
            version: snapshot.version(),
            content_hash: snapshot.content_hash().to_string(),
            rule_count: snapshot.len(),
        });
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(document: RuleSetDocument) -> Result<BTreeMap<RuleId, Rule>, RuleValidationError> {
    let mut rules = BTreeMap::new();

    for rule in document.rules {
        if let crate::JurisdictionScope::Only(set) = &rule.jurisdictions {
            if set.is_empty() {
                return Err(RuleValidationError::EmptyJurisdictionScope(rule.id));
            }
        }

        if let crate::CategoryScope::Only(set) = &rule.categories {
            if set.is_empty() {
                return Err(RuleValidationError::EmptyCategoryScope(rule.id));
            }
        }

        if let Some(until) = rule.effective_until {
            if until < rule.effective_from {
                return Err(RuleValidationError::InvalidEffectiveWindow(rule.id));
            }
        }

        match &rule.body {
            RuleBody::Residency { allowed } => {
                if allowed.is_empty() {
                    return Err(RuleValidationError::EmptyResidencySet(rule.id));
                }
            }
            RuleBody::Constraint { predicate } => {
                if let Err(reason) = predicate.validate() {
                    return Err(RuleValidationError::MalformedPredicate {
                        rule: rule.id,
                        reason,
                    });
                }
            }
        }

        let id = rule.id.clone();
        if rules.insert(id.clone(), rule).is_some() {
            return Err(RuleValidationError::DuplicateRule(id));
        }
    }

    Ok(rules)
}
