//! Palisade Rules - rule model, immutable versioned rule sets, and the
//! registry that publishes them.
//!
//! Rules are plain data. A published [`RuleSet`] is never mutated; reloading
//! produces a new snapshot and swaps an `Arc`, so in-flight evaluations keep
//! the snapshot they started with.

#![deny(unsafe_code)]

pub mod predicate;
pub mod registry;

pub use predicate::{JurisdictionField, Predicate, PredicateError};
pub use registry::{RuleRegistry, RuleSetChanged, RuleValidationError};

use chrono::{DateTime, Utc};
use palisade_types::{ActionCategory, Jurisdiction, Proposition, RuleId, Severity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which jurisdictions a rule is scoped to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JurisdictionScope {
    /// Applies everywhere.
    Any,
    /// Applies only to the listed region codes. Must be non-empty.
    Only(BTreeSet<Jurisdiction>),
}

impl JurisdictionScope {
    pub fn covers(&self, jurisdiction: &Jurisdiction) -> bool {
        match self {
            JurisdictionScope::Any => true,
            JurisdictionScope::Only(set) => set.contains(jurisdiction),
        }
    }
}

/// Which action categories a rule applies to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryScope {
    Any,
    Only(BTreeSet<ActionCategory>),
}

impl CategoryScope {
    pub fn covers(&self, category: &ActionCategory) -> bool {
        match self {
            CategoryScope::Any => true,
            CategoryScope::Only(set) => set.contains(category),
        }
    }
}

/// The substance of a rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleBody {
    /// Residency constraint: data covered by this rule may only be processed
    /// in the listed jurisdictions. Checked by the geofence validator.
    Residency { allowed: BTreeSet<Jurisdiction> },
    /// General constraint over the proposition's attributes. Checked by the
    /// constraint evaluator.
    Constraint { predicate: Predicate },
}

/// One compliance rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub description: String,
    pub jurisdictions: JurisdictionScope,
    pub categories: CategoryScope,
    pub severity: Severity,
    pub effective_from: DateTime<Utc>,
    /// A blocking rule with no effective-until is permanent until superseded
    /// by a new version of the same identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_until: Option<DateTime<Utc>>,
    pub body: RuleBody,
}

impl Rule {
    pub fn in_effect(&self, at: DateTime<Utc>) -> bool {
        if at < self.effective_from {
            return false;
        }
        match self.effective_until {
            Some(until) => at < until,
            None => true,
        }
    }

    /// Whether this rule is in scope for a proposition.
    ///
    /// A rule matches when its category scope covers the action and its
    /// jurisdiction scope covers either side of the transfer; matching wide
    /// means more rules get evaluated, never fewer.
    pub fn applies_to(&self, proposition: &Proposition, at: DateTime<Utc>) -> bool {
        self.in_effect(at)
            && self.categories.covers(&proposition.category)
            && (self.jurisdictions.covers(&proposition.actor_jurisdiction)
                || self.jurisdictions.covers(&proposition.data_jurisdiction))
    }

    pub fn is_residency(&self) -> bool {
        matches!(self.body, RuleBody::Residency { .. })
    }
}

/// Administrative input to a rule load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleSetDocument {
    pub rules: Vec<Rule>,
}

/// An immutable, versioned snapshot of the active rules.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleSet {
    version: u64,
    content_hash: String,
    rules: BTreeMap<RuleId, Rule>,
    published_at: DateTime<Utc>,
}

impl RuleSet {
    /// The empty genesis snapshot every registry starts from.
    pub fn empty() -> Self {
        let rules = BTreeMap::new();
        Self {
            version: 0,
            content_hash: content_hash(&rules),
            rules,
            published_at: Utc::now(),
        }
    }

    pub(crate) fn from_validated(
        version: u64,
        rules: BTreeMap<RuleId, Rule>,
    ) -> Self {
        Self {
            version,
            content_hash: content_hash(&rules),
            rules,
            published_at: Utc::now(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &RuleId) -> Option<&Rule> {
        self.rules.get(id)
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }
}

/// Blake3 over the canonical JSON encoding of the rule map. BTreeMap keys
/// keep the encoding order-independent of load order.
fn content_hash(rules: &BTreeMap<RuleId, Rule>) -> String {
    let encoded = serde_json::to_vec(rules).unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"palisade-ruleset-v1:");
    hasher.update(&encoded);
    hasher.finalize().to_hex().to_string()
}
