//! Rule predicates as a closed tagged set.
//!
//! Predicates are data, not callables, so the evaluator can reason about
//! totality: every kind terminates, and the only failure modes are a missing
//! attribute or a type mismatch, both of which are explicit errors.

use palisade_types::{AttrValue, Jurisdiction, Proposition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Which jurisdiction field of a proposition a membership check reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JurisdictionField {
    Actor,
    Data,
}

/// A predicate over a proposition's fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Attribute equals the given value.
    Equals { attribute: String, value: AttrValue },
    /// String attribute is one of the given values.
    MemberOf {
        attribute: String,
        values: BTreeSet<String>,
    },
    /// Numeric attribute lies in the inclusive range.
    InRange {
        attribute: String,
        min: f64,
        max: f64,
    },
    /// One of the proposition's jurisdiction fields is in the given set.
    JurisdictionIn {
        field: JurisdictionField,
        allowed: BTreeSet<Jurisdiction>,
    },
    /// All sub-predicates hold.
    All(Vec<Predicate>),
    /// At least one sub-predicate holds.
    Any(Vec<Predicate>),
}

/// Failure to evaluate a predicate against a proposition.
///
/// Never swallowed: a blocking rule whose predicate errors is treated as a
/// potential violation by the evaluator.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PredicateError {
    #[error("attribute '{0}' is not present on the proposition")]
    MissingAttribute(String),

    #[error("attribute '{attribute}' has the wrong type, expected {expected}")]
    TypeMismatch {
        attribute: String,
        expected: &'static str,
    },
}

impl Predicate {
    /// Evaluate against a proposition. Total over well-typed inputs.
    pub fn evaluate(&self, proposition: &Proposition) -> Result<bool, PredicateError> {
        match self {
            Predicate::Equals { attribute, value } => {
                let actual = lookup(proposition, attribute)?;
                Ok(actual == value)
            }
            Predicate::MemberOf { attribute, values } => {
                let actual = lookup(proposition, attribute)?;
                let text = actual.as_str().ok_or_else(|| PredicateError::TypeMismatch {
                    attribute: attribute.clone(),
                    expected: "string",
                })?;
                Ok(values.contains(text))
            }
            Predicate::InRange {
                attribute,
                min,
                max,
            } => {
                let actual = lookup(proposition, attribute)?;
                let number = actual
                    .as_number()
                    .ok_or_else(|| PredicateError::TypeMismatch {
                        attribute: attribute.clone(),
                        expected: "number",
                    })?;
                Ok(*min <= number && number <= *max)
            }
            Predicate::JurisdictionIn { field, allowed } => {
                let jurisdiction = match field {
                    JurisdictionField::Actor => &proposition.actor_jurisdiction,
                    JurisdictionField::Data => &proposition.data_jurisdiction,
                };
                Ok(allowed.contains(jurisdiction))
            }
            Predicate::All(parts) => {
                for part in parts {
                    if !part.evaluate(proposition)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Any(parts) => {
                for part in parts {
                    if part.evaluate(proposition)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Structural validation applied at rule-load time.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Predicate::Equals { attribute, .. } => {
                if attribute.is_empty() {
                    return Err("equals predicate names an empty attribute".to_string());
                }
                Ok(())
            }
            Predicate::MemberOf { attribute, values } => {
                if attribute.is_empty() {
                    return Err("member_of predicate names an empty attribute".to_string());
                }
                if values.is_empty() {
                    return Err("member_of predicate has an empty value set".to_string());
                }
                Ok(())
            }
            Predicate::InRange {
                attribute,
                min,
                max,
            } => {
                if attribute.is_empty() {
                    return Err("in_range predicate names an empty attribute".to_string());
                }
                if min.is_nan() || max.is_nan() {
                    return Err("in_range predicate has a NaN bound".to_string());
                }
                if min > max {
                    return Err(format!("in_range predicate has min {} > max {}", min, max));
                }
                Ok(())
            }
            Predicate::JurisdictionIn { allowed, .. } => {
                if allowed.is_empty() {
                    return Err("jurisdiction_in predicate has an empty set".to_string());
                }
                Ok(())
            }
            Predicate::All(parts) | Predicate::Any(parts) => {
                if parts.is_empty() {
                    return Err("composite predicate has no branches".to_string());
                }
                for part in parts {
                    part.validate()?;
                }
                Ok(())
            }
        }
    }
}

fn lookup<'p>(
    proposition: &'p Proposition,
    attribute: &str,
) -> Result<&'p AttrValue, PredicateError> {
    proposition
        .attributes
        .get(attribute)
        .ok_or_else(|| PredicateError::MissingAttribute(attribute.to_string()))
}
