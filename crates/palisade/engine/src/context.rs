//! Normalization of raw proposed actions into propositions.
//!
//! Pure and deterministic: no I/O, no clock, no side effects. The same raw
//! action always builds the same proposition.

use palisade_types::{
    ActionCategory, ActorId, AttrValue, Jurisdiction, Proposition,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// A proposed action as submitted by a caller, before normalization.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub actor_jurisdiction: Option<String>,
    /// Jurisdiction the affected data is bound to. Defaults to the actor's
    /// jurisdiction when absent (data co-located with the actor).
    #[serde(default)]
    pub data_jurisdiction: Option<String>,
    #[serde(default)]
    pub classifications: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
}

/// Client-input problem. Rejected before evaluation; never reaches the
/// ledger.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MalformedActionError {
    #[error("required field '{0}' is missing")]
    MissingField(&'static str),

    #[error("required field '{0}' is empty")]
    EmptyField(&'static str),
}

pub struct ContextBuilder;

impl ContextBuilder {
    /// Build a proposition from a raw action.
    ///
    /// Unknown attributes are preserved verbatim so rules can reference
    /// fields this builder does not itself understand.
    pub fn build(raw: RawAction) -> Result<Proposition, MalformedActionError> {
        let category = required(raw.category, "category")?;
        let actor = required(raw.actor, "actor")?;
        let actor_jurisdiction = required(raw.actor_jurisdiction, "actor_jurisdiction")?;

        let data_jurisdiction = match raw.data_jurisdiction {
            Some(j) if j.trim().is_empty() => {
                return Err(MalformedActionError::EmptyField("data_jurisdiction"))
            }
            Some(j) => j.trim().to_string(),
            None => actor_jurisdiction.clone(),
        };

        Ok(Proposition {
            category: ActionCategory::new(category),
            actor: ActorId::new(actor),
            actor_jurisdiction: Jurisdiction::new(actor_jurisdiction),
            data_jurisdiction: Jurisdiction::new(data_jurisdiction),
            classifications: raw.classifications.into_iter().collect::<BTreeSet<_>>(),
            attributes: raw.attributes,
        })
    }
}

fn required(
    field: Option<String>,
    name: &'static str,
) -> Result<String, MalformedActionError> {
    let value = field.ok_or(MalformedActionError::MissingField(name))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MalformedActionError::EmptyField(name));
    }
    Ok(trimmed.to_string())
}
