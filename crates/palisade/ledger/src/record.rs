//! Hash-linked ledger records.
//!
//! The chain hash covers `(seq, decision, prev_hash)` under a domain-
//! separated blake3; the signature covers the same bytes. Mutating any field
//! of record *k* therefore invalidates record *k* itself or the link from
//! *k+1*.

use palisade_types::Decision;
use serde::{Deserialize, Serialize};

const RECORD_DOMAIN: &[u8] = b"palisade-ledger-record-v1:";
const GENESIS_DOMAIN: &[u8] = b"palisade-ledger-genesis-v1";

/// The fixed constant record 0 links back to.
pub fn genesis_hash() -> [u8; 32] {
    *blake3::hash(GENESIS_DOMAIN).as_bytes()
}

/// One sealed entry in the audit ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub seq: u64,
    pub decision: Decision,
    pub prev_hash: [u8; 32],
    pub record_hash: [u8; 32],
    pub signature: Vec<u8>,
}

/// The canonical bytes both the chain hash and the signature cover.
#[derive(Serialize)]
struct SignedPayload<'a> {
    seq: u64,
    decision: &'a Decision,
    prev_hash: &'a [u8; 32],
}

pub fn signing_bytes(
    seq: u64,
    decision: &Decision,
    prev_hash: &[u8; 32],
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&SignedPayload {
        seq,
        decision,
        prev_hash,
    })
}

pub fn chain_hash(signing_bytes: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(RECORD_DOMAIN);
    hasher.update(signing_bytes);
    *hasher.finalize().as_bytes()
}

impl LedgerRecord {
    /// Recompute this record's chain hash from its own fields.
    pub fn recompute_hash(&self) -> Result<[u8; 32], serde_json::Error> {
        let bytes = signing_bytes(self.seq, &self.decision, &self.prev_hash)?;
        Ok(chain_hash(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use palisade_types::{
        ActionCategory, ActorId, CorrelationId, Jurisdiction, Proposition, Verdict,
    };
    use std::collections::{BTreeMap, BTreeSet};

    fn decision() -> Decision {
        Decision {
            correlation_id: CorrelationId::new("req-1"),
            proposition: Proposition {
                category: ActionCategory::new("data_transfer"),
                actor: ActorId::new("svc"),
                actor_jurisdiction: Jurisdiction::new("US"),
                data_jurisdiction: Jurisdiction::new("US"),
                classifications: BTreeSet::new(),
                attributes: BTreeMap::new(),
            },
            verdict: Verdict::Permit,
            findings: vec![],
            warnings: vec![],
            ruleset_version: 1,
            eval_latency_us: 10,
            decided_at: Utc::now(),
        }
    }

    #[test]
    fn genesis_hash_is_stable() {
        assert_eq!(genesis_hash(), genesis_hash());
        assert_ne!(genesis_hash(), [0u8; 32]);
    }

    #[test]
    fn chain_hash_changes_with_every_covered_field() {
        let d = decision();
        let base = chain_hash(&signing_bytes(0, &d, &genesis_hash()).unwrap());

        let other_seq = chain_hash(&signing_bytes(1, &d, &genesis_hash()).unwrap());
        assert_ne!(base, other_seq);

        let mut altered = d.clone();
        altered.verdict = Verdict::Block;
        let other_decision = chain_hash(&signing_bytes(0, &altered, &genesis_hash()).unwrap());
        assert_ne!(base, other_decision);

        let other_prev = chain_hash(&signing_bytes(0, &d, &[9u8; 32]).unwrap());
        assert_ne!(base, other_prev);
    }
}
