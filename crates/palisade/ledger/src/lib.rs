//! Palisade Ledger - the append-only, tamper-evident record of decisions.
//!
//! One writer task owns sequence assignment: submissions are serialized by a
//! queue, so sequence numbers are exactly arrival order, gapless, and never
//! reused for a different decision. A record is acknowledged only after the
//! injected store reports it durable; readers only ever observe that durable
//! prefix.

#![deny(unsafe_code)]

pub mod error;
pub mod record;
pub mod signer;
pub mod store;

pub use error::LedgerError;
pub use record::{chain_hash, genesis_hash, signing_bytes, LedgerRecord};
pub use signer::{Ed25519Signer, Signer};
pub use store::{FileRecordStore, InMemoryRecordStore, RecordStore, StoreError};

use palisade_types::Decision;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};

const APPEND_QUEUE_DEPTH: usize = 64;

/// Result of a chain verification over a range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationResult {
    Intact,
    /// First sequence number at which the chain fails to verify.
    BrokenAt(u64),
}

enum Command {
    Append {
        decision: Decision,
        reply: oneshot::Sender<Result<LedgerRecord, LedgerError>>,
    },
}

/// Handle to one ledger instance. Cheap to clone; all clones feed the same
/// writer.
#[derive(Clone)]
pub struct AuditLedger {
    tx: mpsc::Sender<Command>,
    records: Arc<RwLock<Vec<LedgerRecord>>>,
    signer: Arc<dyn Signer>,
}

impl AuditLedger {
    /// Replay the store and start the writer task. Requires a tokio runtime.
    pub fn open(
        signer: Arc<dyn Signer>,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, LedgerError> {
        let existing = replay(store.as_ref())?;
        if !existing.is_empty() {
            tracing::info!(records = existing.len(), "ledger replayed from store");
        }
        let records = Arc::new(RwLock::new(existing));

        let (tx, rx) = mpsc::channel(APPEND_QUEUE_DEPTH);
        let writer = Writer {
            store,
            signer: Arc::clone(&signer),
            records: Arc::clone(&records),
        };
        tokio::spawn(writer.run(rx));

        Ok(Self {
            tx,
            records,
            signer,
        })
    }

    /// Append a decision as the next record.
    ///
    /// Does not return until the record is durable; on failure the sequence
    /// number is not consumed and the caller must resubmit the decision.
    pub async fn append(&self, decision: Decision) -> Result<LedgerRecord, LedgerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Append { decision, reply })
            .await
            .map_err(|_| LedgerError::Closed)?;
        rx.await.map_err(|_| LedgerError::Closed)?
    }

    /// Number of durable records.
    pub fn len(&self) -> u64 {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recompute the hash chain and signatures over `[from, to)`.
    ///
    /// Read-only: a broken chain never blocks new appends, it only reports
    /// where the first discontinuity sits.
    pub fn verify(&self, from: u64, to: u64) -> Result<VerificationResult, LedgerError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let len = records.len() as u64;
        if from > to || to > len {
            return Err(LedgerError::InvalidRange { from, to, len });
        }

        for seq in from..to {
            let record = &records[seq as usize];
            if record.seq != seq {
                return Ok(VerificationResult::BrokenAt(seq));
            }

            let expected_prev = if seq == 0 {
                genesis_hash()
            } else {
                records[seq as usize - 1].record_hash
            };
            if record.prev_hash != expected_prev {
                return Ok(VerificationResult::BrokenAt(seq));
            }

            let bytes = signing_bytes(record.seq, &record.decision, &record.prev_hash)
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;
            if chain_hash(&bytes) != record.record_hash {
                return Ok(VerificationResult::BrokenAt(seq));
            }
            if !self.signer.verify(&bytes, &record.signature) {
                return Ok(VerificationResult::BrokenAt(seq));
            }
        }

        Ok(VerificationResult::Intact)
    }

    /// The ordered records in `[from, to)` for external audit tooling. Each
    /// record is self-describing and verifiable on its own.
    pub fn export(&self, from: u64, to: u64) -> Result<Vec<LedgerRecord>, LedgerError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let len = records.len() as u64;
        if from > to || to > len {
            return Err(LedgerError::InvalidRange { from, to, len });
        }
        Ok(records[from as usize..to as usize].to_vec())
    }

    #[cfg(test)]
    fn corrupt<F: FnOnce(&mut LedgerRecord)>(&self, seq: u64, mutate: F) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        mutate(&mut records[seq as usize]);
    }
}

struct Writer {
    store: Arc<dyn RecordStore>,
    signer: Arc<dyn Signer>,
    records: Arc<RwLock<Vec<LedgerRecord>>>,
}

impl Writer {
    async fn run(self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Append { decision, reply } => {
                    let result = self.append_one(decision);
                    if let Err(err) = &result {
                        tracing::error!(%err, "ledger append failed");
                    }
                    // A dropped reply means the caller went away; the record
                    // is durable either way.
                    let _ = reply.send(result);
                }
            }
        }
    }

    fn append_one(&self, decision: Decision) -> Result<LedgerRecord, LedgerError> {
        let (seq, prev_hash) = {
            let records = self.records.read().unwrap_or_else(|e| e.into_inner());
            match records.last() {
                Some(last) => (last.seq + 1, last.record_hash),
                None => (0, genesis_hash()),
            }
        };

        let bytes = signing_bytes(seq, &decision, &prev_hash)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let record = LedgerRecord {
            seq,
            decision,
            prev_hash,
            record_hash: chain_hash(&bytes),
            signature: self.signer.sign(&bytes),
        };

        let encoded =
            serde_json::to_vec(&record).map_err(|e| LedgerError::Serialization(e.to_string()))?;

        // Durability gate: the record becomes visible only after the store
        // accepts it. On failure seq is derived again from the unchanged
        // prefix, so the same number is retried next.
        self.store.append(&encoded).map_err(LedgerError::Write)?;

        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.push(record.clone());
        Ok(record)
    }
}

fn replay(store: &dyn RecordStore) -> Result<Vec<LedgerRecord>, LedgerError> {
    let count = store.frame_count().map_err(LedgerError::Read)?;
    let mut records = Vec::with_capacity(count as usize);

    for seq in 0..count {
        let bytes = store.read(seq).map_err(LedgerError::Read)?;
        let record: LedgerRecord =
            serde_json::from_slice(&bytes).map_err(|e| LedgerError::Replay {
                seq,
                reason: e.to_string(),
            })?;
        if record.seq != seq {
            return Err(LedgerError::Replay {
                seq,
                reason: format!("frame {} holds record seq {}", seq, record.seq),
            });
        }
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use palisade_types::{
        ActionCategory, ActorId, CorrelationId, Jurisdiction, Proposition, Verdict,
    };
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn decision(tag: &str) -> Decision {
        Decision {
            correlation_id: CorrelationId::new(tag),
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

    fn ledger() -> AuditLedger {
        AuditLedger::open(
            Arc::new(Ed25519Signer::from_bytes([3u8; 32])),
            Arc::new(InMemoryRecordStore::new()),
        )
        .unwrap()
    }

    /// Store that fails while the flag is set. Simulates a durability outage.
    struct FailingStore {
        inner: InMemoryRecordStore,
        failing: AtomicBool,
    }

    impl FailingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryRecordStore::new(),
                failing: AtomicBool::new(false),
            }
        }
    }

    impl RecordStore for FailingStore {
        fn append(&self, bytes: &[u8]) -> Result<u64, StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Io(std::io::Error::other("disk unavailable")));
            }
            self.inner.append(bytes)
        }

        fn read(&self, offset: u64) -> Result<Vec<u8>, StoreError> {
            self.inner.read(offset)
        }

        fn frame_count(&self) -> Result<u64, StoreError> {
            self.inner.frame_count()
        }
    }

    #[tokio::test]
    async fn first_record_links_to_genesis() {
        let ledger = ledger();
        let record = ledger.append(decision("req-0")).await.unwrap();
        assert_eq!(record.seq, 0);
        assert_eq!(record.prev_hash, genesis_hash());

        let next = ledger.append(decision("req-1")).await.unwrap();
        assert_eq!(next.seq, 1);
        assert_eq!(next.prev_hash, record.record_hash);
    }

    #[tokio::test]
    async fn untouched_ledger_verifies_intact() {
        let ledger = ledger();
        for i in 0..5 {
            ledger.append(decision(&format!("req-{i}"))).await.unwrap();
        }
        assert_eq!(ledger.verify(0, 5).unwrap(), VerificationResult::Intact);
        assert_eq!(ledger.verify(2, 4).unwrap(), VerificationResult::Intact);
    }

    #[tokio::test]
    async fn invalid_ranges_are_rejected() {
        let ledger = ledger();
        ledger.append(decision("req-0")).await.unwrap();

        assert!(matches!(
            ledger.verify(2, 1),
            Err(LedgerError::InvalidRange { .. })
        ));
        assert!(matches!(
            ledger.export(0, 5),
            Err(LedgerError::InvalidRange { .. })
        ));
    }

    #[tokio::test]
    async fn export_returns_the_ordered_segment() {
        let ledger = ledger();
        for i in 0..4 {
            ledger.append(decision(&format!("req-{i}"))).await.unwrap();
        }

        let segment = ledger.export(1, 3).unwrap();
        assert_eq!(segment.len(), 2);
        assert_eq!(segment[0].seq, 1);
        assert_eq!(segment[1].seq, 2);
        // Each exported record carries its own chain context.
        assert_eq!(segment[1].prev_hash, segment[0].record_hash);
    }

    #[tokio::test]
    async fn failed_write_does_not_consume_the_sequence_number() {
        let store = Arc::new(FailingStore::new());
        let ledger = AuditLedger::open(
            Arc::new(Ed25519Signer::from_bytes([3u8; 32])),
            Arc::clone(&store) as Arc<dyn RecordStore>,
        )
        .unwrap();

        ledger.append(decision("req-0")).await.unwrap();

        store.failing.store(true, Ordering::SeqCst);
        let err = ledger.append(decision("req-1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Write(_)));
        assert_eq!(ledger.len(), 1);

        store.failing.store(false, Ordering::SeqCst);
        let retried = ledger.append(decision("req-1")).await.unwrap();
        assert_eq!(retried.seq, 1);
        assert_eq!(ledger.verify(0, 2).unwrap(), VerificationResult::Intact);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_appends_assign_gapless_sequences() {
        let ledger = ledger();
        let mut tasks = Vec::new();

        for caller in 0..4 {
            let handle = ledger.clone();
            tasks.push(tokio::spawn(async move {
                let mut seqs = Vec::new();
                for i in 0..25 {
                    let record = handle
                        .append(decision(&format!("caller-{caller}-{i}")))
                        .await
                        .unwrap();
                    seqs.push(record.seq);
                }
                seqs
            }));
        }

        let mut all = Vec::new();
        for task in tasks {
            all.extend(task.await.unwrap());
        }

        all.sort_unstable();
        let expected: Vec<u64> = (0..100).collect();
        assert_eq!(all, expected);
        assert_eq!(ledger.verify(0, 100).unwrap(), VerificationResult::Intact);
    }

    #[tokio::test]
    async fn ledger_replays_from_a_persistent_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.bin");
        let signer = Arc::new(Ed25519Signer::from_bytes([3u8; 32]));

        {
            let store = Arc::new(FileRecordStore::open(&path).unwrap());
            let ledger = AuditLedger::open(signer.clone(), store).unwrap();
            for i in 0..3 {
                ledger.append(decision(&format!("req-{i}"))).await.unwrap();
            }
        }

        let store = Arc::new(FileRecordStore::open(&path).unwrap());
        let ledger = AuditLedger::open(signer, store).unwrap();
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.verify(0, 3).unwrap(), VerificationResult::Intact);

        // The chain continues where it left off.
        let record = ledger.append(decision("req-3")).await.unwrap();
        assert_eq!(record.seq, 3);
        assert_eq!(ledger.verify(0, 4).unwrap(), VerificationResult::Intact);
    }

    #[derive(Debug, Clone, Copy)]
    enum Tamper {
        Verdict,
        SeqBump,
        PrevHash,
        RecordHash,
        Signature,
    }

    fn tamper_strategy() -> impl Strategy<Value = Tamper> {
        prop_oneof![
            Just(Tamper::Verdict),
            Just(Tamper::SeqBump),
            Just(Tamper::PrevHash),
            Just(Tamper::RecordHash),
            Just(Tamper::Signature),
        ]
    }

    proptest! {
        /// Mutating any field of record k is detected at k or later, never
        /// before k.
        #[test]
        fn property_tampering_is_detected_at_or_after_the_mutation(
            k in 0u64..8,
            tamper in tamper_strategy(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");

            rt.block_on(async move {
                let ledger = ledger();
                for i in 0..8 {
                    ledger.append(decision(&format!("req-{i}"))).await.unwrap();
                }

                ledger.corrupt(k, |record| match tamper {
                    Tamper::Verdict => record.decision.verdict = Verdict::Block,
                    Tamper::SeqBump => record.seq += 1,
                    Tamper::PrevHash => record.prev_hash[0] ^= 0xff,
                    Tamper::RecordHash => record.record_hash[0] ^= 0xff,
                    Tamper::Signature => {
                        if let Some(byte) = record.signature.first_mut() {
                            *byte ^= 0xff;
                        }
                    }
                });

                match ledger.verify(0, 8).unwrap() {
                    VerificationResult::BrokenAt(seq) => assert!(seq >= k),
                    VerificationResult::Intact => panic!("tampering went undetected"),
                }
            });
        }
    }
}
