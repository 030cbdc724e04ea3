use crate::store::StoreError;
use thiserror::Error;

/// Errors returned by the audit ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The underlying store did not durably accept the record. The sequence
    /// number was not advanced; retry the whole decision submission.
    #[error("ledger write did not complete durably: {0}")]
    Write(StoreError),

    #[error("ledger read failed: {0}")]
    Read(StoreError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid range: from {from} is greater than to {to} (ledger length {len})")]
    InvalidRange { from: u64, to: u64, len: u64 },

    #[error("replay found an inconsistent record at seq {seq}: {reason}")]
    Replay { seq: u64, reason: String },

    #[error("ledger writer is closed")]
    Closed,
}
