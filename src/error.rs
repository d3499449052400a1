use thiserror::Error;

use crate::common::{RowId, TransactionId};

/// Error kinds surfaced by the lock manager core.
///
/// Every client-visible lock/unlock failure collapses to `Cancelled` at the
/// RPC boundary (see [`crate::rpc`]); these variants are the internal detail
/// carried alongside for logging and for `verify`'s direct callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("transaction {0} is not registered")]
    NotRegistered(TransactionId),

    #[error("transaction {0} is already registered")]
    AlreadyRegistered(TransactionId),

    #[error("id 0 is reserved and not a valid transaction or row id")]
    InvalidId,

    #[error("transaction {0} is in the shrinking phase and may not acquire new locks")]
    PhaseViolation(TransactionId),

    #[error("transaction {0} has exhausted its lock budget")]
    BudgetExhausted(TransactionId),

    #[error("row {row} is held in a mode incompatible with transaction {txn}'s request")]
    LockConflict { txn: TransactionId, row: RowId },

    #[error("transaction {txn} already holds row {row} in the requested mode")]
    DuplicateGrant { txn: TransactionId, row: RowId },

    #[error("integrity digest mismatch on bucket {bucket} of {table}")]
    IntegrityViolation { table: &'static str, bucket: usize },

    #[error("signing key material is missing or corrupt: {0}")]
    KeyMaterialError(String),

    #[error("signature does not verify against the current public key")]
    SignatureInvalid,
}

pub type Result<T> = std::result::Result<T, LockError>;

impl LockError {
    /// Whether this failure aborts the owning transaction per the 2PL state
    /// machine (section 4.H). `NotRegistered`/`AlreadyRegistered`/`InvalidId`
    /// are rejected before any transaction record is touched.
    pub fn aborts_transaction(&self) -> bool {
        matches!(
            self,
            LockError::PhaseViolation(_)
                | LockError::BudgetExhausted(_)
                | LockError::LockConflict { .. }
                | LockError::DuplicateGrant { .. }
        )
    }
}
