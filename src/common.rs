// Shared identifier types used across the lock manager.
//
// Transaction and row identifiers are both unsigned 32-bit integers drawn
// from the same id space rules: `0` is reserved and never a valid id.

/// Identifies a transaction registered with the lock manager.
pub type TransactionId = u32;

/// Identifies a row (the unit of locking).
pub type RowId = u32;

/// `0` is reserved: it marks an empty transaction-table slot and must never
/// be accepted as a transaction or row id from a client.
pub const RESERVED_ID: u32 = 0;

/// Returns true if `id` is usable as a transaction or row identifier.
#[inline]
pub fn is_valid_id(id: u32) -> bool {
    id != RESERVED_ID
}
