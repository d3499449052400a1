use serde::{Deserialize, Serialize};
use std::fmt;

/// Lock mode requested or held. A two-valued tag, not a boolean, so a mode
/// can never be mis-stringified into something other than `S`/`X`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl LockMode {
    /// The single-character tag used in the signed attestation plaintext.
    pub fn as_char(&self) -> char {
        match self {
            LockMode::Shared => 'S',
            LockMode::Exclusive => 'X',
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Two-phase locking phase of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// May still acquire new locks.
    Growing,
    /// Has released at least one lock; may only release from here on.
    Shrinking,
}
