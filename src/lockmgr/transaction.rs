use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::common::{RowId, TransactionId};
use crate::error::LockError;
use crate::lockmgr::types::Phase;

/// Per-transaction budget, held-row set, 2PL phase, and aborted flag.
///
/// The transaction record never stores a strong reference to any [`Lock`]
/// (see [`crate::lockmgr::record::Lock`]) — only row ids, looked up through
/// the lock table when needed. This keeps the transaction/lock relation a
/// logical association rather than an ownership cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub budget: u32,
    pub phase: Phase,
    pub aborted: bool,
    pub held: BTreeSet<RowId>,
}

impl Transaction {
    pub fn new(id: TransactionId, budget: u32) -> Self {
        Self {
            id,
            budget,
            phase: Phase::Growing,
            aborted: false,
            held: BTreeSet::new(),
        }
    }

    pub fn has_lock(&self, rid: RowId) -> bool {
        self.held.contains(&rid)
    }

    /// Records a successful grant of `rid`. Fails without mutating state if
    /// the transaction is aborted, shrinking, or out of budget.
    pub fn add_lock(&mut self, rid: RowId) -> Result<(), LockError> {
        if self.aborted {
            return Err(LockError::NotRegistered(self.id));
        }
        if matches!(self.phase, Phase::Shrinking) {
            return Err(LockError::PhaseViolation(self.id));
        }
        if self.budget == 0 {
            return Err(LockError::BudgetExhausted(self.id));
        }
        self.budget -= 1;
        self.held.insert(rid);
        Ok(())
    }

    /// Marks `rid` as released. No-op if not held. Transitions the
    /// transaction to `Shrinking` on its *first* release, per 2PL.
    ///
    /// The caller (the owning worker) is still responsible for releasing
    /// the row's [`Lock`] record and, if it becomes unowned, removing it
    /// from the lock table — this method only updates the transaction's
    /// own bookkeeping.
    pub fn release_lock(&mut self, rid: RowId) -> bool {
        if !self.held.remove(&rid) {
            return false;
        }
        self.phase = Phase::Shrinking;
        true
    }

    /// Drains every held row (for abort), returning them so the caller can
    /// release each one against the lock table, and marks the transaction
    /// aborted.
    pub fn take_all_for_abort(&mut self) -> Vec<RowId> {
        self.aborted = true;
        self.held.drain().collect()
    }

    pub fn is_empty_and_abortable(&self) -> bool {
        self.held.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_lock_decrements_budget() {
        let mut t = Transaction::new(1, 2);
        t.add_lock(10).unwrap();
        assert_eq!(t.budget, 1);
        assert!(t.has_lock(10));
    }

    #[test]
    fn add_lock_fails_when_budget_exhausted() {
        let mut t = Transaction::new(1, 0);
        assert_eq!(t.add_lock(10), Err(LockError::BudgetExhausted(1)));
    }

    #[test]
    fn first_release_enters_shrinking() {
        let mut t = Transaction::new(1, 5);
        t.add_lock(10).unwrap();
        assert!(t.release_lock(10));
        assert!(matches!(t.phase, Phase::Shrinking));
    }

    #[test]
    fn add_lock_rejected_once_shrinking() {
        let mut t = Transaction::new(1, 5);
        t.add_lock(10).unwrap();
        t.release_lock(10);
        assert_eq!(t.add_lock(11), Err(LockError::PhaseViolation(1)));
    }

    #[test]
    fn release_unheld_row_is_noop() {
        let mut t = Transaction::new(1, 5);
        assert!(!t.release_lock(42));
        assert!(matches!(t.phase, Phase::Growing));
    }
}
