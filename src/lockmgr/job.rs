use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::common::{RowId, TransactionId};
use crate::error::LockError;

/// The unit of work handed from the dispatcher to a worker's queue.
#[derive(Debug)]
pub enum JobKind {
    Register { budget: u32 },
    Shared,
    Exclusive,
    Unlock,
    Quit,
}

/// Outcome of a completed job, delivered through its [`Completion`].
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub error: Option<LockError>,
    pub signature: Option<String>,
}

impl JobOutcome {
    pub fn ok() -> Self {
        Self { error: None, signature: None }
    }

    pub fn signed(signature: String) -> Self {
        Self { error: None, signature: Some(signature) }
    }

    pub fn failed(error: LockError) -> Self {
        Self { error: Some(error), signature: None }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A one-shot latch a caller can block on until its job finishes.
///
/// The original design busy-waits on a `done` flag; section 9 explicitly
/// allows substituting a condition variable instead, which is what this
/// does — the externally observable semantics (the call returns only once
/// the job has actually been processed) are unchanged.
#[derive(Default)]
pub struct Completion {
    slot: Mutex<Option<JobOutcome>>,
    condvar: Condvar,
}

impl Completion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fulfill(&self, outcome: JobOutcome) {
        let mut slot = self.slot.lock();
        *slot = Some(outcome);
        self.condvar.notify_all();
    }

    pub fn wait(&self) -> JobOutcome {
        let mut slot = self.slot.lock();
        while slot.is_none() {
            self.condvar.wait(&mut slot);
        }
        slot.take().expect("condvar woke with no outcome present")
    }
}

/// A tagged message describing one unit of work for a worker.
pub struct Job {
    pub kind: JobKind,
    pub transaction_id: TransactionId,
    /// Unused for `Register`/`Quit`.
    pub row_id: RowId,
    pub wait_for_result: bool,
    pub completion: Option<Arc<Completion>>,
}

impl Job {
    pub fn quit() -> Self {
        Self {
            kind: JobKind::Quit,
            transaction_id: 0,
            row_id: 0,
            wait_for_result: false,
            completion: None,
        }
    }

    /// Fails this job immediately without ever reaching a worker queue —
    /// used by the dispatcher's pre-flight `NotRegistered` check.
    pub fn fail_fast(&self, error: LockError) {
        if let Some(completion) = &self.completion {
            completion.fulfill(JobOutcome::failed(error));
        }
    }
}
