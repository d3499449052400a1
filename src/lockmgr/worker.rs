use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::common::{RowId, TransactionId};
use crate::config::ManagerConfig;
use crate::error::LockError;
use crate::lockmgr::integrity::{canonical_lock_bucket, canonical_transaction_bucket, IntegrityShield};
use crate::lockmgr::job::{Job, JobKind, JobOutcome};
use crate::lockmgr::record::Lock;
use crate::lockmgr::signer::{KeyPair, Signer};
use crate::lockmgr::table::ShardedTable;
use crate::lockmgr::transaction::Transaction;
use crate::lockmgr::types::{LockMode, Phase};

/// Per-worker mutex-guarded FIFO queue, matching the teacher's
/// `wait_queue`/`wait_condvar` pattern rather than a lock-free structure:
/// the spec calls for a simple mutex-plus-condvar queue per worker, not a
/// high-throughput MPMC design.
pub struct WorkerQueue {
    queue: Mutex<VecDeque<Job>>,
    condvar: Condvar,
}

impl WorkerQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
        })
    }

    pub fn push(&self, job: Job) {
        let mut queue = self.queue.lock();
        queue.push_back(job);
        self.condvar.notify_one();
    }

    fn pop_blocking(&self) -> Job {
        let mut queue = self.queue.lock();
        while queue.is_empty() {
            self.condvar.wait(&mut queue);
        }
        queue.pop_front().expect("queue non-empty after wait")
    }
}

/// Shared state every worker needs a handle to. Shard-ownership discipline
/// (invariant I4) means a given lock-table bucket is only ever touched by
/// the worker whose range includes it; the transaction table may be read
/// and mutated by whichever worker is processing a job for that
/// transaction (see `acquire_lock`/`release_row`, grounded on the
/// source's `integrity_verified_get_transactiontable` call inside
/// `acquire_lock` itself), with `Register` still routed exclusively to the
/// dedicated transaction worker.
pub struct SharedTables {
    pub lock_table: Arc<ShardedTable<Lock>>,
    pub lock_shield: Arc<IntegrityShield>,
    pub transaction_table: Arc<ShardedTable<Transaction>>,
    pub transaction_shield: Arc<IntegrityShield>,
    pub owner_capacity: usize,
}

pub struct WorkerPool {
    queues: Vec<Arc<WorkerQueue>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn start(config: &ManagerConfig, tables: Arc<SharedTables>, keypair: Arc<KeyPair>) -> Self {
        let queues: Vec<Arc<WorkerQueue>> = (0..config.total_workers())
            .map(|_| WorkerQueue::new())
            .collect();

        let mut handles = Vec::with_capacity(queues.len());
        for worker_id in 0..config.total_workers() {
            let queue = Arc::clone(&queues[worker_id]);
            let tables = Arc::clone(&tables);
            let keypair = Arc::clone(&keypair);
            let is_transaction_worker = worker_id == config.transaction_worker();
            handles.push(
                std::thread::Builder::new()
                    .name(format!("lockvault-worker-{worker_id}"))
                    .spawn(move || run_worker(worker_id, queue, tables, keypair, is_transaction_worker))
                    .expect("failed to spawn worker thread"),
            );
        }

        Self { queues, handles: Mutex::new(handles) }
    }

    pub fn queues(&self) -> &[Arc<WorkerQueue>] {
        &self.queues
    }

    /// Broadcasts `Quit` to every worker and joins them, draining pending
    /// jobs along the way.
    pub fn shutdown(&self) {
        for queue in &self.queues {
            queue.push(Job::quit());
        }
        let mut handles = self.handles.lock();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn run_worker(
    worker_id: usize,
    queue: Arc<WorkerQueue>,
    tables: Arc<SharedTables>,
    keypair: Arc<KeyPair>,
    is_transaction_worker: bool,
) {
    let signer = Signer::new(&keypair);
    info!(worker_id, is_transaction_worker, "worker started");

    loop {
        let job = queue.pop_blocking();
        match job.kind {
            JobKind::Quit => {
                info!(worker_id, "worker draining and shutting down");
                break;
            }
            JobKind::Register { budget } => {
                debug_assert!(is_transaction_worker, "register jobs must route to the transaction worker");
                let outcome = handle_register(&tables, job.transaction_id, budget);
                complete(&job, outcome);
            }
            JobKind::Shared => {
                let outcome = handle_acquire(&tables, &signer, job.transaction_id, job.row_id, false);
                complete(&job, outcome);
            }
            JobKind::Exclusive => {
                let outcome = handle_acquire(&tables, &signer, job.transaction_id, job.row_id, true);
                complete(&job, outcome);
            }
            JobKind::Unlock => {
                let outcome = handle_unlock(&tables, job.transaction_id, job.row_id);
                complete(&job, outcome);
            }
        }
    }
}

fn complete(job: &Job, outcome: JobOutcome) {
    if job.wait_for_result {
        if let Some(completion) = &job.completion {
            completion.fulfill(outcome);
        }
    }
}

fn handle_register(tables: &SharedTables, tid: TransactionId, budget: u32) -> JobOutcome {
    let bucket_idx = tables.transaction_table.bucket_index(tid);
    let result = tables.transaction_shield.verified_mutate(
        &tables.transaction_table,
        bucket_idx,
        "transactions",
        canonical_transaction_bucket,
        |bucket| {
            if bucket.iter().any(|(k, _)| *k == tid) {
                return Err(LockError::AlreadyRegistered(tid));
            }
            bucket.push((tid, Transaction::new(tid, budget)));
            Ok(())
        },
    );
    match result {
        Ok(Ok(())) => JobOutcome::ok(),
        Ok(Err(e)) | Err(e) => JobOutcome::failed(e),
    }
}

/// Reads `tid`'s transaction record and checks `aborted`/phase/budget,
/// without mutating anything. Run before any lock-side decision so the
/// upgrade path is subject to exactly the same preconditions as a first
/// grant (section 4.F, invariant I2).
fn check_transaction_preconditions(tables: &SharedTables, tid: TransactionId) -> Result<(), LockError> {
    let idx = tables.transaction_table.bucket_index(tid);
    let result = tables.transaction_shield.verified_mutate(
        &tables.transaction_table,
        idx,
        "transactions",
        canonical_transaction_bucket,
        |bucket| -> Result<(), LockError> {
            let (_, txn) = bucket
                .iter()
                .find(|(k, _)| *k == tid)
                .ok_or(LockError::NotRegistered(tid))?;
            if txn.aborted {
                return Err(LockError::NotRegistered(tid));
            }
            if matches!(txn.phase, Phase::Shrinking) {
                return Err(LockError::PhaseViolation(tid));
            }
            if txn.budget == 0 {
                return Err(LockError::BudgetExhausted(tid));
            }
            Ok(())
        },
    );
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) | Err(e) => Err(e),
    }
}

/// Implements the `acquire_lock` pseudocode of section 4.F: reads the
/// transaction record, reads-or-creates the lock record, runs the
/// upgrade/first-grant/already-held decision tree, and on success signs
/// an attestation. Any rejected grant aborts the transaction in full.
fn handle_acquire(
    tables: &SharedTables,
    signer: &Signer,
    tid: TransactionId,
    rid: RowId,
    exclusive: bool,
) -> JobOutcome {
    let mode = if exclusive { LockMode::Exclusive } else { LockMode::Shared };

    // 4.F checks aborted/phase/budget against the transaction record before
    // ever touching the lock record, unconditionally of whether this turns
    // out to be an upgrade or a first grant — the upgrade branch does not
    // get to skip these.
    if let Err(e) = check_transaction_preconditions(tables, tid) {
        if e.aborts_transaction() {
            abort_transaction(tables, tid);
        }
        return JobOutcome::failed(e);
    }

    let lock_bucket_idx = tables.lock_table.bucket_index(rid);
    let owner_capacity = tables.owner_capacity;

    // The lock record is created lazily on first grant (section 3); the
    // lookup-or-insert happens inside the same verified critical section
    // as the grant decision so the stored digest is never observed
    // mid-mutation.
    let decision = tables.lock_shield.verified_mutate(
        &tables.lock_table,
        lock_bucket_idx,
        "locks",
        move |b| canonical_lock_bucket(b, owner_capacity),
        |bucket| -> Result<Decision, LockError> {
            if !bucket.iter().any(|(k, _)| *k == rid) {
                bucket.push((rid, Lock::new()));
            }
            let entry = bucket
                .iter_mut()
                .find(|(k, _)| *k == rid)
                .expect("lock record inserted just above");
            decide_grant(&mut entry.1, tid, rid, exclusive)
        },
    );

    let decision = match decision {
        Ok(Ok(d)) => d,
        Ok(Err(e)) | Err(e) => {
            abort_transaction(tables, tid);
            return JobOutcome::failed(e);
        }
    };

    let txn_bucket_idx = tables.transaction_table.bucket_index(tid);
    let txn_result = tables.transaction_shield.verified_mutate(
        &tables.transaction_table,
        txn_bucket_idx,
        "transactions",
        canonical_transaction_bucket,
        |bucket| -> Result<(), LockError> {
            let (_, txn) = bucket
                .iter_mut()
                .find(|(k, _)| *k == tid)
                .ok_or(LockError::NotRegistered(tid))?;
            match decision {
                Decision::Upgrade | Decision::FirstGrant => {
                    if !txn.has_lock(rid) {
                        txn.add_lock(rid)?;
                    }
                    Ok(())
                }
            }
        },
    );

    match txn_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) | Err(e) => {
            undo_lock_grant(tables, rid, tid, exclusive, decision);
            abort_transaction(tables, tid);
            return JobOutcome::failed(e);
        }
    }

    let block_timeout = crate::lockmgr::signer::default_block_timeout();
    let signature = signer.sign_attestation(tid, rid, mode, block_timeout);
    JobOutcome::signed(signature)
}

#[derive(Clone, Copy)]
enum Decision {
    Upgrade,
    FirstGrant,
}

/// The decision tree from section 4.F, operating purely on the lock
/// record (the transaction side is applied by the caller once this
/// succeeds, so a transaction-side failure can still be rolled back).
fn decide_grant(lock: &mut Lock, tid: TransactionId, rid: RowId, exclusive: bool) -> Result<Decision, LockError> {
    if exclusive && lock.is_sole_owner(tid) && !lock.is_exclusive() {
        if lock.upgrade(tid) {
            return Ok(Decision::Upgrade);
        }
        return Err(LockError::LockConflict { txn: tid, row: rid });
    }

    if lock.owners().contains(&tid) {
        return Err(LockError::DuplicateGrant { txn: tid, row: rid });
    }

    let granted = if exclusive {
        lock.acquire_exclusive(tid)
    } else {
        lock.acquire_shared(tid)
    };
    if granted {
        Ok(Decision::FirstGrant)
    } else {
        Err(LockError::LockConflict { txn: tid, row: rid })
    }
}

/// Reverts a lock-side grant that was applied before a later
/// transaction-side failure was discovered, keeping the lock table
/// consistent with "no partial state changes survive a failed lock
/// request" (section 7).
fn undo_lock_grant(tables: &SharedTables, rid: RowId, tid: TransactionId, exclusive: bool, decision: Decision) {
    let idx = tables.lock_table.bucket_index(rid);
    let owner_capacity = tables.owner_capacity;
    let _ = tables.lock_shield.verified_mutate(
        &tables.lock_table,
        idx,
        "locks",
        move |b| canonical_lock_bucket(b, owner_capacity),
        |bucket| {
            if let Some(entry) = bucket.iter_mut().find(|(k, _)| *k == rid) {
                match decision {
                    Decision::Upgrade if exclusive => {
                        // Best effort: downgrading back to shared is not a
                        // representable lock-record operation, so release
                        // and let the caller's abort path clean up.
                        entry.1.release(tid);
                    }
                    _ => entry.1.release(tid),
                }
                if entry.1.is_unowned() {
                    bucket.retain(|(k, _)| *k != rid);
                }
            }
        },
    );
}

fn handle_unlock(tables: &SharedTables, tid: TransactionId, rid: RowId) -> JobOutcome {
    let txn_bucket_idx = tables.transaction_table.bucket_index(tid);
    let released = tables.transaction_shield.verified_mutate(
        &tables.transaction_table,
        txn_bucket_idx,
        "transactions",
        canonical_transaction_bucket,
        |bucket| {
            bucket
                .iter_mut()
                .find(|(k, _)| *k == tid)
                .map(|(_, txn)| txn.release_lock(rid))
                .unwrap_or(false)
        },
    );

    match released {
        Ok(true) => {
            release_row(tables, rid, tid);
            JobOutcome::ok()
        }
        Ok(false) => JobOutcome::ok(),
        Err(e) => JobOutcome::failed(e),
    }
}

fn release_row(tables: &SharedTables, rid: RowId, tid: TransactionId) {
    let idx = tables.lock_table.bucket_index(rid);
    let owner_capacity = tables.owner_capacity;
    let result = tables.lock_shield.verified_mutate(
        &tables.lock_table,
        idx,
        "locks",
        move |b| canonical_lock_bucket(b, owner_capacity),
        |bucket| {
            if let Some(pos) = bucket.iter().position(|(k, _)| *k == rid) {
                bucket[pos].1.release(tid);
                if bucket[pos].1.is_unowned() {
                    bucket.remove(pos);
                }
            }
        },
    );
    if let Err(e) = result {
        warn!(?e, rid, tid, "integrity violation releasing row");
    }
}

/// Purges the transaction record and releases every lock it held,
/// leaving each row decisively open for other transactions.
fn abort_transaction(tables: &SharedTables, tid: TransactionId) {
    let txn_bucket_idx = tables.transaction_table.bucket_index(tid);
    let held = tables.transaction_shield.verified_mutate(
        &tables.transaction_table,
        txn_bucket_idx,
        "transactions",
        canonical_transaction_bucket,
        |bucket| {
            bucket
                .iter_mut()
                .find(|(k, _)| *k == tid)
                .map(|(_, txn)| txn.take_all_for_abort())
        },
    );

    let held = match held {
        Ok(Some(rows)) => rows,
        Ok(None) => return,
        Err(e) => {
            warn!(?e, tid, "integrity violation aborting transaction");
            return;
        }
    };

    for rid in held {
        release_row(tables, rid, tid);
    }

    let purge = tables.transaction_shield.verified_mutate(
        &tables.transaction_table,
        txn_bucket_idx,
        "transactions",
        canonical_transaction_bucket,
        |bucket| {
            bucket.retain(|(k, _)| *k != tid);
        },
    );
    if let Err(e) = purge {
        warn!(?e, tid, "integrity violation purging aborted transaction");
        return;
    }
    debug!(tid, "transaction aborted and purged");
}
