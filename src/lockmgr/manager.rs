use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::common::{is_valid_id, RowId, TransactionId};
use crate::config::ManagerConfig;
use crate::error::LockError;
use crate::keyfile::SealedKeyFile;
use crate::lockmgr::dispatcher::Dispatcher;
use crate::lockmgr::integrity::IntegrityShield;
use crate::lockmgr::job::{Completion, Job, JobKind};
use crate::lockmgr::record::Lock;
use crate::lockmgr::signer::KeyPair;
use crate::lockmgr::table::ShardedTable;
use crate::lockmgr::transaction::Transaction;
use crate::lockmgr::worker::{SharedTables, WorkerPool};

/// External API of the lock manager (component I): register, lock, unlock.
/// Synthesizes jobs and, when the caller asks, blocks for the result.
pub struct LockManager {
    dispatcher: Dispatcher,
    pool: WorkerPool,
    public_key: String,
    verifying_key: p256::ecdsa::VerifyingKey,
}

impl LockManager {
    /// Loads (or generates and seals) the signing key pair, initializes
    /// the sharded tables and their integrity shields, and starts the
    /// worker pool. Initialization order follows section 9: keys, then
    /// shards/hashes, then workers.
    pub fn start(config: ManagerConfig) -> Result<Self, LockError> {
        let keypair = Arc::new(Self::load_or_generate_keys(&config.key_file)?);
        let public_key = crate::lockmgr::signer::export_public_key(&keypair.verifying_key);
        let verifying_key = keypair.verifying_key;

        let lock_table = Arc::new(ShardedTable::<Lock>::new(config.lock_table_size));
        let lock_shield = Arc::new(IntegrityShield::new(config.lock_table_size));
        let transaction_table = Arc::new(ShardedTable::<Transaction>::new(config.transaction_table_size));
        let transaction_shield = Arc::new(IntegrityShield::new(config.transaction_table_size));

        let tables = Arc::new(SharedTables {
            lock_table: Arc::clone(&lock_table),
            lock_shield,
            transaction_table: Arc::clone(&transaction_table),
            transaction_shield,
            owner_capacity: config.transaction_table_size,
        });

        let pool = WorkerPool::start(&config, tables, keypair);
        let dispatcher = Dispatcher::new(config.clone(), pool.queues().to_vec(), transaction_table);

        info!(
            workers = config.total_workers(),
            lock_table_size = config.lock_table_size,
            transaction_table_size = config.transaction_table_size,
            "lock manager started"
        );

        Ok(Self { dispatcher, pool, public_key, verifying_key })
    }

    fn load_or_generate_keys(path: &Path) -> Result<KeyPair, LockError> {
        SealedKeyFile::load_or_generate(path)
    }

    /// The base64-encoded public key, suffixed with its own character
    /// count, for distribution to downstream verifiers.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn verifying_key(&self) -> &p256::ecdsa::VerifyingKey {
        &self.verifying_key
    }

    pub fn register_transaction(&self, tid: TransactionId, budget: u32) -> Result<(), LockError> {
        if !is_valid_id(tid) {
            return Err(LockError::InvalidId);
        }
        let outcome = self.submit_and_wait(Job {
            kind: JobKind::Register { budget },
            transaction_id: tid,
            row_id: 0,
            wait_for_result: true,
            completion: None,
        });
        match outcome.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn lock_shared(&self, tid: TransactionId, rid: RowId) -> Result<String, LockError> {
        self.acquire(tid, rid, JobKind::Shared)
    }

    pub fn lock_exclusive(&self, tid: TransactionId, rid: RowId) -> Result<String, LockError> {
        self.acquire(tid, rid, JobKind::Exclusive)
    }

    fn acquire(&self, tid: TransactionId, rid: RowId, kind: JobKind) -> Result<String, LockError> {
        if !is_valid_id(tid) || !is_valid_id(rid) {
            return Err(LockError::InvalidId);
        }
        let outcome = self.submit_and_wait(Job {
            kind,
            transaction_id: tid,
            row_id: rid,
            wait_for_result: true,
            completion: None,
        });
        match outcome.error {
            Some(e) => Err(e),
            None => Ok(outcome.signature.unwrap_or_default()),
        }
    }

    pub fn unlock(&self, tid: TransactionId, rid: RowId) -> Result<(), LockError> {
        if !is_valid_id(tid) || !is_valid_id(rid) {
            return Err(LockError::InvalidId);
        }
        let outcome = self.submit_and_wait(Job {
            kind: JobKind::Unlock,
            transaction_id: tid,
            row_id: rid,
            wait_for_result: true,
            completion: None,
        });
        match outcome.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn submit_and_wait(&self, mut job: Job) -> crate::lockmgr::job::JobOutcome {
        let completion = Completion::new();
        job.completion = Some(Arc::clone(&completion));
        self.dispatcher.dispatch(job);
        completion.wait()
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockmgr::signer::verify_attestation;
    use crate::lockmgr::types::LockMode;
    use std::sync::Arc as StdArc;
    use std::thread;

    fn manager(tmp: &tempfile::TempDir) -> LockManager {
        let config = ManagerConfig {
            num_worker_threads: 2,
            lock_table_size: 16,
            transaction_table_size: 8,
            key_file: tmp.path().join("key.bin"),
        };
        LockManager::start(config).unwrap()
    }

    #[test]
    fn budget_exhaustion_aborts_transaction_and_releases_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(&tmp);
        mgr.register_transaction(1, 10).unwrap();
        for row in 1..=10u32 {
            mgr.lock_shared(1, row).unwrap();
        }
        assert_eq!(mgr.lock_shared(1, 11), Err(LockError::BudgetExhausted(1)));
        assert_eq!(mgr.unlock(1, 1), Err(LockError::NotRegistered(1)));
        mgr.shutdown();
    }

    #[test]
    fn upgrade_path_signs_both_attestations() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(&tmp);
        mgr.register_transaction(1, 10).unwrap();
        let shared_sig = mgr.lock_shared(1, 5).unwrap();
        let exclusive_sig = mgr.lock_exclusive(1, 5).unwrap();

        let verifying_key = *mgr.verifying_key();
        verify_attestation(&verifying_key, &shared_sig, 1, 5, LockMode::Shared, 0).unwrap();
        verify_attestation(&verifying_key, &exclusive_sig, 1, 5, LockMode::Exclusive, 0).unwrap();
        mgr.shutdown();
    }

    #[test]
    fn conflicting_exclusive_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(&tmp);
        mgr.register_transaction(1, 10).unwrap();
        mgr.register_transaction(2, 10).unwrap();
        mgr.lock_exclusive(1, 7).unwrap();
        assert_eq!(
            mgr.lock_shared(2, 7),
            Err(LockError::LockConflict { txn: 2, row: 7 })
        );
        mgr.shutdown();
    }

    #[test]
    fn shrinking_refusal_then_reregistration() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(&tmp);
        mgr.register_transaction(1, 10).unwrap();
        mgr.lock_exclusive(1, 3).unwrap();
        mgr.unlock(1, 3).unwrap();
        assert_eq!(
            mgr.lock_exclusive(1, 3),
            Err(LockError::PhaseViolation(1))
        );
        mgr.register_transaction(1, 5).unwrap();
        mgr.shutdown();
    }

    #[test]
    fn duplicate_grant_aborts_transaction() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(&tmp);
        mgr.register_transaction(1, 10).unwrap();
        mgr.lock_shared(1, 2).unwrap();
        assert_eq!(
            mgr.lock_shared(1, 2),
            Err(LockError::DuplicateGrant { txn: 1, row: 2 })
        );
        assert_eq!(mgr.lock_shared(1, 99), Err(LockError::NotRegistered(1)));
        mgr.shutdown();
    }

    #[test]
    fn concurrent_shared_fan_in_all_verify() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = StdArc::new(manager(&tmp));
        let n = 8u32;
        for tid in 1..=n {
            mgr.register_transaction(tid, 1).unwrap();
        }

        let handles: Vec<_> = (1..=n)
            .map(|tid| {
                let mgr = StdArc::clone(&mgr);
                thread::spawn(move || mgr.lock_shared(tid, 42).unwrap())
            })
            .collect();

        let verifying_key = *mgr.verifying_key();
        for (tid, handle) in (1..=n).zip(handles) {
            let sig = handle.join().unwrap();
            verify_attestation(&verifying_key, &sig, tid, 42, LockMode::Shared, 0).unwrap();
        }
        mgr.shutdown();
    }
}
