use std::sync::Arc;

use crate::common::TransactionId;
use crate::config::ManagerConfig;
use crate::error::LockError;
use crate::lockmgr::job::{Job, JobKind};
use crate::lockmgr::table::ShardedTable;
use crate::lockmgr::transaction::Transaction;
use crate::lockmgr::worker::WorkerQueue;

/// Routes jobs to the single worker that owns the target shard.
///
/// Never blocks on worker progress: enqueueing only takes the target
/// worker's own queue mutex for the duration of a `push_back` plus a
/// `notify_one`.
pub struct Dispatcher {
    config: ManagerConfig,
    queues: Vec<Arc<WorkerQueue>>,
    transaction_table: Arc<ShardedTable<Transaction>>,
}

impl Dispatcher {
    pub fn new(
        config: ManagerConfig,
        queues: Vec<Arc<WorkerQueue>>,
        transaction_table: Arc<ShardedTable<Transaction>>,
    ) -> Self {
        Self { config, queues, transaction_table }
    }

    /// `owner_id = ⌊(r mod N) / (N / L)⌋`, clamped to `L - 1` so it can
    /// never collide with the transaction worker when `N` is not a
    /// multiple of `L` (open question #2, resolved per the spec's own
    /// recommendation).
    pub fn lock_worker_for_row(&self, row_id: u32) -> usize {
        let n = self.config.lock_table_size;
        let l = self.config.num_worker_threads;
        let bucket = (row_id as usize) % n;
        let width = (n / l).max(1);
        (bucket / width).min(l - 1)
    }

    pub fn transaction_worker(&self) -> usize {
        self.config.transaction_worker()
    }

    /// Submits `job`, performing the dispatcher's one pre-flight check:
    /// `Shared | Exclusive | Unlock` jobs for an unregistered transaction
    /// fail immediately without ever reaching a worker queue.
    pub fn dispatch(&self, job: Job) {
        let worker_id = match job.kind {
            JobKind::Register { .. } => self.transaction_worker(),
            JobKind::Quit => {
                for queue in &self.queues {
                    queue.push(Job::quit());
                }
                return;
            }
            JobKind::Shared | JobKind::Exclusive | JobKind::Unlock => {
                if !self.transaction_table.contains(job.transaction_id) {
                    job.fail_fast(LockError::NotRegistered(job.transaction_id));
                    return;
                }
                self.lock_worker_for_row(job.row_id)
            }
        };
        self.queues[worker_id].push(job);
    }

    pub fn is_registered(&self, tid: TransactionId) -> bool {
        self.transaction_table.contains(tid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(l: usize, n: usize) -> ManagerConfig {
        ManagerConfig {
            num_worker_threads: l,
            lock_table_size: n,
            transaction_table_size: 200,
            key_file: std::path::PathBuf::from("/tmp/unused.key"),
        }
    }

    #[test]
    fn owner_mapping_never_hits_transaction_worker() {
        let cfg = config(4, 10); // N not a multiple of L
        let txn_table = Arc::new(ShardedTable::new(cfg.transaction_table_size));
        let queues = (0..cfg.total_workers()).map(|_| WorkerQueue::new()).collect();
        let d = Dispatcher::new(cfg.clone(), queues, txn_table);
        for row in 0..cfg.lock_table_size as u32 {
            assert!(d.lock_worker_for_row(row) < cfg.num_worker_threads);
        }
    }

    #[test]
    fn owner_mapping_partitions_evenly_when_divisible() {
        let cfg = config(5, 10_000);
        let txn_table = Arc::new(ShardedTable::new(cfg.transaction_table_size));
        let queues = (0..cfg.total_workers()).map(|_| WorkerQueue::new()).collect();
        let d = Dispatcher::new(cfg, queues, txn_table);
        assert_eq!(d.lock_worker_for_row(0), 0);
        assert_eq!(d.lock_worker_for_row(1_999), 0);
        assert_eq!(d.lock_worker_for_row(2_000), 1);
        assert_eq!(d.lock_worker_for_row(9_999), 4);
    }
}
