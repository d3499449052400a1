use std::path::PathBuf;

/// Configuration for a [`crate::lockmgr::LockManager`] instance.
///
/// Mirrors section 6 of the design: worker count, table capacities, and the
/// location of the sealed signing-key blob.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Number of lock-table workers `L`. Total worker threads = `L + 1`; the
    /// extra worker owns the transaction table exclusively.
    pub num_worker_threads: usize,
    /// Bucket count `N` of the lock table.
    pub lock_table_size: usize,
    /// Bucket count of the transaction table.
    pub transaction_table_size: usize,
    /// Path to the sealed ECDSA key blob.
    pub key_file: PathBuf,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            num_worker_threads: num_cpus::get().max(1),
            lock_table_size: 10_000,
            transaction_table_size: 200,
            key_file: PathBuf::from("./data/lockvault.key"),
        }
    }
}

impl ManagerConfig {
    /// Total worker count `W = L + 1`.
    pub fn total_workers(&self) -> usize {
        self.num_worker_threads + 1
    }

    /// The worker id reserved for the transaction table (`W - 1`).
    pub fn transaction_worker(&self) -> usize {
        self.num_worker_threads
    }
}
