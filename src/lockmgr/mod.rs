//! The trusted row-level lock manager core.
//!
//! Leaf-first module order mirrors the component table: lock/transaction
//! records, the sharded tables and their integrity shield, jobs, the
//! dispatcher and worker pool, the signer, and finally the external
//! [`LockManager`] facade.

pub mod dispatcher;
pub mod integrity;
pub mod job;
pub mod manager;
pub mod record;
pub mod signer;
pub mod table;
pub mod transaction;
pub mod types;
pub mod worker;

pub use manager::LockManager;
pub use types::{LockMode, Phase};
