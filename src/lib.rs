// LockVault - a trusted row-level lock manager with signed attestations.

pub mod common;
pub mod config;
pub mod error;
pub mod keyfile;
pub mod lockmgr;
pub mod rpc;

pub use config::ManagerConfig;
pub use error::{LockError, Result};
pub use lockmgr::{LockManager, LockMode, Phase};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
