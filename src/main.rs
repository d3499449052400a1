// LockVault server
//
// Starts the lock manager core and serves its RPC surface over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use lockvault::config::ManagerConfig;
use lockvault::lockmgr::LockManager;
use lockvault::rpc;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    print_banner();

    let install_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut config = ManagerConfig::default();
    config.key_file = install_dir.join("data").join("lockvault.key");

    tracing::info!(
        workers = config.num_worker_threads,
        lock_table_size = config.lock_table_size,
        transaction_table_size = config.transaction_table_size,
        key_file = %config.key_file.display(),
        "starting lock manager"
    );

    let manager = LockManager::start(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    tracing::info!(public_key = %manager.public_key(), "signing key ready");

    let addr: SocketAddr = std::env::var("LOCKVAULT_ADDR")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8761)));

    rpc::serve(Arc::new(manager), addr).await
}

fn print_banner() {
    println!(
        r#"
 _            _   __      __          _ _
| |___ _____ | | / /__ _ _  _ |  |  |__ _ _  _| | |_
| / _ \/ _| |/ / _` | || | | |\/ | _` | || | |  _|
|_\___/\__|_|\_\__,_|\_,_|  |__|__\__,_|\_,_|_|\__|
"#
    );
    println!("  trusted row-level lock manager  |  v{}\n", lockvault::VERSION);
}
