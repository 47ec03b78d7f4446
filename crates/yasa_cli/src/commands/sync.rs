//! Sync command implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use yasa_store::LocalStore;
use yasa_sync_engine::{
    platform_default, DirectoryLibrary, LibraryAdapter, SyncConfig, SyncEngine,
};

/// Runs one sync cycle against `server`.
pub fn run(
    db_path: &Path,
    server: &str,
    library: Option<PathBuf>,
    temp_dir: Option<PathBuf>,
    timeout: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Syncing {:?} with {}", db_path, server);

    let store = Arc::new(LocalStore::open_file(db_path)?);

    let library: Box<dyn LibraryAdapter> = match library {
        Some(dir) => Box::new(DirectoryLibrary::open(dir)?),
        None => platform_default(),
    };

    let temp_dir = temp_dir.unwrap_or_else(|| incoming_dir(db_path));
    let mut config = SyncConfig::new(server)
        .with_connect_timeout(Duration::from_secs(10))
        .with_temp_dir(temp_dir);
    if let Some(secs) = timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }

    let mut engine = SyncEngine::new(config, store, library);
    let result = engine.sync()?;

    println!("✓ Sync complete in {:.2?}", result.duration);
    println!("  Pulled: {}", result.pull.pulled);
    println!("  Deleted: {}", result.pull.deleted);
    println!("  Skipped: {}", result.pull.skipped);
    println!("  Pushed: {}", result.push.pushed);
    println!("  Deletions announced: {}", result.push.deletions);

    Ok(())
}

/// `music/yasaclient.db` -> `music/yasa-incoming`
///
/// Kept beside the state file: with no library to import into, pulled
/// files stay where they were downloaded.
fn incoming_dir(db_path: &Path) -> PathBuf {
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join("yasa-incoming"),
        _ => PathBuf::from("yasa-incoming"),
    }
}
