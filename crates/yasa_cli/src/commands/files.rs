//! Local add and remove commands.
//!
//! These only touch local state. The server hears about the changes on the
//! next `sync`.

use std::path::{Path, PathBuf};
use tracing::{info, warn};
use yasa_store::LocalStore;
use yasa_sync_protocol::Timestamp;

/// Records locally added files.
pub fn add(db_path: &Path, paths: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    let store = LocalStore::open_file(db_path)?;

    for path in paths {
        let path = std::path::absolute(path)?;
        if !path.is_file() {
            return Err(format!("Not a file: {:?}", path).into());
        }
        let local_id = store.register_file(&path)?;
        info!("Recorded {:?} as local file {}", path, local_id);
        println!("✓ Added {}", path.display());
    }

    Ok(())
}

/// Records locally removed files.
///
/// Files the server already knows leave a tombstone; files it never heard
/// of are simply forgotten.
pub fn remove(db_path: &Path, paths: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    let store = LocalStore::open_file(db_path)?;

    for path in paths {
        let path = std::path::absolute(path)?;
        let Some(record) = store.files().into_iter().find(|f| f.path == path) else {
            warn!("{:?} is not a known file, skipping", path);
            continue;
        };

        let tombstone =
            store.transaction(|txn| txn.remove_local_file(record.local_id, Timestamp::now()))?;
        match tombstone {
            Some(t) => println!(
                "✓ Removed {} (server will be told about file {})",
                path.display(),
                t.server_id
            ),
            None => println!("✓ Removed {}", path.display()),
        }
    }

    Ok(())
}
