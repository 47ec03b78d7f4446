//! Status command implementation.

use serde::Serialize;
use std::path::Path;
use yasa_store::LocalStore;

/// Summary of local sync state.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// State file path.
    pub path: String,
    /// Last successful sync, in milliseconds since the epoch (0 if never).
    pub last_update: u64,
    /// Files known locally.
    pub file_count: usize,
    /// Files the next sync will announce.
    pub unannounced: Vec<String>,
    /// Server ids whose deletion the next sync will announce.
    pub pending_deletions: Vec<u64>,
}

/// Collects the status of the store at `db_path`.
pub fn collect(db_path: &Path) -> Result<StatusResult, Box<dyn std::error::Error>> {
    let store = LocalStore::open_file(db_path)?;

    Ok(StatusResult {
        path: db_path.display().to_string(),
        last_update: store.last_update().as_millis(),
        file_count: store.files().len(),
        unannounced: store
            .unannounced_files()
            .into_iter()
            .map(|f| f.path.display().to_string())
            .collect(),
        pending_deletions: store
            .deletions()
            .into_iter()
            .map(|d| d.server_id.get())
            .collect(),
    })
}

/// Runs the status command.
pub fn run(db_path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let status = collect(db_path)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&status)?),
        "text" => {
            println!("State: {}", status.path);
            if status.last_update == 0 {
                println!("Last sync: never");
            } else {
                println!("Last sync: {} ms since epoch", status.last_update);
            }
            println!("Files: {}", status.file_count);
            println!("Pending additions: {}", status.unannounced.len());
            for path in &status.unannounced {
                println!("  + {path}");
            }
            println!("Pending deletions: {}", status.pending_deletions.len());
            for id in &status.pending_deletions {
                println!("  - file {id}");
            }
        }
        other => return Err(format!("Unknown format: {other}").into()),
    }

    Ok(())
}
