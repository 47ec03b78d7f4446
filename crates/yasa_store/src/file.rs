//! File-based storage backend for persistent state.

use crate::backend::StorageBackend;
use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A file-based storage backend.
///
/// The snapshot lives in a single file. Writes go to a sibling temporary
/// file which is synced and then renamed over the original, so a crash
/// mid-write leaves the previous snapshot intact.
///
/// An advisory lock on `<path>.lock` is held for the backend's lifetime;
/// a second process opening the same store fails with
/// [`StoreError::Locked`].
///
/// # Example
///
/// ```no_run
/// use yasa_store::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("yasaclient.db")).unwrap();
/// backend.store(b"{}").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    temp_path: PathBuf,
    _lock_file: File,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// Parent directories are created if needed. The snapshot file itself
    /// is only created by the first `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired or an I/O error occurs.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let lock_path = sibling(path, "lock");
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(path.to_path_buf()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            temp_path: sibling(path, "tmp"),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&mut self, data: &[u8]) -> StoreResult<()> {
        {
            let mut temp = File::create(&self.temp_path)?;
            temp.write_all(data)?;
            temp.sync_all()?;
        }
        fs::rename(&self.temp_path, &self.path)?;
        sync_parent(&self.path)
    }
}

/// Persists the directory entry written by the rename.
#[cfg(unix)]
fn sync_parent(path: &Path) -> StoreResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> StoreResult<()> {
    Ok(())
}

/// `yasaclient.db` -> `yasaclient.db.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
