//! Media library adapters.
//!
//! The engine never places files itself. Pulled files are handed to a
//! [`LibraryAdapter`], which decides where they end up and reports the
//! resident path back.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use yasa_sync_protocol::ServerId;

/// Result type for library operations.
pub type LibraryResult<T> = Result<T, LibraryError>;

/// Errors raised by a media library.
#[derive(Error, Debug)]
pub enum LibraryError {
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The platform has no supported media library.
    #[error("unsupported media library: {0}")]
    Unsupported(String),

    /// An external helper failed.
    #[error("library command failed: {0}")]
    Command(String),
}

/// A place pulled files are imported into.
pub trait LibraryAdapter: Send + Sync {
    /// Imports the file at `path` and returns where it now resides.
    ///
    /// The adapter must not delete `path`; the engine cleans it up when the
    /// returned path differs.
    fn import(&self, path: &Path) -> LibraryResult<PathBuf>;

    /// Removes a previously imported file.
    fn remove(&self, server_id: ServerId, resident: &Path) -> LibraryResult<()>;
}

/// Copies files into a plain directory.
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    /// Uses `root` as the library directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> LibraryResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The library directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// First free name for `file_name` in the library: `a.mp3`, `a-1.mp3`, ...
    fn free_path(&self, file_name: &Path) -> PathBuf {
        let candidate = self.root.join(file_name);
        if !candidate.exists() {
            return candidate;
        }

        let stem = file_name
            .file_stem()
            .map_or_else(|| "track".into(), |s| s.to_string_lossy().into_owned());
        let ext = file_name.extension().map(|e| e.to_string_lossy().into_owned());

        (1u32..)
            .map(|n| match &ext {
                Some(ext) => self.root.join(format!("{stem}-{n}.{ext}")),
                None => self.root.join(format!("{stem}-{n}")),
            })
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }
}

impl LibraryAdapter for DirectoryLibrary {
    fn import(&self, path: &Path) -> LibraryResult<PathBuf> {
        let file_name = path
            .file_name()
            .map_or_else(|| PathBuf::from("track"), PathBuf::from);
        let target = self.free_path(&file_name);
        fs::copy(path, &target)?;
        debug!("Imported {} as {}", path.display(), target.display());
        Ok(target)
    }

    fn remove(&self, server_id: ServerId, resident: &Path) -> LibraryResult<()> {
        if !resident.starts_with(&self.root) {
            debug!(
                "Not removing {} for file {}: outside library",
                resident.display(),
                server_id
            );
            return Ok(());
        }
        match fs::remove_file(resident) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Leaves files where they are.
///
/// `import` returns the given path unchanged and `remove` does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLibrary;

impl LibraryAdapter for NoopLibrary {
    fn import(&self, path: &Path) -> LibraryResult<PathBuf> {
        Ok(path.to_path_buf())
    }

    fn remove(&self, _server_id: ServerId, _resident: &Path) -> LibraryResult<()> {
        Ok(())
    }
}

/// Fails every operation.
#[derive(Debug, Clone)]
pub struct UnsupportedLibrary {
    platform: String,
}

impl UnsupportedLibrary {
    /// Creates an adapter reporting the current platform.
    pub fn new() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
        }
    }
}

impl Default for UnsupportedLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryAdapter for UnsupportedLibrary {
    fn import(&self, _path: &Path) -> LibraryResult<PathBuf> {
        Err(LibraryError::Unsupported(self.platform.clone()))
    }

    fn remove(&self, _server_id: ServerId, _resident: &Path) -> LibraryResult<()> {
        Err(LibraryError::Unsupported(self.platform.clone()))
    }
}

/// Imports into iTunes through AppleScript.
#[cfg(target_os = "macos")]
#[derive(Debug, Clone, Copy, Default)]
pub struct ITunesLibrary;

#[cfg(target_os = "macos")]
impl ITunesLibrary {
    fn import_script(path: &Path) -> String {
        let quoted = path
            .to_string_lossy()
            .replace('\\', "\\\\")
            .replace('"', "\\\"");
        format!(
            r#"set f to POSIX file "{quoted}"
tell application "iTunes"
    launch
    try
        set t to add (f)
        set loc to location of t
        set output to POSIX path of loc
        do shell script "echo " & quoted form of output
    end try
end tell"#
        )
    }
}

#[cfg(target_os = "macos")]
impl LibraryAdapter for ITunesLibrary {
    fn import(&self, path: &Path) -> LibraryResult<PathBuf> {
        let output = std::process::Command::new("osascript")
            .arg("-e")
            .arg(Self::import_script(path))
            .output()?;

        if !output.status.success() {
            return Err(LibraryError::Command(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let resident = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if resident.is_empty() {
            return Err(LibraryError::Command(format!(
                "iTunes did not report a location for {}",
                path.display()
            )));
        }
        Ok(PathBuf::from(resident))
    }

    fn remove(&self, server_id: ServerId, resident: &Path) -> LibraryResult<()> {
        debug!(
            "Leaving {} (file {}) in iTunes; removal is manual",
            resident.display(),
            server_id
        );
        Ok(())
    }
}

/// The adapter this platform supports out of the box.
pub fn platform_default() -> Box<dyn LibraryAdapter> {
    #[cfg(target_os = "macos")]
    {
        Box::new(ITunesLibrary)
    }
    #[cfg(not(target_os = "macos"))]
    {
        Box::new(UnsupportedLibrary::new())
    }
}
