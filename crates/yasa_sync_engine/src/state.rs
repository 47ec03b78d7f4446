//! Sync engine state machine.

use crate::cancel::{CancelToken, Interrupt};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::library::LibraryAdapter;
use crate::transfer::{pull_file, push_file};
use crate::transport::Session;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use yasa_store::{FileRecord, LocalStore, NewFile};
use yasa_sync_protocol::{ChangeType, ContentHash, Request, ServerId, Timestamp};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Engine is connecting to the server.
    Connecting,
    /// Engine is pulling changes from the server.
    Pulling,
    /// Engine is pushing changes to the server.
    Pushing,
    /// Engine has completed a sync cycle.
    Synced,
    /// Engine encountered an error.
    Error,
}

impl SyncState {
    /// Returns true if the engine is in an active sync state.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Connecting | SyncState::Pulling | SyncState::Pushing
        )
    }
}

/// Statistics accumulated over the engine's lifetime.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of sync cycles completed.
    pub cycles_completed: u64,
    /// Files received from the server.
    pub files_pulled: u64,
    /// Files removed at the server's request.
    pub files_deleted: u64,
    /// Files announced to the server.
    pub files_pushed: u64,
    /// Local deletions announced to the server.
    pub deletions_pushed: u64,
    /// Changes ignored as redundant.
    pub skipped: u64,
    /// Last successful sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Outcome of [`SyncEngine::do_pull`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullSummary {
    /// NEW changes applied.
    pub pulled: u64,
    /// DELETE changes applied.
    pub deleted: u64,
    /// Changes skipped: NEW for a file already held, DELETE for one unknown.
    pub skipped: u64,
}

/// Outcome of [`SyncEngine::do_push`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushSummary {
    /// New files announced and uploaded.
    pub pushed: u64,
    /// Deletions announced.
    pub deletions: u64,
}

/// Result of a sync cycle.
#[derive(Debug, Clone)]
pub struct SyncCycleResult {
    /// What the pull phase did.
    pub pull: PullSummary,
    /// What the push phase did.
    pub push: PushSummary,
    /// Checkpoint recorded for the next cycle.
    pub last_update: Timestamp,
    /// Duration of the sync cycle.
    pub duration: Duration,
}

/// The sync engine keeps the local library and the server in step.
///
/// A cycle pulls the server's changes since the last successful sync,
/// then pushes local additions and deletions, then records the new
/// checkpoint. Every applied change is committed on its own, so an
/// aborted cycle keeps the work it finished and the next cycle repeats
/// only the rest.
pub struct SyncEngine {
    config: SyncConfig,
    store: Arc<LocalStore>,
    library: Box<dyn LibraryAdapter>,
    state: SyncState,
    stats: SyncStats,
    cancel: CancelToken,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Creates a new sync engine.
    pub fn new(
        config: SyncConfig,
        store: Arc<LocalStore>,
        library: Box<dyn LibraryAdapter>,
    ) -> Self {
        Self {
            config,
            store,
            library,
            state: SyncState::Idle,
            stats: SyncStats::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Gets the current stats.
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// The store this engine commits to.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// The configuration in use.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// A handle that cancels the running cycle from another thread.
    ///
    /// `sync` clears the flag when it starts, so cancelling before a cycle
    /// has no effect on it.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Connects to the configured server and runs a full cycle.
    ///
    /// # Errors
    ///
    /// Returns the first error; `last_update` is left unchanged.
    pub fn sync(&mut self) -> SyncResult<SyncCycleResult> {
        self.cancel.reset();

        let mut interrupt = Interrupt::new(self.cancel.clone());
        if let Some(timeout) = self.config.timeout {
            interrupt = interrupt.with_timeout(timeout);
        }

        self.state = SyncState::Connecting;
        let mut session = match Session::connect(&self.config, interrupt) {
            Ok(session) => session,
            Err(e) => {
                self.handle_error(&e);
                return Err(e);
            }
        };

        self.sync_over(&mut session)
    }

    /// Runs a full cycle over an existing session: pull, push, checkpoint.
    ///
    /// # Errors
    ///
    /// Returns the first error; `last_update` is left unchanged.
    pub fn sync_over<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
    ) -> SyncResult<SyncCycleResult> {
        let start = Instant::now();

        match self.run_cycle(session) {
            Ok((pull, push, last_update)) => {
                self.state = SyncState::Synced;
                self.stats.cycles_completed += 1;
                self.stats.last_sync_time = Some(Instant::now());
                self.stats.last_error = None;

                let result = SyncCycleResult {
                    pull,
                    push,
                    last_update,
                    duration: start.elapsed(),
                };
                info!(
                    "Sync finished in {:?}: {} pulled, {} deleted, {} skipped, {} pushed, {} deletions announced",
                    result.duration,
                    pull.pulled,
                    pull.deleted,
                    pull.skipped,
                    push.pushed,
                    push.deletions
                );
                Ok(result)
            }
            Err(e) => {
                self.handle_error(&e);
                Err(e)
            }
        }
    }

    fn run_cycle<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
    ) -> SyncResult<(PullSummary, PushSummary, Timestamp)> {
        let pull = self.do_pull(session)?;
        let push = self.do_push(session)?;

        let now = Timestamp::now();
        self.store.set_last_update(now)?;
        Ok((pull, push, now))
    }

    /// Applies the server's changes since the last successful sync.
    ///
    /// Changes are processed strictly in the order the server sent them.
    /// Each applied change is committed before the next is started.
    ///
    /// # Errors
    ///
    /// `Integrity` if a pulled file does not match its announced digest;
    /// processing stops there and that file is not recorded.
    pub fn do_pull<S: Read + Write>(&mut self, session: &mut Session<S>) -> SyncResult<PullSummary> {
        info!("Starting pull process");
        self.state = SyncState::Pulling;

        let since = self.store.last_update();
        let changes = session
            .communicate(&Request::Pull { since })?
            .into_changes()?;

        info!("Received {} changes from server since {}", changes.len(), since);

        let mut summary = PullSummary::default();
        for change in changes {
            self.check_cancelled()?;
            debug!(
                "Processing file update. SID: {}, type: {}",
                change.id, change.change
            );

            match change.change {
                ChangeType::New => {
                    if self.store.file_by_server_id(change.id).is_some() {
                        warn!(
                            "Server returned file {} which is already held, ignoring",
                            change.id
                        );
                        summary.skipped += 1;
                        continue;
                    }
                    let record = self.pull_new(session, change.id)?;
                    debug!("Successfully added file: {}", record.path.display());
                    summary.pulled += 1;
                }
                ChangeType::Delete => {
                    let Some(record) = self.store.file_by_server_id(change.id) else {
                        warn!(
                            "Server sent delete directive for unknown file {}, ignoring",
                            change.id
                        );
                        summary.skipped += 1;
                        continue;
                    };
                    self.library.remove(change.id, &record.path)?;
                    self.store.transaction(|txn| {
                        txn.remove_file_by_server_id(change.id);
                        Ok(())
                    })?;
                    debug!("Removed file: {}", record.path.display());
                    summary.deleted += 1;
                }
            }
        }

        self.stats.files_pulled += summary.pulled;
        self.stats.files_deleted += summary.deleted;
        self.stats.skipped += summary.skipped;

        info!("...finished pull process");
        Ok(summary)
    }

    /// Announces local additions and deletions to the server.
    ///
    /// Each new file is assigned an id, uploaded, and acknowledged before its
    /// id is committed. Each deletion tombstone is purged once the server has
    /// acknowledged it.
    ///
    /// # Errors
    ///
    /// Returns the first error; files already acknowledged stay committed.
    pub fn do_push<S: Read + Write>(&mut self, session: &mut Session<S>) -> SyncResult<PushSummary> {
        info!("Starting push process");
        self.state = SyncState::Pushing;

        let since = self.store.last_update();
        let new_files = self.store.unannounced_files();
        let deletions = self.store.deletions_since(since);

        info!(
            "Notifying server {} new files and {} old ones",
            new_files.len(),
            deletions.len()
        );

        let mut summary = PushSummary::default();
        for file in new_files {
            self.check_cancelled()?;

            let staged = session.communicate(&Request::PushNew)?.into_assigned()?;
            debug!("Server assigned id {} to {}", staged, file.path.display());

            push_file(session, &file.path, &file.hash)?;
            session.next_response()?;

            self.store
                .transaction(|txn| txn.set_server_id(file.local_id, staged))?;
            summary.pushed += 1;
        }

        for tombstone in deletions {
            self.check_cancelled()?;

            session.communicate(&Request::PushDelete {
                id: tombstone.server_id,
            })?;
            self.store.transaction(|txn| {
                txn.purge_deletion(tombstone.local_id);
                Ok(())
            })?;
            summary.deletions += 1;
        }

        self.stats.files_pushed += summary.pushed;
        self.stats.deletions_pushed += summary.deletions;

        info!("...finished push process");
        Ok(summary)
    }

    /// Fetches one file, verifies it, imports it, and records it.
    fn pull_new<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
        server_id: ServerId,
    ) -> SyncResult<FileRecord> {
        fs::create_dir_all(&self.config.temp_dir)?;
        let temp = self.config.temp_dir.join(format!("yasa-{server_id}.mp3"));
        // Leftover from an interrupted cycle, or a planted link.
        remove_temp(&temp);

        session.send_request(&Request::PullFile { id: server_id })?;
        let result = self.receive(session, server_id, &temp);
        if result.is_err() {
            remove_temp(&temp);
        }
        result
    }

    fn receive<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
        server_id: ServerId,
        temp: &Path,
    ) -> SyncResult<FileRecord> {
        let expected = pull_file(session, temp)?;
        let actual = ContentHash::of_file(temp)?;
        if actual != expected {
            return Err(SyncError::Integrity {
                server_id,
                expected,
                actual,
            });
        }
        let size = fs::metadata(temp)?.len();

        let resident: PathBuf = self.library.import(temp)?;
        let imported_copy = resident != temp;
        if imported_copy {
            remove_temp(temp);
        }

        let committed = self.store.transaction(|txn| {
            txn.insert_file(NewFile {
                path: resident.clone(),
                hash: actual,
                size,
                server_id: Some(server_id),
            })
        });
        let local_id = match committed {
            Ok(id) => id,
            Err(e) => {
                // The next cycle pulls this file again.
                if imported_copy {
                    if let Err(undo) = self.library.remove(server_id, &resident) {
                        warn!(
                            "Could not remove {} from the library: {}",
                            resident.display(),
                            undo
                        );
                    }
                }
                return Err(e.into());
            }
        };

        self.store
            .file(local_id)
            .ok_or(SyncError::Store(yasa_store::StoreError::UnknownFile(local_id)))
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Handles an error by updating state and stats.
    fn handle_error(&mut self, error: &SyncError) {
        warn!("Sync failed: {}", error);
        self.state = SyncState::Error;
        self.stats.last_error = Some(error.to_string());
    }
}

fn remove_temp(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!("Could not remove {}: {}", path.display(), e),
    }
}
