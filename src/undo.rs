//! Undo of recorded sessions.
//!
//! Undo works on the [`SessionLog`] as a stack: the most recent session is
//! reversed first, its moves in reverse order, and then the directories it
//! created are removed if they are empty again.

use crate::error::{FailureReason, ItemFailure};
use crate::file_organizer::{move_file, path_occupied};
use crate::session::{MoveRecord, Session, SessionId, SessionKind, SessionLog};
use std::cmp::Reverse;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Conditions that stop an undo as a whole.
#[derive(Debug, Error)]
pub enum UndoError {
    #[error("Nothing to undo")]
    NothingToUndo,

    #[error(
        "Undo of session {session_id} made no progress ({} files could not be restored); the session was kept",
        .failures.len()
    )]
    Halted {
        session_id: SessionId,
        failures: Vec<ItemFailure>,
    },
}

pub type UndoResult<T> = Result<T, UndoError>;

/// What undoing one session did.
#[derive(Debug)]
pub struct UndoReport {
    pub session_id: SessionId,
    pub kind: SessionKind,
    /// Number of files moved back.
    pub restored: usize,
    /// Records that could not be reversed, keyed by their current location.
    pub skipped: Vec<ItemFailure>,
    pub removed_directories: Vec<PathBuf>,
    /// Created directories left in place because something is still in them.
    pub kept_directories: Vec<PathBuf>,
}

impl UndoReport {
    fn new(session: &Session) -> Self {
        Self {
            session_id: session.id(),
            kind: session.kind(),
            restored: 0,
            skipped: Vec::new(),
            removed_directories: Vec::new(),
            kept_directories: Vec::new(),
        }
    }

    /// True if every record was reversed.
    pub fn is_complete_success(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// What undoing the whole log did.
#[derive(Debug, Default)]
pub struct UndoAllReport {
    /// Most recent session first.
    pub sessions: Vec<UndoReport>,
    /// Set when a session could not be undone; it and everything older stay
    /// on the log.
    pub halted: Option<UndoError>,
}

impl UndoAllReport {
    pub fn restored(&self) -> usize {
        self.sessions.iter().map(|s| s.restored).sum()
    }

    pub fn skipped(&self) -> usize {
        self.sessions.iter().map(|s| s.skipped.len()).sum()
    }
}

/// Reverses sessions recorded in a [`SessionLog`].
pub struct UndoManager;

impl UndoManager {
    /// Undoes the most recent session and pops it from `log`.
    ///
    /// A record whose file is gone, or whose original location is occupied
    /// again, is skipped and reported; the rest of the session is still
    /// reversed and the session is popped.
    ///
    /// # Errors
    ///
    /// * [`UndoError::NothingToUndo`] if the log is empty.
    /// * [`UndoError::Halted`] if not a single record could be reversed and
    ///   every failure was an I/O failure (denied access, locked file,
    ///   unreachable volume). The session then stays on the log so it can be
    ///   retried once the cause is fixed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sortout::session::{JsonFileStore, SessionStore};
    /// use sortout::undo::UndoManager;
    ///
    /// let mut store = JsonFileStore::new("/tmp/sessions.json");
    /// let mut log = store.load()?;
    /// let report = UndoManager::undo_once(&mut log)?;
    /// println!("Restored {} files", report.restored);
    /// store.save(&log)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn undo_once(log: &mut SessionLog) -> UndoResult<UndoReport> {
        let session = log.last().ok_or(UndoError::NothingToUndo)?;
        let mut report = UndoReport::new(session);
        let roots_reachable = session
            .root_folders()
            .iter()
            .any(|root| matches!(path_occupied(root), Ok(true)));

        // LIFO within the session too.
        for record in session.records().iter().rev() {
            match Self::restore_file(record, roots_reachable) {
                Ok(()) => {
                    debug!(
                        from = %record.destination().display(),
                        to = %record.source().display(),
                        "restored file"
                    );
                    report.restored += 1;
                }
                Err(reason) => {
                    warn!(file = %record.destination().display(), %reason, "could not restore file");
                    report.skipped.push(ItemFailure::new(record.destination(), reason));
                }
            }
        }

        if report.restored == 0
            && !report.skipped.is_empty()
            && report.skipped.iter().all(|f| f.reason.is_io_failure())
        {
            return Err(UndoError::Halted {
                session_id: report.session_id,
                failures: report.skipped,
            });
        }

        Self::remove_created_directories(session, &mut report);

        log.pop();
        info!(
            session = report.session_id,
            restored = report.restored,
            skipped = report.skipped.len(),
            "undo finished"
        );
        Ok(report)
    }

    /// Undoes sessions until the log is empty or one of them halts.
    pub fn undo_all(log: &mut SessionLog) -> UndoAllReport {
        let mut report = UndoAllReport::default();
        loop {
            match Self::undo_once(log) {
                Ok(session) => report.sessions.push(session),
                Err(UndoError::NothingToUndo) => break,
                Err(halted) => {
                    warn!(error = %halted, "undo-all stopped");
                    report.halted = Some(halted);
                    break;
                }
            }
        }
        report
    }

    /// Moves one file back to where it came from.
    fn restore_file(record: &MoveRecord, roots_reachable: bool) -> Result<(), FailureReason> {
        if !path_occupied(record.destination()).map_err(FailureReason::from_io)? {
            return Err(Self::missing_reason(record, roots_reachable));
        }
        if path_occupied(record.source()).map_err(FailureReason::from_io)? {
            return Err(FailureReason::UndoConflict);
        }

        if let Some(parent) = record.source().parent() {
            fs::create_dir_all(parent).map_err(FailureReason::from_io)?;
        }
        move_file(record.destination(), record.source()).map_err(FailureReason::from_io)
    }

    /// A file is merely gone if its folder is still there or the session's
    /// roots are. With both gone the volume itself is treated as unreachable.
    fn missing_reason(record: &MoveRecord, roots_reachable: bool) -> FailureReason {
        match record.destination().parent() {
            Some(dir) if !roots_reachable && !matches!(path_occupied(dir), Ok(true)) => {
                FailureReason::Unreachable(dir.to_path_buf())
            }
            _ => FailureReason::Missing,
        }
    }

    /// Removes the session's created directories that are empty, deepest
    /// first so a parent can go once its children are gone.
    fn remove_created_directories(session: &Session, report: &mut UndoReport) {
        let mut dirs: Vec<&PathBuf> = session.created_directories().iter().collect();
        dirs.sort_by_key(|dir| Reverse(dir.components().count()));

        for dir in dirs {
            let is_dir = fs::symlink_metadata(dir).is_ok_and(|m| m.is_dir());
            if !is_dir {
                continue;
            }
            match fs::remove_dir(dir) {
                Ok(()) => {
                    debug!(directory = %dir.display(), "removed created directory");
                    report.removed_directories.push(dir.clone());
                }
                Err(e) => {
                    debug!(directory = %dir.display(), error = %e, "keeping created directory");
                    report.kept_directories.push(dir.clone());
                }
            }
        }
    }
}
