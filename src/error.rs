//! Per-item failures collected by organize, pull, undo and reap reports.
//!
//! Nothing in here aborts a batch. Whole-operation errors live next to the
//! operation that raises them (`OrganizeError`, `UndoError`, ...).

use crate::resolver::ResolveError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why a single file or directory was skipped.
#[derive(Debug, Error)]
pub enum FailureReason {
    /// No destination could be resolved for the file name.
    #[error("no rule matched: {0}")]
    Resolution(#[from] ResolveError),

    /// Every `name (n).ext` candidate up to the limit was taken.
    #[error("no free file name left after {attempts} attempts")]
    CollisionExhausted { attempts: u32 },

    #[error("access denied: {0}")]
    AccessDenied(io::Error),

    #[error("locked or in use: {0}")]
    Locked(io::Error),

    /// Something already sits at the path a file would be restored to.
    #[error("a file already exists at the original location")]
    UndoConflict,

    /// The file is no longer where the session left it.
    #[error("file no longer exists")]
    Missing,

    /// Neither the file's folder nor any root of its session can be reached,
    /// as with an unplugged disk or a renamed root folder.
    #[error("{} is unreachable", .0.display())]
    Unreachable(PathBuf),

    /// The file belongs to a category other than the selected one.
    #[error("not in category '{category}'")]
    NotInCategory { category: String },

    /// A directory still holds entries and was left in place.
    #[error("directory is not empty")]
    NotEmpty,

    #[error("{0}")]
    Io(io::Error),
}

impl FailureReason {
    /// Classifies an I/O error into the failure taxonomy.
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::AccessDenied(err),
            io::ErrorKind::ResourceBusy | io::ErrorKind::WouldBlock => Self::Locked(err),
            io::ErrorKind::NotFound => Self::Missing,
            _ => Self::Io(err),
        }
    }

    /// True for failures caused by the filesystem refusing an operation,
    /// as opposed to state that changed since the session was recorded.
    pub fn is_io_failure(&self) -> bool {
        matches!(
            self,
            Self::AccessDenied(_) | Self::Locked(_) | Self::Unreachable(_) | Self::Io(_)
        )
    }
}

/// A path paired with the reason it was skipped.
#[derive(Debug)]
pub struct ItemFailure {
    pub path: PathBuf,
    pub reason: FailureReason,
}

impl ItemFailure {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<FailureReason>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}
