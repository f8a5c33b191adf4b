//! Removal of empty directory trees.

use crate::error::{FailureReason, ItemFailure};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ReapError {
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Cannot read {}: {source}", .path.display())]
    Unreadable { path: PathBuf, source: io::Error },
}

/// Outcome of a reap.
#[derive(Debug, Default)]
pub struct ReapReport {
    /// Removed directories, children before parents.
    pub removed: Vec<PathBuf>,
    /// Directories that could not be listed or deleted.
    pub skipped: Vec<ItemFailure>,
    /// Directories kept only because a skipped directory sits inside them.
    pub blocked: Vec<PathBuf>,
}

/// State of a directory after its children were handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Empty,
    Occupied,
    /// Nothing but skipped directories left inside.
    Blocked,
    /// Could not be listed at all.
    Skipped,
}

/// Deletes every empty directory below a root, bottom-up.
pub struct EmptyDirReaper;

type RemoveDir<'a> = &'a dyn Fn(&Path) -> io::Result<()>;

impl EmptyDirReaper {
    /// Removes all empty directories under `root` in a single pass.
    ///
    /// A directory whose children all got removed becomes empty and is
    /// removed in the same pass. The root itself is always kept. Symlinks
    /// count as entries and are never followed.
    ///
    /// # Errors
    ///
    /// Fails only if `root` is not a readable directory. Problems further
    /// down are reported in [`ReapReport::skipped`].
    pub fn reap(root: &Path) -> Result<ReapReport, ReapError> {
        Self::reap_with(root, &|dir: &Path| fs::remove_dir(dir))
    }

    fn reap_with(root: &Path, remove_dir: RemoveDir<'_>) -> Result<ReapReport, ReapError> {
        let metadata = fs::symlink_metadata(root).map_err(|source| ReapError::Unreadable {
            path: root.to_path_buf(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(ReapError::NotADirectory(root.to_path_buf()));
        }
        fs::read_dir(root).map_err(|source| ReapError::Unreadable {
            path: root.to_path_buf(),
            source,
        })?;

        let mut report = ReapReport::default();
        Self::visit(root, remove_dir, &mut report);

        info!(
            root = %root.display(),
            removed = report.removed.len(),
            skipped = report.skipped.len(),
            "reap finished"
        );
        Ok(report)
    }

    fn visit(dir: &Path, remove_dir: RemoveDir<'_>, report: &mut ReapReport) -> Visit {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(directory = %dir.display(), error = %e, "cannot list directory");
                report.skipped.push(ItemFailure::new(dir, FailureReason::from_io(e)));
                return Visit::Skipped;
            }
        };

        let mut occupied = false;
        let mut blocked = false;
        let mut subdirs = Vec::new();

        for entry in entries {
            match entry {
                // `DirEntry::file_type` does not follow symlinks.
                Ok(entry) => match entry.file_type() {
                    Ok(ft) if ft.is_dir() => subdirs.push(entry.path()),
                    _ => occupied = true,
                },
                Err(e) => {
                    report.skipped.push(ItemFailure::new(dir, FailureReason::from_io(e)));
                    blocked = true;
                }
            }
        }
        subdirs.sort();

        for child in subdirs {
            match Self::visit(&child, remove_dir, report) {
                Visit::Empty => match remove_dir(&child) {
                    Ok(()) => {
                        debug!(directory = %child.display(), "removed empty directory");
                        report.removed.push(child);
                    }
                    Err(e) => {
                        let reason = if e.kind() == io::ErrorKind::DirectoryNotEmpty {
                            FailureReason::NotEmpty
                        } else {
                            FailureReason::from_io(e)
                        };
                        warn!(directory = %child.display(), %reason, "cannot remove directory");
                        report.skipped.push(ItemFailure::new(child, reason));
                        blocked = true;
                    }
                },
                Visit::Occupied => occupied = true,
                Visit::Blocked => {
                    report.blocked.push(child);
                    blocked = true;
                }
                Visit::Skipped => blocked = true,
            }
        }

        if occupied {
            Visit::Occupied
        } else if blocked {
            Visit::Blocked
        } else {
            Visit::Empty
        }
    }
}
