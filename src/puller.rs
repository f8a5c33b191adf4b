//! Flattening: pulls every file out of a folder tree into one target folder.

use crate::config::CompiledFilters;
use crate::error::{FailureReason, ItemFailure};
use crate::file_organizer::{PlannedMove, path_exists, transfer, unique_destination};
use crate::preset::RulePreset;
use crate::session::{SessionBuilder, SessionId, SessionKind, SessionLog};
use indicatif::ProgressBar;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Folder created next to each root by [`PullTarget::Bin`].
pub const FILES_BIN: &str = "Files Bin";

/// Where pulled files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullTarget {
    /// One folder for all roots.
    Into(PathBuf),
    /// Each root flattens into itself.
    Here,
    /// Each root flattens into its parent.
    Above,
    /// Each root flattens into a `Files Bin` folder beside it.
    Bin,
}

impl PullTarget {
    /// Target folder for `root`, or `None` if the root has no parent to
    /// flatten into.
    pub fn dir_for(&self, root: &Path) -> Option<PathBuf> {
        match self {
            Self::Into(dir) => Some(dir.clone()),
            Self::Here => Some(root.to_path_buf()),
            Self::Above => root.parent().map(Path::to_path_buf),
            Self::Bin => root.parent().map(|parent| parent.join(FILES_BIN)),
        }
    }
}

impl fmt::Display for PullTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Into(dir) => write!(f, "into {}", dir.display()),
            Self::Here => f.write_str("here"),
            Self::Above => f.write_str("above"),
            Self::Bin => write!(f, "into '{}'", FILES_BIN),
        }
    }
}

/// Outcome of a pull.
#[derive(Debug, Default)]
pub struct PullReport {
    pub session_id: Option<SessionId>,
    pub moved: usize,
    pub skipped: Vec<ItemFailure>,
    /// Every folder files were pulled into.
    pub targets: BTreeSet<PathBuf>,
    pub cancelled: bool,
}

/// Outcome of a dry run.
#[derive(Debug, Default)]
pub struct PullPlan {
    /// `folder` holds the target directory.
    pub moves: Vec<PlannedMove>,
    pub skipped: Vec<ItemFailure>,
}

/// Everything found under the roots before any move.
#[derive(Debug, Default)]
struct Snapshot {
    roots: Vec<PathBuf>,
    targets: BTreeSet<PathBuf>,
    pending: Vec<PendingPull>,
    failures: Vec<ItemFailure>,
}

/// One file found under a root, with the folder it is headed for.
#[derive(Debug)]
struct PendingPull {
    file: PathBuf,
    target: PathBuf,
}

/// Moves every file below a set of roots into a target folder.
pub struct FilePuller<'a> {
    preset: &'a RulePreset,
    filters: &'a CompiledFilters,
    progress: Option<ProgressBar>,
    cancel: Option<Box<dyn Fn() -> bool + 'a>>,
}

impl<'a> FilePuller<'a> {
    pub fn new(preset: &'a RulePreset, filters: &'a CompiledFilters) -> Self {
        Self {
            preset,
            filters,
            progress: None,
            cancel: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Stop between files once `check` returns true.
    pub fn with_cancel_check(mut self, check: impl Fn() -> bool + 'a) -> Self {
        self.cancel = Some(Box::new(check));
        self
    }

    /// Pulls the files under `roots` and appends the batch to `log`.
    ///
    /// The whole tree is listed before anything moves, so files never get
    /// visited twice. Target folders lying inside a root are not descended
    /// into, and files already directly in their target stay put. Emptied
    /// subfolders are left for the reaper.
    pub fn pull(&self, roots: &[PathBuf], target: &PullTarget, log: &mut SessionLog) -> PullReport {
        let snapshot = self.snapshot(roots, target);
        let mut batch = SessionBuilder::new(SessionKind::Pull);
        for root in &snapshot.roots {
            batch.add_root(root);
        }
        let pending = snapshot.pending;
        let mut report = PullReport {
            skipped: snapshot.failures,
            targets: snapshot.targets,
            ..PullReport::default()
        };

        if let Some(pb) = &self.progress {
            pb.set_length(pending.len() as u64);
        }

        for item in &pending {
            if self.is_cancelled() {
                warn!("pull cancelled; keeping the moves completed so far");
                report.cancelled = true;
                break;
            }
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }

            match transfer(&mut batch, &item.file, &item.target, self.preset.compound_extensions()) {
                Ok(_) => report.moved += 1,
                Err(reason) => {
                    warn!(file = %item.file.display(), %reason, "could not pull file");
                    report.skipped.push(ItemFailure::new(&item.file, reason));
                }
            }
        }

        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }

        report.session_id = log.append(batch);
        info!(
            pull_target = %target,
            moved = report.moved,
            skipped = report.skipped.len(),
            session = ?report.session_id,
            "pull finished"
        );
        report
    }

    /// Computes what [`pull`](Self::pull) would do, without touching the
    /// filesystem.
    pub fn plan(&self, roots: &[PathBuf], target: &PullTarget) -> PullPlan {
        let snapshot = self.snapshot(roots, target);
        let mut plan = PullPlan {
            skipped: snapshot.failures,
            ..PullPlan::default()
        };
        let mut reserved: HashSet<PathBuf> = HashSet::new();

        for item in snapshot.pending {
            let Some(file_name) = item.file.file_name() else {
                continue;
            };
            match unique_destination(
                &item.target,
                file_name,
                self.preset.compound_extensions(),
                |candidate| reserved.contains(candidate) || path_exists(candidate),
            ) {
                Ok(destination) => {
                    reserved.insert(destination.clone());
                    plan.moves.push(PlannedMove {
                        folder: item.target.display().to_string(),
                        source: item.file,
                        destination,
                    });
                }
                Err(reason) => plan.skipped.push(ItemFailure::new(item.file, reason)),
            }
        }

        plan
    }

    /// Lists every file to move, before the first move happens.
    fn snapshot(&self, roots: &[PathBuf], target: &PullTarget) -> Snapshot {
        let mut snapshot = Snapshot::default();
        let mut resolved: Vec<(PathBuf, PathBuf)> = Vec::new();
        for root in roots {
            let root = match std::path::absolute(root) {
                Ok(root) => root,
                Err(e) => {
                    snapshot.failures.push(ItemFailure::new(root, FailureReason::from_io(e)));
                    continue;
                }
            };
            if !root.is_dir() {
                let reason = if root.exists() {
                    FailureReason::Io(io::Error::new(io::ErrorKind::NotADirectory, "not a directory"))
                } else {
                    FailureReason::Missing
                };
                snapshot.failures.push(ItemFailure::new(&root, reason));
                continue;
            }
            let Some(dir) = target.dir_for(&root) else {
                snapshot.failures.push(ItemFailure::new(
                    &root,
                    FailureReason::Io(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "folder has no parent to pull into",
                    )),
                ));
                continue;
            };
            let dir = std::path::absolute(&dir).unwrap_or(dir);
            snapshot.roots.push(root.clone());
            snapshot.targets.insert(dir.clone());
            resolved.push((root, dir));
        }

        let excluded: HashSet<&Path> = resolved.iter().map(|(_, dir)| dir.as_path()).collect();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        for (root, dir) in &resolved {
            let walker = WalkDir::new(root)
                .follow_links(false)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| !(entry.file_type().is_dir() && excluded.contains(entry.path())));

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                        let reason = match err.into_io_error() {
                            Some(io_err) => FailureReason::from_io(io_err),
                            None => FailureReason::Io(io::Error::other("filesystem loop")),
                        };
                        warn!(path = %path.display(), %reason, "could not list folder");
                        snapshot.failures.push(ItemFailure::new(path, reason));
                        continue;
                    }
                };

                if !entry.file_type().is_file() {
                    continue;
                }
                let file = entry.into_path();
                if file.parent() == Some(dir.as_path()) {
                    continue;
                }
                if !self.filters.should_include(&file) {
                    debug!(file = %file.display(), "excluded by filters");
                    continue;
                }
                if seen.insert(file.clone()) {
                    snapshot.pending.push(PendingPull {
                        file,
                        target: dir.clone(),
                    });
                }
            }
        }

        snapshot
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|check| check())
    }
}
