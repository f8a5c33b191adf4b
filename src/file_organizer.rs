//! Move engine: sorts files into folders next to them and records every move.
//!
//! Each file goes to `<its parent>/<resolved folder>/`. Destination folders
//! that did not exist are created and remembered, colliding names get a
//! `name (n).ext` suffix, and every completed move lands in the batch's
//! [`SessionBuilder`]. A file that cannot be resolved or moved is reported
//! and skipped; it never stops the rest of the batch.

use crate::config::CompiledFilters;
use crate::error::{FailureReason, ItemFailure};
use crate::preset::RulePreset;
use crate::resolver::{self, ResolutionMode, split_extension};
use crate::session::{SessionBuilder, SessionId, SessionKind, SessionLog};
use indicatif::ProgressBar;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Highest `(n)` tried before giving up on a name.
pub const MAX_DISAMBIGUATOR: u32 = 9999;

const BUSY_RETRY_DELAY: Duration = Duration::from_millis(250);

#[cfg(windows)]
const CROSS_DEVICE_ERROR: i32 = 17; // ERROR_NOT_SAME_DEVICE
#[cfg(not(windows))]
const CROSS_DEVICE_ERROR: i32 = 18; // EXDEV

/// Conditions that make a whole organize run meaningless.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("Organizing by {mode} needs a default bucket, but none is configured")]
    MissingDefaultBucket { mode: ResolutionMode },

    #[error("Unknown category '{0}'")]
    UnknownCategory(String),
}

pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// How an organize run picks destinations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizeOptions {
    pub mode: ResolutionMode,
    /// Only move files of this category; others are reported as skipped.
    pub only_category: Option<String>,
}

impl OrganizeOptions {
    pub fn new(mode: ResolutionMode) -> Self {
        Self {
            mode,
            only_category: None,
        }
    }

    pub fn only_category(mut self, id: impl Into<String>) -> Self {
        self.only_category = Some(id.into());
        self
    }
}

/// Outcome of an organize run.
#[derive(Debug, Default)]
pub struct OrganizeReport {
    /// Id of the sealed session, `None` when nothing was moved.
    pub session_id: Option<SessionId>,
    pub moved: usize,
    /// Files moved per destination folder name.
    pub folder_counts: BTreeMap<String, usize>,
    pub created_directories: usize,
    pub skipped: Vec<ItemFailure>,
    /// True if the run stopped early on request.
    pub cancelled: bool,
}

/// A move a dry run would perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub folder: String,
}

/// Outcome of a dry run.
#[derive(Debug, Default)]
pub struct OrganizePlan {
    pub moves: Vec<PlannedMove>,
    pub skipped: Vec<ItemFailure>,
}

impl OrganizePlan {
    pub fn folder_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for planned in &self.moves {
            *counts.entry(planned.folder.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Files gathered from the caller's paths.
#[derive(Debug, Default)]
struct CollectedInputs {
    files: Vec<PathBuf>,
    roots: BTreeSet<PathBuf>,
    failures: Vec<ItemFailure>,
}

/// Sorts files into destination folders according to a preset.
pub struct FileOrganizer<'a> {
    preset: &'a RulePreset,
    filters: &'a CompiledFilters,
    progress: Option<ProgressBar>,
    cancel: Option<Box<dyn Fn() -> bool + 'a>>,
}

impl<'a> FileOrganizer<'a> {
    pub fn new(preset: &'a RulePreset, filters: &'a CompiledFilters) -> Self {
        Self {
            preset,
            filters,
            progress: None,
            cancel: None,
        }
    }

    /// Advance `progress` once per file.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Stop between files once `check` returns true.
    ///
    /// `check` runs before every file, so a shared `AtomicBool` set from a
    /// signal handler works as well as a counter.
    pub fn with_cancel_check(mut self, check: impl Fn() -> bool + 'a) -> Self {
        self.cancel = Some(Box::new(check));
        self
    }

    /// Moves every file found in `inputs` and appends the batch to `log`.
    ///
    /// `inputs` may name files or directories; a directory contributes its
    /// top-level files. Every directory given, and the parent of every file
    /// given, is recorded as a root folder of the session.
    ///
    /// # Errors
    ///
    /// Fails before touching anything if the mode needs a default bucket the
    /// preset lacks, or if the selected category does not exist. Per-file
    /// problems end up in [`OrganizeReport::skipped`] instead.
    pub fn organize(
        &self,
        inputs: &[PathBuf],
        options: &OrganizeOptions,
        log: &mut SessionLog,
    ) -> OrganizeResult<OrganizeReport> {
        self.validate(options)?;
        let collected = self.collect_inputs(inputs);

        let mut batch = SessionBuilder::new(SessionKind::Organize {
            mode: options.mode,
        });
        for root in &collected.roots {
            batch.add_root(root);
        }

        let mut report = OrganizeReport {
            skipped: collected.failures,
            ..OrganizeReport::default()
        };

        if let Some(pb) = &self.progress {
            pb.set_length(collected.files.len() as u64);
        }

        for file in &collected.files {
            if self.is_cancelled() {
                warn!("organize cancelled; keeping the moves completed so far");
                report.cancelled = true;
                break;
            }
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }

            let folder = match self.resolve_folder(file, options) {
                Ok(folder) => folder,
                Err(reason) => {
                    warn!(file = %file.display(), %reason, "skipping file");
                    report.skipped.push(ItemFailure::new(file, reason));
                    continue;
                }
            };

            let dest_dir = destination_dir(file, &folder);
            match transfer(&mut batch, file, &dest_dir, self.preset.compound_extensions()) {
                Ok(_) => {
                    report.moved += 1;
                    *report.folder_counts.entry(folder).or_insert(0) += 1;
                }
                Err(reason) => {
                    warn!(file = %file.display(), %reason, "could not move file");
                    report.skipped.push(ItemFailure::new(file, reason));
                }
            }
        }

        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }

        report.created_directories = batch.created_directory_count();
        report.session_id = log.append(batch);
        info!(
            mode = %options.mode,
            moved = report.moved,
            skipped = report.skipped.len(),
            session = ?report.session_id,
            "organize finished"
        );
        Ok(report)
    }

    /// Computes what [`organize`](Self::organize) would do, without touching
    /// the filesystem.
    pub fn plan(&self, inputs: &[PathBuf], options: &OrganizeOptions) -> OrganizeResult<OrganizePlan> {
        self.validate(options)?;
        let collected = self.collect_inputs(inputs);

        let mut plan = OrganizePlan {
            skipped: collected.failures,
            ..OrganizePlan::default()
        };
        let mut reserved: HashSet<PathBuf> = HashSet::new();

        for file in &collected.files {
            let folder = match self.resolve_folder(file, options) {
                Ok(folder) => folder,
                Err(reason) => {
                    plan.skipped.push(ItemFailure::new(file, reason));
                    continue;
                }
            };
            let dest_dir = destination_dir(file, &folder);
            let Some(file_name) = file.file_name() else {
                continue;
            };
            match unique_destination(
                &dest_dir,
                file_name,
                self.preset.compound_extensions(),
                |candidate| reserved.contains(candidate) || path_exists(candidate),
            ) {
                Ok(destination) => {
                    reserved.insert(destination.clone());
                    plan.moves.push(PlannedMove {
                        source: file.clone(),
                        destination,
                        folder,
                    });
                }
                Err(reason) => plan.skipped.push(ItemFailure::new(file, reason)),
            }
        }

        Ok(plan)
    }

    fn validate(&self, options: &OrganizeOptions) -> OrganizeResult<()> {
        if options.mode.uses_default_bucket() && self.preset.default_bucket().is_none() {
            return Err(OrganizeError::MissingDefaultBucket { mode: options.mode });
        }
        if let Some(id) = &options.only_category
            && self.preset.category_folder(id).is_none()
        {
            return Err(OrganizeError::UnknownCategory(id.clone()));
        }
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|check| check())
    }

    fn resolve_folder(&self, file: &Path, options: &OrganizeOptions) -> Result<String, FailureReason> {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if let Some(only) = &options.only_category
            && resolver::category_of(&name, self.preset) != Some(only.as_str())
        {
            return Err(FailureReason::NotInCategory {
                category: only.clone(),
            });
        }

        match resolver::resolve(&name, options.mode, self.preset) {
            Ok(folder) => Ok(folder),
            Err(err) if options.mode == ResolutionMode::BySource => self
                .preset
                .source()
                .fallback()
                .map(str::to_string)
                .ok_or(FailureReason::Resolution(err)),
            Err(err) => Err(err.into()),
        }
    }

    /// Expands directories to their top-level files and applies the filters.
    fn collect_inputs(&self, inputs: &[PathBuf]) -> CollectedInputs {
        let mut collected = CollectedInputs::default();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        for input in inputs {
            let path = match std::path::absolute(input) {
                Ok(path) => path,
                Err(e) => {
                    collected.failures.push(ItemFailure::new(input, FailureReason::from_io(e)));
                    continue;
                }
            };

            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    collected.failures.push(ItemFailure::new(&path, FailureReason::from_io(e)));
                    continue;
                }
            };

            if metadata.is_dir() {
                let entries = match fs::read_dir(&path) {
                    Ok(entries) => entries,
                    Err(e) => {
                        collected.failures.push(ItemFailure::new(&path, FailureReason::from_io(e)));
                        continue;
                    }
                };
                collected.roots.insert(path.clone());

                let mut files: Vec<PathBuf> = entries
                    .flatten()
                    .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_file()))
                    .map(|entry| entry.path())
                    .filter(|file| self.filters.should_include(file))
                    .collect();
                files.sort();
                for file in files {
                    if seen.insert(file.clone()) {
                        collected.files.push(file);
                    }
                }
            } else if metadata.is_file() {
                if !self.filters.should_include(&path) {
                    debug!(file = %path.display(), "excluded by filters");
                    continue;
                }
                if let Some(parent) = path.parent() {
                    collected.roots.insert(parent.to_path_buf());
                }
                if seen.insert(path.clone()) {
                    collected.files.push(path);
                }
            } else {
                collected.failures.push(ItemFailure::new(
                    &path,
                    FailureReason::Io(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "not a regular file or directory",
                    )),
                ));
            }
        }

        collected
    }
}

fn destination_dir(file: &Path, folder: &str) -> PathBuf {
    file.parent().unwrap_or(Path::new("")).join(folder)
}

/// Whether anything (including a dangling symlink) occupies `path`.
///
/// `NotFound` means free; any other error is passed on.
pub(crate) fn path_occupied(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// True unless `path` is known to be free. A path that cannot be checked
/// counts as taken.
pub(crate) fn path_exists(path: &Path) -> bool {
    path_occupied(path).unwrap_or(true)
}

/// Moves `source` into `dest_dir` under a free name and records the move.
///
/// Missing directories on the way to `dest_dir` are created and recorded.
pub(crate) fn transfer(
    batch: &mut SessionBuilder,
    source: &Path,
    dest_dir: &Path,
    compound: &[String],
) -> Result<PathBuf, FailureReason> {
    let file_name = source.file_name().ok_or_else(|| {
        FailureReason::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path has no file name",
        ))
    })?;

    ensure_directory(dest_dir, batch)?;

    let destination = unique_destination(dest_dir, file_name, compound, |candidate| {
        batch.has_destination(candidate) || path_exists(candidate)
    })?;

    move_file(source, &destination).map_err(FailureReason::from_io)?;
    debug!(
        source = %source.display(),
        destination = %destination.display(),
        "moved file"
    );

    batch.record_move(source.to_path_buf(), destination.clone());
    Ok(destination)
}

/// Creates `dir` if needed, recording every level this call created.
fn ensure_directory(dir: &Path, batch: &mut SessionBuilder) -> Result<(), FailureReason> {
    match fs::metadata(dir) {
        Ok(metadata) if metadata.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(FailureReason::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a directory", dir.display()),
            )));
        }
        Err(_) => {}
    }

    let missing: Vec<PathBuf> = dir
        .ancestors()
        .take_while(|ancestor| !ancestor.as_os_str().is_empty() && !path_exists(ancestor))
        .map(Path::to_path_buf)
        .collect();

    let result = fs::create_dir_all(dir);
    for created in missing.into_iter().filter(|d| d.is_dir()) {
        debug!(directory = %created.display(), "created directory");
        batch.record_created_directory(created);
    }
    result.map_err(FailureReason::from_io)
}

/// First free path for `file_name` inside `dir`: the name itself, then
/// `stem (2).ext`, `stem (3).ext`, ... up to [`MAX_DISAMBIGUATOR`].
pub fn unique_destination(
    dir: &Path,
    file_name: &OsStr,
    compound: &[String],
    taken: impl Fn(&Path) -> bool,
) -> Result<PathBuf, FailureReason> {
    let candidate = dir.join(file_name);
    if !taken(&candidate) {
        return Ok(candidate);
    }

    let name = file_name.to_string_lossy();
    let (stem, ext) = split_extension(&name, compound);
    for n in 2..=MAX_DISAMBIGUATOR {
        let candidate = dir.join(format!("{} ({}){}", stem, n, ext));
        if !taken(&candidate) {
            return Ok(candidate);
        }
    }

    Err(FailureReason::CollisionExhausted {
        attempts: MAX_DISAMBIGUATOR - 1,
    })
}

/// Moves one file as a single logical step.
///
/// Uses a rename; across devices it copies and then removes the source,
/// deleting the copy again if the source cannot be removed. A busy file
/// gets one retry.
pub(crate) fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    match rename_with_retry(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_ERROR) => {
            debug!(source = %source.display(), "rename crosses devices, copying instead");
            copy_then_remove(source, destination)
        }
        Err(e) => Err(e),
    }
}

fn rename_with_retry(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Err(e) if e.kind() == io::ErrorKind::ResourceBusy => {
            debug!(source = %source.display(), "file busy, retrying once");
            thread::sleep(BUSY_RETRY_DELAY);
            fs::rename(source, destination)
        }
        other => other,
    }
}

fn copy_then_remove(source: &Path, destination: &Path) -> io::Result<()> {
    if let Err(e) = fs::copy(source, destination) {
        let _ = fs::remove_file(destination);
        return Err(e);
    }
    if let Err(e) = fs::remove_file(source) {
        let _ = fs::remove_file(destination);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::PresetTables;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn organize_dir(dir: &Path, options: &OrganizeOptions, log: &mut SessionLog) -> OrganizeReport {
        let preset = RulePreset::builtin();
        let filters = CompiledFilters::default();
        FileOrganizer::new(&preset, &filters)
            .organize(&[dir.to_path_buf()], options, log)
            .expect("organize failed")
    }

    #[test]
    fn test_unique_destination_picks_smallest_free_suffix() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        fs::write(dir.join("photo.jpg"), "1").unwrap();
        fs::write(dir.join("photo (2).jpg"), "2").unwrap();
        fs::write(dir.join("photo (4).jpg"), "4").unwrap();

        let chosen = unique_destination(dir, OsStr::new("photo.jpg"), &[], |p| path_exists(p)).unwrap();
        assert_eq!(chosen, dir.join("photo (3).jpg"));
    }

    #[test]
    fn test_unique_destination_keeps_compound_extension() {
        let dir = Path::new("/virtual");
        let compound = vec!["tar.gz".to_string()];
        let chosen = unique_destination(dir, OsStr::new("backup.tar.gz"), &compound, |p| {
            p == Path::new("/virtual/backup.tar.gz")
        })
        .unwrap();
        assert_eq!(chosen, dir.join("backup (2).tar.gz"));
    }

    #[test]
    fn test_unique_destination_exhausted() {
        let result = unique_destination(Path::new("/virtual"), OsStr::new("a.txt"), &[], |_| true);
        assert!(matches!(
            result,
            Err(FailureReason::CollisionExhausted { .. })
        ));
    }

    #[test]
    fn test_transfer_records_only_new_directories() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::create_dir(base.join("Images")).unwrap();
        fs::write(base.join("a.png"), "a").unwrap();
        fs::write(base.join("b.pdf"), "b").unwrap();

        let mut batch = SessionBuilder::new(SessionKind::Pull);
        transfer(&mut batch, &base.join("a.png"), &base.join("Images"), &[]).unwrap();
        transfer(&mut batch, &base.join("b.pdf"), &base.join("Docs").join("2024"), &[]).unwrap();

        let mut log = SessionLog::new();
        log.append(batch);
        let created = log.last().unwrap().created_directories();
        assert!(!created.contains(&base.join("Images")));
        assert!(created.contains(&base.join("Docs")));
        assert!(created.contains(&base.join("Docs").join("2024")));
        assert!(base.join("Docs/2024/b.pdf").exists());
    }

    #[test]
    fn test_move_file_moves_content() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("source.txt");
        let destination = temp_dir.path().join("destination.txt");
        fs::write(&source, "payload").unwrap();

        move_file(&source, &destination).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&destination).unwrap(), "payload");
    }

    #[test]
    fn test_copy_fallback_round_trip_keeps_bytes() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("raw.bin");
        let destination = temp_dir.path().join("moved.bin");
        let payload: Vec<u8> = (0..=255u8).rev().chain([0, 0, 0x0a, 0x0d]).collect();
        fs::write(&source, &payload).unwrap();

        copy_then_remove(&source, &destination).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(&destination).unwrap(), payload);

        move_file(&destination, &source).unwrap();
        assert!(!destination.exists());
        assert_eq!(fs::read(&source).unwrap(), payload);
    }

    #[test]
    fn test_copy_fallback_leaves_source_when_copy_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("raw.bin");
        fs::write(&source, "payload").unwrap();

        let result = copy_then_remove(&source, &temp_dir.path().join("missing/raw.bin"));

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&source).unwrap(), "payload");
    }

    #[test]
    fn test_organize_by_type_creates_folders() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::write(base.join("photo.jpg"), "img").unwrap();
        fs::write(base.join("notes.txt"), "txt").unwrap();
        fs::write(base.join("mystery.qqq"), "???").unwrap();

        let mut log = SessionLog::new();
        let report = organize_dir(base, &OrganizeOptions::new(ResolutionMode::ByType), &mut log);

        assert_eq!(report.moved, 3);
        assert!(report.skipped.is_empty());
        assert!(base.join("Images/photo.jpg").exists());
        assert!(base.join("Documents/notes.txt").exists());
        assert!(base.join("Other Files/mystery.qqq").exists());
        assert_eq!(report.session_id, Some(1));
        assert_eq!(report.created_directories, 3);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_organize_never_overwrites() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::create_dir(base.join("Images")).unwrap();
        fs::write(base.join("Images/photo.jpg"), "old").unwrap();
        fs::write(base.join("photo.jpg"), "new").unwrap();

        let mut log = SessionLog::new();
        organize_dir(base, &OrganizeOptions::new(ResolutionMode::ByType), &mut log);

        assert_eq!(fs::read_to_string(base.join("Images/photo.jpg")).unwrap(), "old");
        assert_eq!(fs::read_to_string(base.join("Images/photo (2).jpg")).unwrap(), "new");
        assert!(log.last().unwrap().created_directories().is_empty());
    }

    #[test]
    fn test_organize_by_source_skips_unresolved() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::write(base.join("www.flickr.com_sunset.jpg"), "a").unwrap();
        fs::write(base.join("randomfile_no_url.png"), "b").unwrap();

        let mut log = SessionLog::new();
        let report = organize_dir(base, &OrganizeOptions::new(ResolutionMode::BySource), &mut log);

        assert_eq!(report.moved, 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(
            report.skipped[0].reason,
            FailureReason::Resolution(_)
        ));
        assert!(base.join("Flickr/www.flickr.com_sunset.jpg").exists());
        assert!(base.join("randomfile_no_url.png").exists());
    }

    #[test]
    fn test_organize_by_source_uses_fallback_bucket() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::write(base.join("randomfile_no_url.png"), "b").unwrap();

        let mut tables = PresetTables::default();
        tables.source.fallback = Some("Unknown Sources".to_string());
        let preset = tables.compile().unwrap();
        let filters = CompiledFilters::default();

        let mut log = SessionLog::new();
        let report = FileOrganizer::new(&preset, &filters)
            .organize(
                &[base.to_path_buf()],
                &OrganizeOptions::new(ResolutionMode::BySource),
                &mut log,
            )
            .unwrap();

        assert_eq!(report.moved, 1);
        assert!(base.join("Unknown Sources/randomfile_no_url.png").exists());
    }

    #[test]
    fn test_organize_single_category() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::write(base.join("clip.mp4"), "v").unwrap();
        fs::write(base.join("paper.pdf"), "d").unwrap();

        let mut log = SessionLog::new();
        let options = OrganizeOptions::new(ResolutionMode::ByCategory).only_category("media");
        let report = organize_dir(base, &options, &mut log);

        assert_eq!(report.moved, 1);
        assert!(base.join("Media/clip.mp4").exists());
        assert!(base.join("paper.pdf").exists());
        assert!(matches!(
            report.skipped[0].reason,
            FailureReason::NotInCategory { .. }
        ));
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let preset = RulePreset::builtin();
        let filters = CompiledFilters::default();
        let options = OrganizeOptions::new(ResolutionMode::ByCategory).only_category("nope");
        let result = FileOrganizer::new(&preset, &filters).organize(&[], &options, &mut SessionLog::new());
        assert!(matches!(result, Err(OrganizeError::UnknownCategory(_))));
    }

    #[test]
    fn test_missing_default_bucket_fails_before_moving() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::write(base.join("photo.jpg"), "img").unwrap();

        let preset = PresetTables {
            default_bucket: String::new(),
            ..PresetTables::default()
        }
        .compile()
        .unwrap();
        let filters = CompiledFilters::default();

        let mut log = SessionLog::new();
        let result = FileOrganizer::new(&preset, &filters).organize(
            &[base.to_path_buf()],
            &OrganizeOptions::new(ResolutionMode::ByType),
            &mut log,
        );

        assert!(matches!(
            result,
            Err(OrganizeError::MissingDefaultBucket { .. })
        ));
        assert!(base.join("photo.jpg").exists());
        assert!(log.is_empty());
    }

    #[test]
    fn test_cancel_before_start_moves_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::write(base.join("a.txt"), "a").unwrap();
        fs::write(base.join("b.txt"), "b").unwrap();

        let preset = RulePreset::builtin();
        let filters = CompiledFilters::default();

        let mut log = SessionLog::new();
        let report = FileOrganizer::new(&preset, &filters)
            .with_cancel_check(|| true)
            .organize(
                &[base.to_path_buf()],
                &OrganizeOptions::new(ResolutionMode::ByType),
                &mut log,
            )
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.moved, 0);
        assert_eq!(report.session_id, None);
        assert!(base.join("a.txt").exists());
    }

    #[test]
    fn test_cancel_mid_batch_keeps_completed_moves_only() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::write(base.join("a.txt"), "a").unwrap();
        fs::write(base.join("b.jpg"), "b").unwrap();
        fs::write(base.join("c.mp4"), "c").unwrap();

        let preset = RulePreset::builtin();
        let filters = CompiledFilters::default();
        // Cancel once the first file is done.
        let checks = Cell::new(0);

        let mut log = SessionLog::new();
        let report = FileOrganizer::new(&preset, &filters)
            .with_cancel_check(|| {
                checks.set(checks.get() + 1);
                checks.get() > 1
            })
            .organize(
                &[base.to_path_buf()],
                &OrganizeOptions::new(ResolutionMode::ByType),
                &mut log,
            )
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.moved, 1);
        assert_eq!(checks.get(), 2);

        let session = log.last().expect("completed move was not logged");
        assert_eq!(session.records().len(), 1);
        assert_eq!(session.records()[0].source(), base.join("a.txt"));
        assert!(session.records()[0].destination().exists());
        assert_eq!(
            session.created_directories().iter().collect::<Vec<_>>(),
            vec![&base.join("Documents")]
        );
        assert!(base.join("b.jpg").exists());
        assert!(base.join("c.mp4").exists());
        assert!(!base.join("Images").exists());
    }

    #[test]
    fn test_plan_does_not_touch_files_and_reserves_names() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::create_dir(base.join("sub")).unwrap();
        fs::write(base.join("sub/nested.jpg"), "0").unwrap();
        fs::create_dir(base.join("Images")).unwrap();
        fs::write(base.join("Images/photo.jpg"), "old").unwrap();
        fs::write(base.join("photo.jpg"), "1").unwrap();
        fs::write(base.join("clip.mp4"), "2").unwrap();

        let preset = RulePreset::builtin();
        let filters = CompiledFilters::default();
        let plan = FileOrganizer::new(&preset, &filters)
            .plan(&[base.to_path_buf()], &OrganizeOptions::new(ResolutionMode::ByType))
            .unwrap();

        assert_eq!(plan.moves.len(), 2);
        let photo = plan.moves.iter().find(|m| m.folder == "Images").unwrap();
        assert_eq!(photo.destination, base.join("Images/photo (2).jpg"));
        assert_eq!(plan.folder_counts().get("Videos"), Some(&1));
        assert!(!base.join("Videos").exists());
        assert!(base.join("photo.jpg").exists());
        assert!(base.join("sub/nested.jpg").exists());
    }

    #[test]
    fn test_filters_apply_to_directory_inputs() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::write(base.join("Thumbs.db"), "x").unwrap();
        fs::write(base.join("movie.mkv.part"), "x").unwrap();
        fs::write(base.join("movie.mkv"), "x").unwrap();

        let mut log = SessionLog::new();
        let report = organize_dir(base, &OrganizeOptions::new(ResolutionMode::ByType), &mut log);

        assert_eq!(report.moved, 1);
        assert!(base.join("Thumbs.db").exists());
        assert!(base.join("movie.mkv.part").exists());
        assert!(base.join("Videos/movie.mkv").exists());
    }

    #[test]
    fn test_missing_input_is_reported() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut log = SessionLog::new();
        let report = organize_dir(
            &temp_dir.path().join("does-not-exist"),
            &OrganizeOptions::new(ResolutionMode::ByType),
            &mut log,
        );
        assert_eq!(report.moved, 0);
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(report.skipped[0].reason, FailureReason::Missing));
    }
}
