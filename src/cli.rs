//! Command-line interface for sortout.
//!
//! This module handles:
//! - Argument parsing (`clap` derive)
//! - Loading configuration and presets
//! - Guarding the session log with a lock file for the whole invocation
//! - Printing reports through [`OutputFormatter`]

use crate::config::{CompiledFilters, ConfigError, SortoutConfig};
use crate::file_organizer::{FileOrganizer, OrganizeError, OrganizeOptions};
use crate::output::OutputFormatter;
use crate::preset::{PresetTables, RulePreset};
use crate::puller::{FilePuller, PullTarget};
use crate::reaper::{EmptyDirReaper, ReapError};
use crate::resolver::ResolutionMode;
use crate::session::{JsonFileStore, LogError, SessionLog, SessionStore};
use crate::undo::{UndoError, UndoManager, UndoReport};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "sortout")]
#[command(about = "Sort files into folders by type, category or source site, with undo")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: ./.sortoutrc.toml, then ~/.config/sortout/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Session log used for undo (overrides the configuration)
    #[arg(long, global = true, value_name = "FILE")]
    pub session_log: Option<PathBuf>,

    /// Show what would be moved without touching anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// More diagnostics on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sort files into one folder per file type
    Type {
        /// Files or folders (a folder contributes its top-level files)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Sort files into one folder per category
    Category {
        /// Only move files of this category id (see `sortout presets`)
        #[arg(long, value_name = "ID")]
        only: Option<String>,

        /// Files or folders (a folder contributes its top-level files)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Sort files into folders named after the site in their file name
    Source {
        /// Files or folders (a folder contributes its top-level files)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Move every file below the folders into a single folder
    Pull {
        #[arg(required = true)]
        folders: Vec<PathBuf>,

        #[command(flatten)]
        target: PullTargetArgs,
    },

    /// Remove empty folders below a folder
    Reap { folder: PathBuf },

    /// Undo the most recent organize or pull
    Undo,

    /// Undo every recorded organize and pull, newest first
    UndoAll,

    /// List recorded sessions
    History {
        /// Forget all sessions without undoing them
        #[arg(long)]
        clear: bool,
    },

    /// Show the folder names used for each extension and category
    Presets,
}

/// Where `pull` puts files. Defaults to a `Files Bin` folder beside each root.
#[derive(Args, Debug, Default)]
#[group(multiple = false)]
pub struct PullTargetArgs {
    /// Pull everything into this folder
    #[arg(long, value_name = "DIR")]
    pub into: Option<PathBuf>,

    /// Flatten each folder into itself
    #[arg(long)]
    pub here: bool,

    /// Flatten each folder into its parent
    #[arg(long)]
    pub above: bool,
}

impl PullTargetArgs {
    pub fn target(&self) -> PullTarget {
        if let Some(dir) = &self.into {
            PullTarget::Into(dir.clone())
        } else if self.here {
            PullTarget::Here
        } else if self.above {
            PullTarget::Above
        } else {
            PullTarget::Bin
        }
    }
}

/// Errors that end a CLI invocation.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error("Session log {} is in use by another sortout process", .0.display())]
    LogBusy(PathBuf),

    #[error("Cannot lock session log {}: {source}", .path.display())]
    Lock { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Organize(#[from] OrganizeError),

    #[error(transparent)]
    Undo(#[from] UndoError),

    #[error(transparent)]
    Reap(#[from] ReapError),

    #[error("--dry-run is not supported for `{0}`")]
    DryRunUnsupported(&'static str),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Log(_) | Self::LogBusy(_) | Self::Lock { .. } => 3,
            Self::Organize(_) => 4,
            Self::Undo(_) => 5,
            Self::Reap(_) => 6,
            Self::DryRunUnsupported(_) => 64,
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

/// How the session log is read before a command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadMode {
    /// A corrupt log is moved aside and a new one started.
    Recover,
    /// A corrupt log is an error.
    Strict,
}

/// Everything a command needs, loaded once per invocation.
struct Context {
    preset: RulePreset,
    tables: PresetTables,
    filters: CompiledFilters,
    log_path: PathBuf,
    dry_run: bool,
}

/// Runs a parsed command line.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use sortout::cli::{Cli, run_cli};
///
/// let cli = Cli::parse_from(["sortout", "--dry-run", "type", "/path/to/Downloads"]);
/// if let Err(e) = run_cli(cli) {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run_cli(cli: Cli) -> CliResult<()> {
    let config = SortoutConfig::load(cli.config.as_deref())?;
    let filters = config.filters.compile()?;
    let tables = config.presets.clone();
    let preset = config.presets.compile()?;
    let log_path = cli
        .session_log
        .clone()
        .unwrap_or_else(|| config.session_log.resolve_path());
    debug!(log = %log_path.display(), "using session log");

    let ctx = Context {
        preset,
        tables,
        filters,
        log_path,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Command::Type { paths } => organize(&ctx, &paths, OrganizeOptions::new(ResolutionMode::ByType)),
        Command::Category { only, paths } => {
            let mut options = OrganizeOptions::new(ResolutionMode::ByCategory);
            if let Some(id) = only {
                options = options.only_category(id);
            }
            organize(&ctx, &paths, options)
        }
        Command::Source { paths } => organize(&ctx, &paths, OrganizeOptions::new(ResolutionMode::BySource)),
        Command::Pull { folders, target } => pull(&ctx, &folders, &target.target()),
        Command::Reap { folder } => reap(&ctx, &folder),
        Command::Undo => undo(&ctx),
        Command::UndoAll => undo_all(&ctx),
        Command::History { clear } => history(&ctx, clear),
        Command::Presets => {
            show_presets(&ctx.tables);
            Ok(())
        }
    }
}

fn organize(ctx: &Context, paths: &[PathBuf], options: OrganizeOptions) -> CliResult<()> {
    let organizer = FileOrganizer::new(&ctx.preset, &ctx.filters);

    if ctx.dry_run {
        let plan = organizer.plan(paths, &options)?;
        OutputFormatter::dry_run_notice(&format!(
            "Would organize {} files by {}",
            plan.moves.len(),
            options.mode
        ));
        for planned in &plan.moves {
            OutputFormatter::plain(&format!(
                "  {} -> {}",
                planned.source.display(),
                planned.destination.display()
            ));
        }
        OutputFormatter::failures("Would skip", &plan.skipped);
        if !plan.moves.is_empty() {
            OutputFormatter::summary_table(&plan.folder_counts(), plan.moves.len());
        }
        return Ok(());
    }

    OutputFormatter::info(&format!("Organizing by {}...", options.mode));
    let report = with_session_log(&ctx.log_path, LoadMode::Recover, |log| {
        let organizer = organizer.with_progress(OutputFormatter::create_progress_bar(0));
        Ok(organizer.organize(paths, &options, log)?)
    })?;

    if report.moved > 0 {
        OutputFormatter::summary_table(&report.folder_counts, report.moved);
    }
    OutputFormatter::failures("Skipped", &report.skipped);
    if report.cancelled {
        OutputFormatter::warning("Stopped early; the files moved so far can be undone");
    }
    match report.session_id {
        Some(id) => OutputFormatter::success(&format!(
            "Moved {} files (session #{}). Run `sortout undo` to revert.",
            report.moved, id
        )),
        None => OutputFormatter::info("Nothing was moved."),
    }
    Ok(())
}

fn pull(ctx: &Context, folders: &[PathBuf], target: &PullTarget) -> CliResult<()> {
    let puller = FilePuller::new(&ctx.preset, &ctx.filters);

    if ctx.dry_run {
        let plan = puller.plan(folders, target);
        OutputFormatter::dry_run_notice(&format!(
            "Would pull {} files {}",
            plan.moves.len(),
            target
        ));
        for planned in &plan.moves {
            OutputFormatter::plain(&format!(
                "  {} -> {}",
                planned.source.display(),
                planned.destination.display()
            ));
        }
        OutputFormatter::failures("Would skip", &plan.skipped);
        return Ok(());
    }

    OutputFormatter::info(&format!("Pulling files {}...", target));
    let report = with_session_log(&ctx.log_path, LoadMode::Recover, |log| {
        let puller = puller.with_progress(OutputFormatter::create_progress_bar(0));
        Ok(puller.pull(folders, target, log))
    })?;

    OutputFormatter::failures("Skipped", &report.skipped);
    if report.cancelled {
        OutputFormatter::warning("Stopped early; the files moved so far can be undone");
    }
    match report.session_id {
        Some(id) => {
            OutputFormatter::success(&format!(
                "Pulled {} files (session #{}). Run `sortout undo` to revert.",
                report.moved, id
            ));
            for dir in &report.targets {
                OutputFormatter::plain(&format!("  -> {}", dir.display()));
            }
        }
        None => OutputFormatter::info("Nothing was moved."),
    }
    Ok(())
}

fn reap(ctx: &Context, folder: &Path) -> CliResult<()> {
    if ctx.dry_run {
        return Err(CliError::DryRunUnsupported("reap"));
    }

    let report = EmptyDirReaper::reap(folder)?;

    for dir in &report.removed {
        OutputFormatter::plain(&format!("  removed {}", dir.display()));
    }
    OutputFormatter::failures("Could not process", &report.skipped);
    if !report.blocked.is_empty() {
        OutputFormatter::warning(&format!(
            "Kept {} folders that only hold the folders above",
            report.blocked.len()
        ));
        for dir in &report.blocked {
            OutputFormatter::plain(&format!("  {}", dir.display()));
        }
    }
    OutputFormatter::success(&format!("Removed {} empty folders", report.removed.len()));
    Ok(())
}

fn undo(ctx: &Context) -> CliResult<()> {
    if ctx.dry_run {
        return Err(CliError::DryRunUnsupported("undo"));
    }

    let report = with_session_log(&ctx.log_path, LoadMode::Strict, |log| {
        match UndoManager::undo_once(log) {
            Ok(report) => Ok(Some(report)),
            Err(UndoError::NothingToUndo) => Ok(None),
            Err(e) => {
                if let UndoError::Halted { failures, .. } = &e {
                    OutputFormatter::failures("Could not restore", failures);
                }
                Err(e.into())
            }
        }
    })?;

    match report {
        Some(report) => print_undo_report(&report),
        None => OutputFormatter::info("Nothing to undo."),
    }
    Ok(())
}

fn undo_all(ctx: &Context) -> CliResult<()> {
    if ctx.dry_run {
        return Err(CliError::DryRunUnsupported("undo-all"));
    }

    let report = with_session_log(&ctx.log_path, LoadMode::Strict, |log| {
        Ok(UndoManager::undo_all(log))
    })?;

    if report.sessions.is_empty() && report.halted.is_none() {
        OutputFormatter::info("Nothing to undo.");
        return Ok(());
    }
    for session in &report.sessions {
        print_undo_report(session);
    }
    OutputFormatter::header(&format!(
        "Undid {} sessions: {} files restored, {} skipped",
        report.sessions.len(),
        report.restored(),
        report.skipped()
    ));

    match report.halted {
        Some(halted) => {
            if let UndoError::Halted { failures, .. } = &halted {
                OutputFormatter::failures("Could not restore", failures);
            }
            Err(halted.into())
        }
        None => Ok(()),
    }
}

fn print_undo_report(report: &UndoReport) {
    OutputFormatter::success(&format!(
        "Undid session #{} ({}): restored {} files",
        report.session_id, report.kind, report.restored
    ));
    OutputFormatter::failures("Skipped", &report.skipped);
    if !report.kept_directories.is_empty() {
        OutputFormatter::warning("Kept folders that still contain other files:");
        for dir in &report.kept_directories {
            OutputFormatter::plain(&format!("  {}", dir.display()));
        }
    }
}

fn history(ctx: &Context, clear: bool) -> CliResult<()> {
    if clear {
        if ctx.dry_run {
            return Err(CliError::DryRunUnsupported("history --clear"));
        }
        let forgotten = with_session_log(&ctx.log_path, LoadMode::Recover, |log| {
            let count = log.len();
            log.clear();
            Ok(count)
        })?;
        OutputFormatter::success(&format!("Forgot {} sessions", forgotten));
        return Ok(());
    }

    let log = JsonFileStore::new(&ctx.log_path).load()?;
    if log.is_empty() {
        OutputFormatter::info("No sessions recorded.");
        return Ok(());
    }
    OutputFormatter::header(&format!("Sessions in {}", ctx.log_path.display()));
    for session in log.iter().rev() {
        OutputFormatter::session_line(session);
    }
    Ok(())
}

fn show_presets(tables: &PresetTables) {
    let mut by_folder: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (ext, folder) in &tables.extensions {
        by_folder.entry(folder.as_str()).or_default().push(ext.as_str());
    }

    OutputFormatter::header("BY TYPE");
    for (folder, exts) in &by_folder {
        OutputFormatter::plain(&format!("  {:<16} {}", folder, exts.join(", ")));
    }
    if tables.default_bucket.trim().is_empty() {
        OutputFormatter::warning("No default bucket: `type` and `category` will refuse to run");
    } else {
        OutputFormatter::plain(&format!("  {:<16} everything else", tables.default_bucket));
    }

    OutputFormatter::header("BY CATEGORY");
    for (id, rule) in &tables.categories {
        OutputFormatter::plain(&format!(
            "  {:<14} -> {:<14} {}",
            id,
            rule.folder,
            rule.extensions.join(", ")
        ));
    }

    OutputFormatter::header("BY SOURCE");
    OutputFormatter::plain(&format!(
        "  ignored prefixes: {}",
        tables.source.ignore_prefixes.join(", ")
    ));
    OutputFormatter::plain(&format!(
        "  unknown sites:    {}",
        tables.source.fallback.as_deref().unwrap_or("(left in place)")
    ));
}

/// Path of the lock file guarding `log_path`.
pub fn lock_path_for(log_path: &Path) -> PathBuf {
    let mut name = OsString::from(log_path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// Runs `op` on the session log while holding its lock, then saves the log
/// if `op` changed it.
fn with_session_log<T>(
    log_path: &Path,
    mode: LoadMode,
    op: impl FnOnce(&mut SessionLog) -> CliResult<T>,
) -> CliResult<T> {
    let lock_path = lock_path_for(log_path);
    let lock_err = |source| CliError::Lock {
        path: lock_path.clone(),
        source,
    };

    if let Some(parent) = lock_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(lock_err)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(lock_err)?;
    let mut lock = fd_lock::RwLock::new(file);
    let _guard = lock.try_write().map_err(|e| {
        if e.kind() == io::ErrorKind::WouldBlock {
            CliError::LogBusy(log_path.to_path_buf())
        } else {
            lock_err(e)
        }
    })?;

    let mut store = JsonFileStore::new(log_path);
    let mut log = match mode {
        LoadMode::Recover => store.load_or_recover()?,
        LoadMode::Strict => store.load()?,
    };
    let before = log.clone();

    let result = op(&mut log);
    if log != before {
        store.save(&log)?;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_pull_target_flags() {
        let cli = Cli::parse_from(["sortout", "pull", "a", "--above"]);
        match cli.command {
            Command::Pull { target, .. } => assert_eq!(target.target(), PullTarget::Above),
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::parse_from(["sortout", "pull", "a"]);
        match cli.command {
            Command::Pull { target, .. } => assert_eq!(target.target(), PullTarget::Bin),
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["sortout", "pull", "a", "--here", "--above"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["sortout", "type", "x", "--dry-run", "-vv"]);
        assert!(cli.dry_run);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_lock_path_appends_suffix() {
        assert_eq!(
            lock_path_for(Path::new("/data/sessions.json")),
            PathBuf::from("/data/sessions.json.lock")
        );
    }

    #[test]
    fn test_with_session_log_saves_only_changes() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let log_path = temp_dir.path().join("state").join("sessions.json");

        let len = with_session_log(&log_path, LoadMode::Strict, |log| Ok(log.len())).unwrap();
        assert_eq!(len, 0);
        assert!(!log_path.exists());
        assert!(lock_path_for(&log_path).exists());
    }

    #[test]
    fn test_strict_mode_rejects_corrupt_log() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let log_path = temp_dir.path().join("sessions.json");
        fs::write(&log_path, "not json").unwrap();

        let result = with_session_log(&log_path, LoadMode::Strict, |_| Ok(()));
        assert!(matches!(result, Err(CliError::Log(LogError::Corrupt { .. }))));
        assert!(log_path.exists());
    }

    #[test]
    fn test_exit_codes_are_distinct_per_concern() {
        assert_eq!(CliError::from(UndoError::NothingToUndo).exit_code(), 5);
        assert_eq!(
            CliError::LogBusy(PathBuf::from("/x")).exit_code(),
            CliError::Lock {
                path: PathBuf::from("/x"),
                source: io::Error::other("x"),
            }
            .exit_code()
        );
        assert_eq!(CliError::DryRunUnsupported("reap").exit_code(), 64);
    }
}
