//! Sessions and the session log.
//!
//! A [`Session`] is everything one organize or pull invocation did: each move,
//! each directory it had to create and each root folder it touched. It is the
//! unit of undo. Sessions are built with a [`SessionBuilder`] and become
//! immutable once sealed into the [`SessionLog`].
//!
//! The log itself is plain data. Persistence goes through a [`SessionStore`]:
//! load once at the start of an invocation, save once at the end.

use crate::resolver::ResolutionMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Identifier of a sealed session, unique within its log.
pub type SessionId = u64;

const LOG_FORMAT_VERSION: u32 = 1;

/// One file moved from `source` to `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    source: PathBuf,
    destination: PathBuf,
    /// Position of the move within its session.
    ordinal: u64,
}

impl MoveRecord {
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }
}

/// What produced a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionKind {
    Organize { mode: ResolutionMode },
    Pull,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Organize { mode } => write!(f, "organize by {}", mode),
            Self::Pull => f.write_str("pull"),
        }
    }
}

/// A sealed batch of moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    kind: SessionKind,
    records: Vec<MoveRecord>,
    created_directories: BTreeSet<PathBuf>,
    root_folders: BTreeSet<PathBuf>,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Moves in the order they happened.
    pub fn records(&self) -> &[MoveRecord] {
        &self.records
    }

    pub fn created_directories(&self) -> &BTreeSet<PathBuf> {
        &self.created_directories
    }

    pub fn root_folders(&self) -> &BTreeSet<PathBuf> {
        &self.root_folders
    }
}

/// Accumulates the moves of a batch that is still running.
#[derive(Debug)]
pub struct SessionBuilder {
    kind: SessionKind,
    records: Vec<MoveRecord>,
    destinations: BTreeSet<PathBuf>,
    created_directories: BTreeSet<PathBuf>,
    root_folders: BTreeSet<PathBuf>,
}

impl SessionBuilder {
    pub fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            records: Vec::new(),
            destinations: BTreeSet::new(),
            created_directories: BTreeSet::new(),
            root_folders: BTreeSet::new(),
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn add_root(&mut self, root: impl Into<PathBuf>) {
        self.root_folders.insert(root.into());
    }

    /// Records a directory that did not exist before this batch created it.
    pub fn record_created_directory(&mut self, dir: impl Into<PathBuf>) {
        self.created_directories.insert(dir.into());
    }

    /// True if an earlier move in this batch already landed at `path`.
    pub fn has_destination(&self, path: &Path) -> bool {
        self.destinations.contains(path)
    }

    /// Records a completed move.
    pub fn record_move(&mut self, source: PathBuf, destination: PathBuf) {
        debug_assert!(
            !self.destinations.contains(&destination),
            "destination recorded twice in one session"
        );
        self.destinations.insert(destination.clone());
        let ordinal = self.records.len() as u64;
        self.records.push(MoveRecord {
            source,
            destination,
            ordinal,
        });
    }

    pub fn created_directory_count(&self) -> usize {
        self.created_directories.len()
    }

    /// True if the batch changed nothing on disk.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.created_directories.is_empty()
    }

    fn seal(self, id: SessionId) -> Session {
        Session {
            id,
            created_at: Utc::now(),
            kind: self.kind,
            records: self.records,
            created_directories: self.created_directories,
            root_folders: self.root_folders,
        }
    }
}

/// Ordered stack of sealed sessions, most recent last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    version: u32,
    next_id: SessionId,
    sessions: Vec<Session>,
}

impl Default for SessionLog {
    fn default() -> Self {
        Self {
            version: LOG_FORMAT_VERSION,
            next_id: 1,
            sessions: Vec::new(),
        }
    }
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seals the batch and pushes it on the stack.
    ///
    /// Returns `None` without touching the log when the batch is empty.
    pub fn append(&mut self, batch: SessionBuilder) -> Option<SessionId> {
        if batch.is_empty() {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.sessions.push(batch.seal(id));
        Some(id)
    }

    pub fn last(&self) -> Option<&Session> {
        self.sessions.last()
    }

    pub fn pop(&mut self) -> Option<Session> {
        self.sessions.pop()
    }

    /// Drops every session without undoing any of them.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn from_json(text: &str, location: &Path) -> LogResult<Self> {
        let log: Self = serde_json::from_str(text).map_err(|e| LogError::Corrupt {
            path: location.to_path_buf(),
            reason: e.to_string(),
        })?;
        if log.version != LOG_FORMAT_VERSION {
            return Err(LogError::Corrupt {
                path: location.to_path_buf(),
                reason: format!("unsupported log version {}", log.version),
            });
        }
        Ok(log)
    }

    fn to_json(&self, location: &Path) -> LogResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| LogError::Write {
            path: location.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })
    }
}

/// Errors reading or writing the session log.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Failed to read session log {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to write session log {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("Session log {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
}

pub type LogResult<T> = Result<T, LogError>;

/// Persistence for the session log.
pub trait SessionStore {
    /// Reads the whole log. A store that was never written yields an empty log.
    fn load(&self) -> LogResult<SessionLog>;

    /// Replaces the stored log.
    fn save(&mut self, log: &SessionLog) -> LogResult<()>;
}

/// Session log kept in a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Like [`SessionStore::load`], but a corrupt file is moved aside and an
    /// empty log returned, so new sessions can still be recorded.
    pub fn load_or_recover(&self) -> LogResult<SessionLog> {
        match self.load() {
            Err(LogError::Corrupt { reason, .. }) => {
                let aside = self.corrupt_backup_path();
                fs::rename(&self.path, &aside).map_err(|source| LogError::Write {
                    path: aside.clone(),
                    source,
                })?;
                tracing::warn!(
                    log = %self.path.display(),
                    backup = %aside.display(),
                    %reason,
                    "session log was unreadable; moved it aside and started a new one"
                );
                Ok(SessionLog::new())
            }
            other => other,
        }
    }

    fn corrupt_backup_path(&self) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sessions.json".to_string());
        self.path.with_file_name(format!("{}.corrupt-{}", name, stamp))
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self) -> LogResult<SessionLog> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SessionLog::new()),
            Err(source) => {
                return Err(LogError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if text.trim().is_empty() {
            return Ok(SessionLog::new());
        }
        SessionLog::from_json(&text, &self.path)
    }

    fn save(&mut self, log: &SessionLog) -> LogResult<()> {
        let write_err = |source| LogError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        // Write-then-rename so a crash never leaves a half-written log.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, log.to_json(&self.path)?).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;

        tracing::debug!(log = %self.path.display(), sessions = log.len(), "saved session log");
        Ok(())
    }
}

/// Session log kept in memory, serialized the same way as the file store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    contents: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose contents cannot be parsed.
    pub fn with_raw(contents: impl Into<String>) -> Self {
        Self {
            contents: Some(contents.into()),
        }
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> LogResult<SessionLog> {
        match self.contents.as_deref() {
            None => Ok(SessionLog::new()),
            Some(text) => SessionLog::from_json(text, Path::new("<memory>")),
        }
    }

    fn save(&mut self, log: &SessionLog) -> LogResult<()> {
        self.contents = Some(log.to_json(Path::new("<memory>"))?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn batch_with_move(from: &str, to: &str) -> SessionBuilder {
        let mut batch = SessionBuilder::new(SessionKind::Organize {
            mode: ResolutionMode::ByType,
        });
        batch.add_root("/data/a");
        batch.record_move(PathBuf::from(from), PathBuf::from(to));
        batch
    }

    #[test]
    fn test_append_assigns_increasing_ids() {
        let mut log = SessionLog::new();
        let first = log.append(batch_with_move("/a/1.txt", "/a/Docs/1.txt"));
        let second = log.append(batch_with_move("/a/2.txt", "/a/Docs/2.txt"));
        assert_eq!(first, Some(1));
        assert_eq!(second, Some(2));
        assert_eq!(log.len(), 2);
        assert_eq!(log.last().map(Session::id), Some(2));
    }

    #[test]
    fn test_ids_are_not_reused_after_pop() {
        let mut log = SessionLog::new();
        log.append(batch_with_move("/a/1.txt", "/a/Docs/1.txt"));
        log.pop();
        let id = log.append(batch_with_move("/a/2.txt", "/a/Docs/2.txt"));
        assert_eq!(id, Some(2));
    }

    #[test]
    fn test_empty_batch_is_not_appended() {
        let mut log = SessionLog::new();
        let batch = SessionBuilder::new(SessionKind::Pull);
        assert_eq!(log.append(batch), None);
        assert!(log.is_empty());
    }

    #[test]
    fn test_records_keep_order_and_ordinals() {
        let mut batch = SessionBuilder::new(SessionKind::Pull);
        batch.record_move("/r/x/1".into(), "/t/1".into());
        batch.record_move("/r/y/2".into(), "/t/2".into());
        assert!(batch.has_destination(Path::new("/t/2")));

        let mut log = SessionLog::new();
        log.append(batch);
        let session = log.last().unwrap();
        let ordinals: Vec<u64> = session.records().iter().map(MoveRecord::ordinal).collect();
        assert_eq!(ordinals, vec![0, 1]);
        assert_eq!(session.records()[1].source(), Path::new("/r/y/2"));
    }

    #[test]
    fn test_memory_store_round_trip() {
        let mut store = MemoryStore::new();
        let mut log = store.load().unwrap();
        let mut batch = batch_with_move("/a/1.txt", "/a/Docs/1.txt");
        batch.record_created_directory("/a/Docs");
        log.append(batch);
        store.save(&log).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded, log);
        let session = reloaded.last().unwrap();
        assert!(session.created_directories().contains(Path::new("/a/Docs")));
        assert!(session.root_folders().contains(Path::new("/data/a")));
    }

    #[test]
    fn test_memory_store_reports_corruption() {
        let store = MemoryStore::with_raw("{ not json");
        assert!(matches!(store.load(), Err(LogError::Corrupt { .. })));
    }

    #[test]
    fn test_file_store_missing_file_is_empty_log() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = JsonFileStore::new(temp_dir.path().join("sessions.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_save_creates_parent_and_round_trips() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("nested").join("sessions.json");
        let mut store = JsonFileStore::new(&path);

        let mut log = SessionLog::new();
        log.append(batch_with_move("/a/1.txt", "/a/Docs/1.txt"));
        store.save(&log).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(store.load().unwrap(), log);
    }

    #[test]
    fn test_file_store_recovers_from_corruption() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("sessions.json");
        fs::write(&path, "garbage").unwrap();
        let store = JsonFileStore::new(&path);

        assert!(matches!(store.load(), Err(LogError::Corrupt { .. })));
        let log = store.load_or_recover().unwrap();
        assert!(log.is_empty());
        assert!(!path.exists());

        let backups = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .count();
        assert_eq!(backups, 1);
    }
}
