//! sortout - sort files into folders by type, category or source site
//!
//! This library resolves destination folders from file names, moves files in
//! recorded sessions that can be undone in order, flattens folder trees and
//! removes the empty folders left behind.

pub mod cli;
pub mod config;
pub mod error;
pub mod file_organizer;
pub mod output;
pub mod preset;
pub mod puller;
pub mod reaper;
pub mod resolver;
pub mod session;
pub mod undo;

pub use config::{CompiledFilters, ConfigError, SortoutConfig};
pub use error::{FailureReason, ItemFailure};
pub use file_organizer::{FileOrganizer, OrganizeError, OrganizeOptions, OrganizeReport};
pub use preset::{PresetTables, RulePreset};
pub use puller::{FilePuller, PullReport, PullTarget};
pub use reaper::{EmptyDirReaper, ReapReport};
pub use resolver::{ResolutionMode, ResolveError};
pub use session::{JsonFileStore, MemoryStore, Session, SessionLog, SessionStore};
pub use undo::{UndoError, UndoManager, UndoReport};

pub use cli::{Cli, run_cli};
