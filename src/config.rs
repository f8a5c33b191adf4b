//! Configuration: file filters, rule presets and the session log location.
//!
//! Configuration is read from TOML. Every section and key is optional; a
//! missing key falls back to the built-in default for that key.
//!
//! ```toml
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = ["Thumbs.db", ".DS_Store", "desktop.ini"]
//! patterns = ["*.log"]
//! extensions = ["tmp", "crdownload", "part", "partial"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//!
//! [presets]
//! default_bucket = "Other Files"
//!
//! [presets.extensions]
//! jpg = "Images"
//! "tar.gz" = "Archives"
//!
//! [presets.categories.media]
//! folder = "Media"
//! extensions = ["jpg", "mp3", "mp4"]
//!
//! [presets.source]
//! ignore_prefixes = ["www", "cdn", "images", "i"]
//! numbered_prefixes = ["img"]
//! suffixes = ["com", "net", "org", "in", "co"]
//! fallback = "Unknown Sources"
//!
//! [session_log]
//! path = "/home/me/.local/share/sortout/sessions.json"
//! ```

use crate::preset::PresetTables;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_FILE: &str = ".sortoutrc.toml";

/// File name of the session log inside the data directory.
pub const SESSION_LOG_FILE: &str = "sessions.json";

const BUILTIN_IGNORED_FILENAMES: &[&str] = &["Thumbs.db", ".DS_Store", "desktop.ini"];
const BUILTIN_IGNORED_EXTENSIONS: &[&str] = &["tmp", "crdownload", "part", "partial"];

/// Errors raised while loading or compiling configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Invalid glob pattern '{0}'")]
    InvalidGlobPattern(String),

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },

    #[error("Invalid extension '{0}'")]
    InvalidExtension(String),

    #[error("Invalid folder name '{0}': must be a single path component")]
    InvalidFolderName(String),

    #[error("Extension '{extension}' is mapped twice ('{first}' and '{second}')")]
    DuplicateExtension {
        extension: String,
        first: String,
        second: String,
    },

    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Root of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SortoutConfig {
    #[serde(default)]
    pub filters: FilterRules,

    #[serde(default)]
    pub presets: PresetTables,

    #[serde(default)]
    pub session_log: SessionLogSettings,
}

/// Rules deciding which files take part in organize and pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether files starting with "." are considered. Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Whitelist that overrides every exclude rule.
    #[serde(default)]
    pub include: IncludeRules,
}

/// Rules for excluding files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact file names, compared case-sensitively.
    #[serde(default = "builtin_ignored_filenames")]
    pub filenames: Vec<String>,

    /// Glob patterns matched against the whole path.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Extensions without the leading dot, compared case-insensitively.
    #[serde(default = "builtin_ignored_extensions")]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncludeRules {
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Where the session log lives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionLogSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn builtin_ignored_filenames() -> Vec<String> {
    BUILTIN_IGNORED_FILENAMES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn builtin_ignored_extensions() -> Vec<String> {
    BUILTIN_IGNORED_EXTENSIONS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            enable_hidden_files: false,
            exclude: ExcludeRules::default(),
            include: IncludeRules::default(),
        }
    }
}

impl Default for ExcludeRules {
    fn default() -> Self {
        Self {
            filenames: builtin_ignored_filenames(),
            patterns: Vec::new(),
            extensions: builtin_ignored_extensions(),
            regex: Vec::new(),
        }
    }
}

impl SessionLogSettings {
    /// The configured path, else `<data dir>/sortout/sessions.json`, else a
    /// file in the current directory when the platform has no data dir.
    pub fn resolve_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        match dirs::data_local_dir() {
            Some(dir) => dir.join("sortout").join(SESSION_LOG_FILE),
            None => PathBuf::from(format!(".sortout_{}", SESSION_LOG_FILE)),
        }
    }
}

impl SortoutConfig {
    /// Load configuration, falling back to defaults.
    ///
    /// Lookup order:
    /// 1. `config_path`, when given
    /// 2. `.sortoutrc.toml` in the current directory
    /// 3. `~/.config/sortout/config.toml`
    /// 4. built-in defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a file is found (or explicitly given) but cannot
    /// be read or parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config").join("sortout").join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Renders the configuration back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }
}

impl FilterRules {
    /// Compile the rules into matchers.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex pattern is invalid.
    pub fn compile(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(self)
    }
}

/// Precompiled filter rules.
#[derive(Debug)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let compile_globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| Pattern::new(p).map_err(|_| ConfigError::InvalidGlobPattern(p.clone())))
                .collect::<Result<Vec<_>, _>>()
        };

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Check if a file takes part in organize or pull.
    ///
    /// Order, first decisive rule wins: include patterns, hidden files,
    /// exact names, extensions, globs, regexes. Anything left is included.
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self
            .include_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
        {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = file_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
        {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }
}

impl Default for CompiledFilters {
    fn default() -> Self {
        FilterRules::default()
            .compile()
            .expect("built-in filters are valid")
    }
}
