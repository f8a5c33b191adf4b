//! Rule presets: the tables the resolver reads.
//!
//! `PresetTables` is the serializable form found in the `[presets]` section of
//! the configuration file. Compiling it yields a `RulePreset`, an immutable
//! snapshot with normalized keys and precomputed lookup indexes.
//!
//! # Examples
//!
//! ```
//! use sortout::preset::RulePreset;
//!
//! let preset = RulePreset::builtin();
//! assert_eq!(preset.folder_for_extension("png"), Some("Images"));
//! assert_eq!(preset.folder_for_extension("tar.gz"), Some("Archives"));
//! assert_eq!(preset.default_bucket(), Some("Other Files"));
//! ```

use crate::config::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Folder that receives files no extension rule matched.
pub const DEFAULT_BUCKET: &str = "Other Files";

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "tiff", "ico", "heic", "avif",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "aac", "m4a", "wma", "opus"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "flv", "wmv", "webm", "3gp"];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "txt", "doc", "docx", "html", "htm", "md", "rtf", "odt", "epub",
];
const SPREADSHEET_EXTENSIONS: &[&str] = &["csv", "xls", "xlsx", "ods"];
const PRESENTATION_EXTENSIONS: &[&str] = &["ppt", "pptx", "odp"];
const ARCHIVE_EXTENSIONS: &[&str] = &[
    "zip", "rar", "7z", "tar", "gz", "bz2", "xz", "tar.gz", "tar.bz2", "tar.xz", "tgz",
];
const CODE_EXTENSIONS: &[&str] = &[
    "py", "java", "c", "cpp", "h", "hpp", "js", "ts", "rs", "go", "sh", "bash", "json", "xml",
    "yaml", "yml", "toml",
];
const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "woff", "woff2"];
const INSTALLER_EXTENSIONS: &[&str] = &["exe", "msi", "dmg", "deb", "rpm", "apk", "appimage"];

/// Folder name per group of extensions, used by type resolution.
const BUILTIN_TYPE_FOLDERS: &[(&str, &[&str])] = &[
    ("Images", IMAGE_EXTENSIONS),
    ("Audio", AUDIO_EXTENSIONS),
    ("Videos", VIDEO_EXTENSIONS),
    ("Documents", DOCUMENT_EXTENSIONS),
    ("Spreadsheets", SPREADSHEET_EXTENSIONS),
    ("Presentations", PRESENTATION_EXTENSIONS),
    ("Archives", ARCHIVE_EXTENSIONS),
    ("Code", CODE_EXTENSIONS),
    ("Fonts", FONT_EXTENSIONS),
    ("Installers", INSTALLER_EXTENSIONS),
];

/// Coarser groupings used by category resolution: (id, folder, members).
const BUILTIN_CATEGORIES: &[(&str, &str, &[&[&str]])] = &[
    (
        "media",
        "Media",
        &[IMAGE_EXTENSIONS, AUDIO_EXTENSIONS, VIDEO_EXTENSIONS],
    ),
    (
        "documents",
        "Documents",
        &[
            DOCUMENT_EXTENSIONS,
            SPREADSHEET_EXTENSIONS,
            PRESENTATION_EXTENSIONS,
        ],
    ),
    ("archives", "Archives", &[ARCHIVE_EXTENSIONS]),
    ("development", "Development", &[CODE_EXTENSIONS, FONT_EXTENSIONS]),
    ("installers", "Installers", &[INSTALLER_EXTENSIONS]),
];

const BUILTIN_IGNORE_PREFIXES: &[&str] = &[
    "www", "m", "mobile", "img", "image", "images", "cdn", "static", "media", "i", "s", "assets",
    "files", "dl", "download", "downloads", "upload", "uploads", "pbs", "v",
];
const BUILTIN_NUMBERED_PREFIXES: &[&str] = &["www", "img", "cdn", "i", "s", "static", "media"];
const BUILTIN_SUFFIXES: &[&str] = &[
    "com", "net", "org", "in", "co", "io", "uk", "us", "de", "fr", "jp", "ru", "cn", "br", "au",
    "ca", "it", "es", "nl", "edu", "gov", "info", "biz", "me", "tv", "app", "dev", "xyz",
];

/// Serializable preset tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetTables {
    /// Folder for files whose extension matches no rule. An empty string
    /// means no default bucket.
    #[serde(default = "default_bucket")]
    pub default_bucket: String,

    /// Extension (without the leading dot) to folder name.
    #[serde(default = "builtin_extensions")]
    pub extensions: BTreeMap<String, String>,

    /// Category id to its folder and member extensions.
    #[serde(default = "builtin_categories")]
    pub categories: BTreeMap<String, CategoryRule>,

    /// Tables used to turn a host name into a folder name.
    #[serde(default)]
    pub source: SourceRules,
}

/// A category: one folder receiving a set of extensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub folder: String,
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// Domain alias tables for source resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRules {
    /// Leading host segments skipped before picking the site name.
    #[serde(default = "builtin_ignore_prefixes")]
    pub ignore_prefixes: Vec<String>,

    /// Prefixes that are also skipped when followed by digits (`img2`).
    #[serde(default = "builtin_numbered_prefixes")]
    pub numbered_prefixes: Vec<String>,

    /// Suffix tokens that are never accepted as a site name.
    #[serde(default = "builtin_suffixes")]
    pub suffixes: Vec<String>,

    /// Folder for files whose source cannot be extracted. Unset means such
    /// files are skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn builtin_extensions() -> BTreeMap<String, String> {
    BUILTIN_TYPE_FOLDERS
        .iter()
        .flat_map(|(folder, exts)| {
            exts.iter()
                .map(move |ext| (ext.to_string(), folder.to_string()))
        })
        .collect()
}

fn builtin_categories() -> BTreeMap<String, CategoryRule> {
    BUILTIN_CATEGORIES
        .iter()
        .map(|(id, folder, groups)| {
            let extensions = groups
                .iter()
                .flat_map(|group| group.iter().map(|ext| ext.to_string()))
                .collect();
            (
                id.to_string(),
                CategoryRule {
                    folder: folder.to_string(),
                    extensions,
                },
            )
        })
        .collect()
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn builtin_ignore_prefixes() -> Vec<String> {
    to_strings(BUILTIN_IGNORE_PREFIXES)
}

fn builtin_numbered_prefixes() -> Vec<String> {
    to_strings(BUILTIN_NUMBERED_PREFIXES)
}

fn builtin_suffixes() -> Vec<String> {
    to_strings(BUILTIN_SUFFIXES)
}

impl Default for PresetTables {
    fn default() -> Self {
        Self {
            default_bucket: default_bucket(),
            extensions: builtin_extensions(),
            categories: builtin_categories(),
            source: SourceRules::default(),
        }
    }
}

impl Default for SourceRules {
    fn default() -> Self {
        Self {
            ignore_prefixes: builtin_ignore_prefixes(),
            numbered_prefixes: builtin_numbered_prefixes(),
            suffixes: builtin_suffixes(),
            fallback: None,
        }
    }
}

impl PresetTables {
    /// Validates and indexes the tables into an immutable snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error for empty or path-like folder names, empty
    /// extensions, and extensions claimed twice within one table.
    pub fn compile(self) -> Result<RulePreset, ConfigError> {
        let default_bucket = match self.default_bucket.trim() {
            "" => None,
            name => Some(validate_folder(name)?),
        };

        let mut compound = HashSet::new();

        let mut extension_folders = HashMap::new();
        for (raw, folder) in &self.extensions {
            let ext = normalize_extension(raw)?;
            let folder = validate_folder(folder)?;
            if let Some(previous) = extension_folders.insert(ext.clone(), folder.clone()) {
                return Err(ConfigError::DuplicateExtension {
                    extension: ext,
                    first: previous,
                    second: folder,
                });
            }
            if ext.contains('.') {
                compound.insert(ext);
            }
        }

        let mut category_folders = BTreeMap::new();
        let mut extension_categories: HashMap<String, String> = HashMap::new();
        for (id, rule) in &self.categories {
            category_folders.insert(id.clone(), validate_folder(&rule.folder)?);
            for raw in &rule.extensions {
                let ext = normalize_extension(raw)?;
                if let Some(previous) = extension_categories.get(&ext)
                    && previous != id
                {
                    return Err(ConfigError::DuplicateExtension {
                        extension: ext,
                        first: previous.clone(),
                        second: id.clone(),
                    });
                }
                if ext.contains('.') {
                    compound.insert(ext.clone());
                }
                extension_categories.insert(ext, id.clone());
            }
        }

        // Longest first so `tar.gz` wins over `gz`.
        let mut compound_extensions: Vec<String> = compound.into_iter().collect();
        compound_extensions.sort_by(|a, b| {
            let segments = |s: &str| s.matches('.').count();
            segments(b)
                .cmp(&segments(a))
                .then_with(|| b.len().cmp(&a.len()))
                .then_with(|| a.cmp(b))
        });

        Ok(RulePreset {
            default_bucket,
            extension_folders,
            extension_categories,
            category_folders,
            compound_extensions,
            source: SourceMatcher::new(self.source)?,
        })
    }
}

/// Strips the leading dot and lowercases an extension key.
fn normalize_extension(raw: &str) -> Result<String, ConfigError> {
    let ext = raw.trim().trim_start_matches('.').to_lowercase();
    if ext.is_empty() || ext.ends_with('.') || ext.contains(['/', '\\']) {
        return Err(ConfigError::InvalidExtension(raw.to_string()));
    }
    Ok(ext)
}

/// Rejects folder names that would escape the directory they are created in.
fn validate_folder(name: &str) -> Result<String, ConfigError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." || trimmed.contains(['/', '\\'])
    {
        return Err(ConfigError::InvalidFolderName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Immutable, indexed preset snapshot consumed by the resolver.
#[derive(Debug, Clone)]
pub struct RulePreset {
    default_bucket: Option<String>,
    extension_folders: HashMap<String, String>,
    extension_categories: HashMap<String, String>,
    category_folders: BTreeMap<String, String>,
    compound_extensions: Vec<String>,
    source: SourceMatcher,
}

impl RulePreset {
    /// The built-in presets.
    pub fn builtin() -> Self {
        PresetTables::default()
            .compile()
            .expect("built-in presets are valid")
    }

    pub fn default_bucket(&self) -> Option<&str> {
        self.default_bucket.as_deref()
    }

    /// Looks up the type folder for a normalized (lowercase, dotless) extension.
    pub fn folder_for_extension(&self, ext: &str) -> Option<&str> {
        self.extension_folders.get(ext).map(String::as_str)
    }

    /// Looks up the category id owning a normalized extension.
    pub fn category_for_extension(&self, ext: &str) -> Option<&str> {
        self.extension_categories.get(ext).map(String::as_str)
    }

    pub fn category_folder(&self, id: &str) -> Option<&str> {
        self.category_folders.get(id).map(String::as_str)
    }

    /// Known multi-part extensions, most specific first.
    pub fn compound_extensions(&self) -> &[String] {
        &self.compound_extensions
    }

    pub fn source(&self) -> &SourceMatcher {
        &self.source
    }
}

impl Default for RulePreset {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Compiled domain alias tables.
#[derive(Debug, Clone)]
pub struct SourceMatcher {
    ignore_prefixes: HashSet<String>,
    numbered_prefix: Option<Regex>,
    suffixes: HashSet<String>,
    fallback: Option<String>,
}

impl SourceMatcher {
    fn new(rules: SourceRules) -> Result<Self, ConfigError> {
        let lower = |items: Vec<String>| -> Vec<String> {
            items
                .into_iter()
                .map(|s| s.trim().trim_matches('.').to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };

        let numbered = lower(rules.numbered_prefixes);
        let numbered_prefix = if numbered.is_empty() {
            None
        } else {
            let alternation = numbered
                .iter()
                .map(|p| regex::escape(p))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"^(?:{})\d+$", alternation);
            Some(
                Regex::new(&pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern,
                    reason: e.to_string(),
                })?,
            )
        };

        let fallback = match rules.fallback {
            Some(name) => Some(validate_folder(&name)?),
            None => None,
        };

        Ok(Self {
            ignore_prefixes: lower(rules.ignore_prefixes).into_iter().collect(),
            numbered_prefix,
            suffixes: lower(rules.suffixes).into_iter().collect(),
            fallback,
        })
    }

    /// True if a lowercase host segment is skipped when it leads the host.
    pub fn is_ignorable(&self, segment: &str) -> bool {
        self.ignore_prefixes.contains(segment)
            || self
                .numbered_prefix
                .as_ref()
                .is_some_and(|re| re.is_match(segment))
    }

    /// True if a lowercase segment is a known suffix/TLD token.
    pub fn is_suffix(&self, segment: &str) -> bool {
        self.suffixes.contains(segment)
    }

    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }
}
