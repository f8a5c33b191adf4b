//! Maps a file name to the name of its destination folder.
//!
//! Resolution is a pure function of the file name, the [`ResolutionMode`]
//! and a [`RulePreset`] snapshot. Nothing here touches the filesystem.
//!
//! # Examples
//!
//! ```
//! use sortout::preset::RulePreset;
//! use sortout::resolver::{resolve, ResolutionMode};
//!
//! let preset = RulePreset::builtin();
//! assert_eq!(resolve("song.MP3", ResolutionMode::ByType, &preset).unwrap(), "Audio");
//! assert_eq!(resolve("song.mp3", ResolutionMode::ByCategory, &preset).unwrap(), "Media");
//! assert_eq!(
//!     resolve("img2.reddit.com/file.jpg", ResolutionMode::BySource, &preset).unwrap(),
//!     "Reddit"
//! );
//! ```

use crate::preset::{RulePreset, SourceMatcher};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Scheme-prefixed or bare host, optionally followed by a path separator.
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?P<scheme>[a-z][a-z0-9+.\-]*://)?(?P<host>(?:[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?)(?P<slash>/)?",
    )
    .expect("URL pattern is valid")
});

/// Which rule table decides the destination folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Extension → folder.
    ByType,
    /// Extension → category → folder.
    ByCategory,
    /// Host name found in the file name → folder.
    BySource,
}

impl ResolutionMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ByType => "type",
            Self::ByCategory => "category",
            Self::BySource => "source",
        }
    }

    /// Whether unmatched files fall into the preset's default bucket.
    pub fn uses_default_bucket(&self) -> bool {
        matches!(self, Self::ByType | Self::ByCategory)
    }
}

impl fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why no folder could be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no URL-like text in the file name")]
    NoUrl,

    #[error("host '{host}' has no site name after removing ignored prefixes")]
    NoSiteName { host: String },

    #[error("host '{host}' only yields the suffix '{token}'")]
    SuffixOnly { host: String, token: String },

    #[error("no default bucket is configured")]
    MissingDefaultBucket,
}

/// Resolves the destination folder name for `file_name`.
pub fn resolve(
    file_name: &str,
    mode: ResolutionMode,
    preset: &RulePreset,
) -> Result<String, ResolveError> {
    match mode {
        ResolutionMode::ByType => resolve_by_type(file_name, preset),
        ResolutionMode::ByCategory => resolve_by_category(file_name, preset),
        ResolutionMode::BySource => resolve_by_source(file_name, preset.source()),
    }
}

fn resolve_by_type(file_name: &str, preset: &RulePreset) -> Result<String, ResolveError> {
    extension_of(file_name, preset.compound_extensions())
        .and_then(|ext| preset.folder_for_extension(&ext))
        .or_else(|| preset.default_bucket())
        .map(str::to_string)
        .ok_or(ResolveError::MissingDefaultBucket)
}

fn resolve_by_category(file_name: &str, preset: &RulePreset) -> Result<String, ResolveError> {
    category_of(file_name, preset)
        .and_then(|id| preset.category_folder(id))
        .or_else(|| preset.default_bucket())
        .map(str::to_string)
        .ok_or(ResolveError::MissingDefaultBucket)
}

/// The category id owning the file's extension, if any.
pub fn category_of<'p>(file_name: &str, preset: &'p RulePreset) -> Option<&'p str> {
    extension_of(file_name, preset.compound_extensions())
        .and_then(|ext| preset.category_for_extension(&ext))
}

/// Final path component of a name that may contain separators.
fn base_name(file_name: &str) -> &str {
    file_name.rsplit(['/', '\\']).next().unwrap_or(file_name)
}

/// Splits a file name into stem and extension (with its leading dot).
///
/// Known compound extensions are matched first, longest first; otherwise
/// the last dot segment is used. A leading dot does not start an extension.
///
/// ```
/// use sortout::resolver::split_extension;
///
/// let compound = vec!["tar.gz".to_string()];
/// assert_eq!(split_extension("backup.TAR.GZ", &compound), ("backup", ".TAR.GZ"));
/// assert_eq!(split_extension("notes.txt", &compound), ("notes", ".txt"));
/// assert_eq!(split_extension(".bashrc", &compound), (".bashrc", ""));
/// ```
pub fn split_extension<'a>(file_name: &'a str, compound: &[String]) -> (&'a str, &'a str) {
    for ext in compound {
        let Some(dot) = file_name.len().checked_sub(ext.len() + 1) else {
            continue;
        };
        if dot == 0 || !file_name.is_char_boundary(dot) {
            continue;
        }
        let (stem, tail) = file_name.split_at(dot);
        if tail.as_bytes()[0] == b'.' && tail[1..].eq_ignore_ascii_case(ext) {
            return (stem, tail);
        }
    }

    match file_name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < file_name.len() => file_name.split_at(dot),
        _ => (file_name, ""),
    }
}

/// Normalized (lowercase, dotless) extension of the file name.
pub fn extension_of(file_name: &str, compound: &[String]) -> Option<String> {
    let (_, ext) = split_extension(base_name(file_name), compound);
    (!ext.is_empty()).then(|| ext[1..].to_lowercase())
}

/// Extracts a site name from the first URL-like text in the file name.
fn resolve_by_source(file_name: &str, rules: &SourceMatcher) -> Result<String, ResolveError> {
    let (text, kept_suffix) = strip_file_extension(file_name, rules);
    let host = find_host(text, kept_suffix, rules).ok_or(ResolveError::NoUrl)?;
    site_name(&host, rules)
}

/// Drops the file's own trailing extension so `photo.jpg` never reads as a
/// host. A trailing known suffix (`i.imgur.com`) is kept, and the returned
/// flag says so.
fn strip_file_extension<'a>(file_name: &'a str, rules: &SourceMatcher) -> (&'a str, bool) {
    let last_separator = file_name.rfind(['/', '\\']).map_or(0, |i| i + 1);
    match file_name.rfind('.') {
        Some(dot) if dot > last_separator => {
            let ext = &file_name[dot + 1..];
            let is_extension = !ext.is_empty()
                && ext.len() <= 8
                && ext.chars().all(|c| c.is_ascii_alphanumeric());
            if !is_extension {
                (file_name, false)
            } else if rules.is_suffix(&ext.to_ascii_lowercase()) {
                (file_name, true)
            } else {
                (&file_name[..dot], false)
            }
        }
        _ => (file_name, false),
    }
}

/// First URL-like host by position.
///
/// A match counts when it has a scheme, is followed by `/`, or ends in a
/// known suffix token. Purely numeric hosts (IP addresses) never count.
///
/// When the suffix token is also the file's own extension (`notes.co`,
/// `Makefile.in`), an unanchored host needs at least three segments.
fn find_host(text: &str, ends_in_own_extension: bool, rules: &SourceMatcher) -> Option<String> {
    URL_PATTERN.captures_iter(text).find_map(|caps| {
        let matched = caps.name("host")?;
        let host = matched.as_str().to_ascii_lowercase();
        let numeric = host
            .split('.')
            .all(|segment| segment.chars().all(|c| c.is_ascii_digit()));
        if numeric {
            return None;
        }
        let anchored = caps.name("scheme").is_some() || caps.name("slash").is_some();
        if anchored {
            return Some(host);
        }
        if ends_in_own_extension && matched.end() == text.len() && host.split('.').count() < 3 {
            return None;
        }
        let last = host.rsplit('.').next().unwrap_or_default();
        rules.is_suffix(last).then_some(host)
    })
}

/// Turns a lowercase host into a ProperCase site name.
fn site_name(host: &str, rules: &SourceMatcher) -> Result<String, ResolveError> {
    let segments: Vec<&str> = host.split('.').filter(|s| !s.is_empty()).collect();

    let mut rest = segments.as_slice();
    while let Some((first, tail)) = rest.split_first() {
        if !rules.is_ignorable(first) {
            break;
        }
        rest = tail;
    }

    let Some((candidate, after)) = rest.split_first() else {
        return Err(ResolveError::NoSiteName {
            host: host.to_string(),
        });
    };
    if rules.is_suffix(candidate) {
        return Err(ResolveError::SuffixOnly {
            host: host.to_string(),
            token: candidate.to_string(),
        });
    }
    if after.is_empty() {
        return Err(ResolveError::NoSiteName {
            host: host.to_string(),
        });
    }

    Ok(proper_case(candidate))
}

fn proper_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::PresetTables;

    fn source(name: &str) -> Result<String, ResolveError> {
        resolve(name, ResolutionMode::BySource, &RulePreset::builtin())
    }

    #[test]
    fn test_source_documented_examples() {
        assert_eq!(source("cdn.instagram.com/media/photo1.jpg").unwrap(), "Instagram");
        assert_eq!(source("img2.reddit.com/file.jpg").unwrap(), "Reddit");
        assert_eq!(
            source("https://www.pixabay.com/photo/xyz.png").unwrap(),
            "Pixabay"
        );
        assert_eq!(source("randomfile_no_url.png"), Err(ResolveError::NoUrl));
    }

    #[test]
    fn test_source_bare_host_with_known_suffix() {
        assert_eq!(source("www.unsplash.com_sunset.jpg").unwrap(), "Unsplash");
        assert_eq!(source("i.imgur.com").unwrap(), "Imgur");
    }

    #[test]
    fn test_source_ignores_dotted_names_without_url_shape() {
        assert_eq!(source("report.final.v2.pdf"), Err(ResolveError::NoUrl));
        assert_eq!(source("my.photo.jpg"), Err(ResolveError::NoUrl));
    }

    #[test]
    fn test_source_does_not_read_plain_file_names_as_hosts() {
        assert_eq!(source("Makefile.in"), Err(ResolveError::NoUrl));
        assert_eq!(source("notes.co"), Err(ResolveError::NoUrl));
        assert_eq!(source("site.io"), Err(ResolveError::NoUrl));
        assert_eq!(source("https://site.io").unwrap(), "Site");
        assert_eq!(source("www.github.io").unwrap(), "Github");
    }

    #[test]
    fn test_source_first_url_wins() {
        assert_eq!(
            source("saved from flickr.com/x and pinterest.com/y.jpg").unwrap(),
            "Flickr"
        );
    }

    #[test]
    fn test_source_only_ignorable_segments_fails() {
        assert!(matches!(
            source("www.cdn.com/file.png"),
            Err(ResolveError::SuffixOnly { .. })
        ));
        assert!(matches!(
            source("https://www.images/file.png"),
            Err(ResolveError::NoSiteName { .. })
        ));
    }

    #[test]
    fn test_source_unknown_sole_segment_is_not_guessed() {
        assert!(matches!(
            source("https://www.example/file.png"),
            Err(ResolveError::NoSiteName { .. })
        ));
    }

    #[test]
    fn test_source_rejects_ip_addresses() {
        assert_eq!(source("http://192.168.1.10/cam.jpg"), Err(ResolveError::NoUrl));
    }

    #[test]
    fn test_source_proper_case() {
        assert_eq!(source("HTTPS://WWW.YouTube.COM/watch.mp4").unwrap(), "Youtube");
    }

    #[test]
    fn test_type_lookup_is_case_insensitive() {
        let preset = RulePreset::builtin();
        assert_eq!(resolve("Photo.JPEG", ResolutionMode::ByType, &preset).unwrap(), "Images");
    }

    #[test]
    fn test_type_compound_extension_wins() {
        let mut tables = PresetTables::default();
        tables
            .extensions
            .insert("tar.gz".to_string(), "Tarballs".to_string());
        tables.extensions.remove("tgz");
        let preset = tables.compile().unwrap();

        assert_eq!(
            resolve("backup.tar.gz", ResolutionMode::ByType, &preset).unwrap(),
            "Tarballs"
        );
        assert_eq!(
            resolve("single.gz", ResolutionMode::ByType, &preset).unwrap(),
            "Archives"
        );
    }

    #[test]
    fn test_type_unknown_extension_goes_to_default_bucket() {
        let preset = RulePreset::builtin();
        assert_eq!(
            resolve("data.qqq", ResolutionMode::ByType, &preset).unwrap(),
            "Other Files"
        );
        assert_eq!(
            resolve("README", ResolutionMode::ByType, &preset).unwrap(),
            "Other Files"
        );
    }

    #[test]
    fn test_missing_default_bucket_is_an_error() {
        let preset = PresetTables {
            default_bucket: String::new(),
            ..PresetTables::default()
        }
        .compile()
        .unwrap();

        assert_eq!(
            resolve("data.qqq", ResolutionMode::ByType, &preset),
            Err(ResolveError::MissingDefaultBucket)
        );
        assert_eq!(
            resolve("data.qqq", ResolutionMode::ByCategory, &preset),
            Err(ResolveError::MissingDefaultBucket)
        );
    }

    #[test]
    fn test_category_lookup() {
        let preset = RulePreset::builtin();
        assert_eq!(
            resolve("clip.mkv", ResolutionMode::ByCategory, &preset).unwrap(),
            "Media"
        );
        assert_eq!(
            resolve("sheet.xlsx", ResolutionMode::ByCategory, &preset).unwrap(),
            "Documents"
        );
        assert_eq!(category_of("sheet.xlsx", &preset), Some("documents"));
        assert_eq!(category_of("mystery.qqq", &preset), None);
    }

    #[test]
    fn test_split_extension_edge_cases() {
        let compound = vec!["tar.gz".to_string()];
        assert_eq!(split_extension("archive.tar.gz", &compound), ("archive", ".tar.gz"));
        assert_eq!(split_extension("tar.gz", &compound), ("tar", ".gz"));
        assert_eq!(split_extension("trailing.", &compound), ("trailing.", ""));
        assert_eq!(split_extension("noext", &compound), ("noext", ""));
    }

    #[test]
    fn test_extension_of_uses_base_name() {
        assert_eq!(extension_of("dir.v2/file", &[]), None);
        assert_eq!(extension_of("dir/file.TXT", &[]), Some("txt".to_string()));
    }
}
