//! Output formatting and styling module.
//!
//! All user-facing output of the CLI goes through here: colored status lines,
//! progress bars and summary tables. Diagnostics go through `tracing` instead.

use crate::error::ItemFailure;
use crate::session::Session;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

/// Consistent styling for CLI output.
///
/// - Success messages (green with ✓)
/// - Error messages (red with ✗, on stderr)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// ```no_run
    /// use sortout::output::OutputFormatter;
    /// OutputFormatter::success("Moved 12 files");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates a progress bar for a batch of files.
    ///
    /// The length can be set later with `set_length`, once the batch is known.
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("█▓░"),
        );
        pb
    }

    /// Prints a table of file counts per destination folder.
    ///
    /// ```no_run
    /// use sortout::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    ///
    /// let mut counts = BTreeMap::new();
    /// counts.insert("Documents".to_string(), 15);
    /// counts.insert("Images".to_string(), 8);
    /// OutputFormatter::summary_table(&counts, 23);
    /// ```
    pub fn summary_table(folder_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let width = folder_counts
            .keys()
            .map(|name| name.chars().count())
            .max()
            .unwrap_or(0)
            .max(6); // "Folder"

        println!("{:<width$} | {}", "Folder".bold(), "Files".bold(), width = width);
        println!("{}", "-".repeat(width + 10));

        for (folder, count) in folder_counts {
            println!(
                "{:<width$} | {} {}",
                folder,
                count.to_string().green(),
                Self::files_word(*count),
                width = width
            );
        }

        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            Self::files_word(total_files),
            width = width
        );
    }

    /// Lists skipped items under a warning line. Prints nothing for an empty list.
    pub fn failures(title: &str, failures: &[ItemFailure]) {
        if failures.is_empty() {
            return;
        }
        Self::warning(&format!("{} ({})", title, failures.len()));
        for failure in failures {
            println!(
                "  {} {}: {}",
                "-".yellow(),
                failure.path.display(),
                failure.reason.to_string().dimmed()
            );
        }
    }

    /// One line describing a logged session, for `history`.
    pub fn session_line(session: &Session) {
        let roots: Vec<String> = session
            .root_folders()
            .iter()
            .map(|root| root.display().to_string())
            .collect();
        println!(
            "{:>4}  {}  {:<20} {:>5} {}  {}",
            session.id().to_string().bold(),
            session
                .created_at()
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S"),
            session.kind().to_string(),
            session.records().len(),
            Self::files_word(session.records().len()),
            roots.join(", ").dimmed()
        );
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    fn files_word(count: usize) -> &'static str {
        if count == 1 { "file" } else { "files" }
    }
}
