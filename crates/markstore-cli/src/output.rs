//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use markstore_core::{Bookmark, RefreshReport};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a single bookmark
    pub fn print_bookmark(&self, bm: &Bookmark) {
        match self.format {
            OutputFormat::Human => print!("{}", format_bookmark(bm)),
            OutputFormat::Json => print_json(bm),
            OutputFormat::Quiet => println!("{}", bm.id),
        }
    }

    /// Print a list of bookmarks
    pub fn print_bookmarks(&self, bookmarks: &[Bookmark]) {
        match self.format {
            OutputFormat::Human => {
                if bookmarks.is_empty() {
                    println!("No bookmarks found.");
                    return;
                }
                for bm in bookmarks {
                    println!("{}", format_bookmark(bm));
                }
                println!("{} bookmark(s)", bookmarks.len());
            }
            OutputFormat::Json => print_json(&bookmarks),
            OutputFormat::Quiet => {
                for bm in bookmarks {
                    println!("{}", bm.id);
                }
            }
        }
    }

    /// Print a list of tags
    pub fn print_tags(&self, tags: &[(String, usize)]) {
        match self.format {
            OutputFormat::Human => {
                if tags.is_empty() {
                    println!("No tags found.");
                    return;
                }
                for (name, count) in tags {
                    println!("{} ({})", name, count);
                }
                println!("\n{} tag(s)", tags.len());
            }
            OutputFormat::Json => {
                let json_tags: Vec<_> = tags
                    .iter()
                    .map(|(name, count)| serde_json::json!({"name": name, "count": count}))
                    .collect();
                print_json(&json_tags);
            }
            OutputFormat::Quiet => {
                for (name, _) in tags {
                    println!("{}", name);
                }
            }
        }
    }

    /// Summarise a refresh run
    pub fn print_refresh_report(&self, report: &RefreshReport) {
        match self.format {
            OutputFormat::Human => {
                println!(
                    "Refreshed {} of {} bookmark(s), {} updated, {} deleted",
                    report.processed,
                    report.records,
                    report.updated.len(),
                    report.deleted.len()
                );
                for failure in &report.failures {
                    println!("  Index {}: {}", failure.id, failure.error);
                }
                if report.cancelled {
                    println!("Interrupted; remaining bookmarks were not refreshed.");
                }
            }
            OutputFormat::Json => {
                let failures: Vec<_> = report
                    .failures
                    .iter()
                    .map(|f| serde_json::json!({"id": f.id, "url": f.url, "error": f.error.to_string()}))
                    .collect();
                print_json(&serde_json::json!({
                    "records": report.records,
                    "processed": report.processed,
                    "updated": report.updated,
                    "deleted": report.deleted,
                    "failures": failures,
                    "cancelled": report.cancelled,
                }));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode JSON: {}", e),
    }
}

/// Multi-line human rendering of one bookmark
fn format_bookmark(bm: &Bookmark) -> String {
    let mut out = String::new();
    let lock = if bm.is_immutable() { " (L)" } else { "" };
    if bm.title.is_empty() {
        out.push_str(&format!("{}. {}{}\n", bm.id, truncate(&bm.url, 70), lock));
    } else {
        out.push_str(&format!("{}. {}{}\n", bm.id, truncate(&bm.title, 70), lock));
        out.push_str(&format!("   > {}\n", bm.url));
    }
    if !bm.description.is_empty() {
        out.push_str(&format!("   + {}\n", truncate_line(&bm.description, 70)));
    }
    if !bm.tag_list().is_empty() {
        out.push_str(&format!("   # {}\n", bm.tag_list().join(", ")));
    }
    out
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}
