//! Build-constraint tag detection.
//!
//! Only the first [`HEADER_LINES`] lines of each file are read; constraint
//! comments must precede the package clause.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Number of leading lines inspected per file.
pub const HEADER_LINES: usize = 10;

const MODERN_PREFIX: &str = "//go:build ";
const LEGACY_PREFIX: &str = "// +build ";

/// Tags declared by constraint comments in `files`, deduplicated and sorted.
///
/// Unreadable files are skipped.
pub fn detect_constraints(files: &[PathBuf]) -> Vec<String> {
    let mut tags = BTreeSet::new();
    for file in files {
        match header_lines(file) {
            Ok(lines) => {
                for line in &lines {
                    tags.extend(tags_in_line(line));
                }
            }
            Err(err) => {
                tracing::debug!(file = %file.display(), error = %err, "skipping unreadable file");
            }
        }
    }
    tags.into_iter().collect()
}

fn header_lines(path: &Path) -> std::io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    reader.lines().take(HEADER_LINES).collect()
}

/// Tag identifiers in one header line; empty for non-constraint lines.
pub fn tags_in_line(line: &str) -> Vec<String> {
    let line = line.trim();
    if let Some(expr) = line.strip_prefix(MODERN_PREFIX) {
        expr.split(['(', ')', '&', '|', '!', ' ', '\t'])
            .filter(|t| is_tag(t))
            .map(str::to_string)
            .collect()
    } else if let Some(expr) = line.strip_prefix(LEGACY_PREFIX) {
        expr.split([' ', '\t', ','])
            .map(|t| t.trim_start_matches('!'))
            .filter(|t| is_tag(t))
            .map(str::to_string)
            .collect()
    } else {
        Vec::new()
    }
}

fn is_tag(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}
