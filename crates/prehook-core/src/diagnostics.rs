//! Pure text transforms over validator output.
//!
//! Every function here is `&str -> String` (or a predicate) with no side
//! effects; `strip_ansi_codes` and `dedup_lines` are idempotent.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

fn ansi_re() -> Option<&'static Regex> {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").ok())
        .as_ref()
}

fn diagnostic_re() -> Option<&'static Regex> {
    static DIAGNOSTIC: OnceLock<Option<Regex>> = OnceLock::new();
    DIAGNOSTIC
        .get_or_init(|| Regex::new(r"^\s*[^\s:]+:\d+(?::\d+)?:\s*\S").ok())
        .as_ref()
}

/// Remove terminal color escape sequences.
pub fn strip_ansi_codes(text: &str) -> String {
    match ansi_re() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// Drop every non-empty line already seen earlier in `text`, keeping order.
pub fn dedup_lines(text: &str) -> String {
    let mut seen = HashSet::new();
    text.lines()
        .filter(|line| line.trim().is_empty() || seen.insert(line.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Both transforms, as applied before diagnostics are shown to a user.
pub fn clean(text: &str) -> String {
    dedup_lines(&strip_ansi_codes(text)).trim().to_string()
}

/// Whether a line has the `path:line:column: message` shape.
pub fn is_diagnostic_line(line: &str) -> bool {
    let line = strip_ansi_codes(line);
    diagnostic_re().is_some_and(|re| re.is_match(&line))
}

/// Stripped, trimmed, de-duplicated diagnostic lines in `text`.
pub fn diagnostic_lines(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    strip_ansi_codes(text)
        .lines()
        .map(str::trim)
        .filter(|line| is_diagnostic_line(line))
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}

/// `Found N <noun>(s):` followed by the diagnostic lines, or `None` when the
/// text carries no diagnostic-shaped line.
pub fn format_findings(text: &str, noun: &str) -> Option<String> {
    let lines = diagnostic_lines(text);
    if lines.is_empty() {
        return None;
    }
    Some(format!(
        "Found {} {}(s):\n{}",
        lines.len(),
        noun,
        lines.join("\n")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLANGCI_SAMPLE: &str = "\x1b[1minternal/git/files.go:89:2\x1b[0m: ineffectual assignment to err (ineffassign)\n\
internal/git/files.go:89:2: ineffectual assignment to err (ineffassign)\n\
\tif err != nil {\n\
\t^\n\
cmd/main.go:12:5: Error return value is not checked (errcheck)\n\
1 issues:\n";

    #[test]
    fn test_strip_ansi_codes() {
        assert_eq!(strip_ansi_codes("\x1b[31mred\x1b[0m plain"), "red plain");
        assert_eq!(strip_ansi_codes("no color"), "no color");
    }

    #[test]
    fn test_dedup_lines_keeps_first_occurrence() {
        assert_eq!(dedup_lines("a\nb\na\n\nb\nc"), "a\nb\n\nc");
    }

    #[test]
    fn test_transforms_are_idempotent() {
        let once = dedup_lines(&strip_ansi_codes(GOLANGCI_SAMPLE));
        assert_eq!(dedup_lines(&once), once);
        assert_eq!(strip_ansi_codes(&once), once);
        assert_eq!(clean(&clean(GOLANGCI_SAMPLE)), clean(GOLANGCI_SAMPLE));
    }

    #[test]
    fn test_is_diagnostic_line() {
        assert!(is_diagnostic_line("pkg/a/x.go:10:3: unused variable"));
        assert!(is_diagnostic_line("main.go:4: missing return"));
        assert!(!is_diagnostic_line("level=error msg=\"timeout: context deadline\""));
        assert!(!is_diagnostic_line("go: downloading example.com/m v1.0.0"));
        assert!(!is_diagnostic_line(""));
    }

    #[test]
    fn test_format_findings_counts_unique_lines() {
        let text = format_findings(GOLANGCI_SAMPLE, "linting issue").unwrap();
        assert!(text.starts_with("Found 2 linting issue(s):\n"));
        assert!(text.contains("internal/git/files.go:89:2: ineffectual assignment"));
        assert!(text.contains("cmd/main.go:12:5"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn test_format_findings_none_without_diagnostics() {
        assert!(format_findings("panic: runtime error\ngoroutine 1 [running]:", "issue").is_none());
    }
}
