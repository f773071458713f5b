//! In-process file fixers: read each file, apply a byte transform, write back
//! only what changed.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use prehook_core::{AggregatedResult, Deadline, PrehookError};
use tokio::sync::Mutex;

use crate::check::CheckOutcome;

/// Bytes inspected when looking for a NUL byte.
const BINARY_SNIFF_LEN: usize = 8000;

const TEXT_EXTENSIONS: &[&str] = &[
    "go", "mod", "sum", "md", "txt", "yml", "yaml", "json", "xml", "toml", "ini", "cfg", "conf",
    "sh", "bash", "zsh", "fish", "ps1", "py", "rb", "js", "ts", "jsx", "tsx", "css", "scss",
    "sass", "less", "html", "htm", "vue", "java", "c", "cpp", "cc", "cxx", "h", "hpp", "rs",
    "swift", "kt", "scala", "r", "sql", "proto", "thrift", "env",
];

const TEXT_FILE_NAMES: &[&str] = &[
    "Makefile",
    "Dockerfile",
    "Jenkinsfile",
    "Vagrantfile",
    ".gitignore",
    ".dockerignore",
    ".editorconfig",
    ".env",
    "LICENSE",
    "README",
    "CHANGELOG",
    "AUTHORS",
    "CONTRIBUTORS",
    "MAINTAINERS",
    "TODO",
    "NOTES",
];

/// File patterns shared by the fixer checks' metadata.
pub const TEXT_FILE_PATTERNS: &[&str] = &[
    "*.go", "*.md", "*.txt", "*.yml", "*.yaml", "*.json", "Makefile",
];

/// Whether `file` is a text file by extension or well-known name.
pub fn is_text_file(file: &str) -> bool {
    let path = Path::new(file);
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return true;
        }
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| TEXT_FILE_NAMES.contains(&name))
}

/// The text files among `files`.
pub fn text_files(files: &[String]) -> Vec<String> {
    files.iter().filter(|f| is_text_file(f)).cloned().collect()
}

/// Fixers rewrite the same files, so passes run one at a time.
fn pass_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn looks_binary(content: &[u8]) -> bool {
    content[..content.len().min(BINARY_SNIFF_LEN)].contains(&0)
}

/// What a fixer pass did.
#[derive(Debug, Default)]
pub(crate) struct FixReport {
    pub fixed: Vec<String>,
    pub errors: Vec<String>,
    pub timed_out: bool,
}

/// Apply `transform` to every file under `root`. A transform returns the new
/// content, or `None` when the file is already clean.
pub(crate) async fn fix_files<F>(
    root: &Path,
    files: &[String],
    deadline: Deadline,
    transform: F,
) -> FixReport
where
    F: Fn(&[u8]) -> Option<Vec<u8>>,
{
    let _pass = pass_lock().lock().await;
    let mut report = FixReport::default();

    for file in files {
        if deadline.is_expired() {
            report.timed_out = true;
            break;
        }

        let path = root.join(file);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(err) => {
                report.errors.push(format!("{file}: failed to read file: {err}"));
                continue;
            }
        };
        if looks_binary(&content) {
            tracing::debug!(file = %file, "binary content, leaving untouched");
            continue;
        }

        let Some(fixed) = transform(&content) else {
            continue;
        };
        match tokio::fs::write(&path, fixed).await {
            Ok(()) => {
                tracing::debug!(file = %file, "file fixed");
                report.fixed.push(file.clone());
            }
            Err(err) => report.errors.push(format!("{file}: failed to write file: {err}")),
        }
    }

    report
}

impl FixReport {
    /// Map the pass onto a check outcome. `what` names the problem fixed.
    pub fn into_outcome(
        self,
        tool: &str,
        what: &str,
        timeout: Duration,
        timeout_var: &str,
    ) -> CheckOutcome {
        let mut parts = Vec::new();
        if !self.fixed.is_empty() {
            parts.push(format!(
                "Fixed {what} in {} file(s):\n  {}",
                self.fixed.len(),
                self.fixed.join("\n  ")
            ));
        }

        if self.timed_out {
            let err = PrehookError::ValidatorTimedOut {
                tool: tool.to_string(),
                timeout,
            };
            parts.insert(0, err.to_string());
            return CheckOutcome::new(AggregatedResult::InfrastructureFailure {
                combined_text: parts.join("\n\n"),
                timed_out: true,
            })
            .with_suggestion(format!(
                "{err}. Run it on fewer files or raise {timeout_var}."
            ));
        }

        if !self.errors.is_empty() {
            parts.insert(0, self.errors.join("\n"));
            return CheckOutcome::new(AggregatedResult::InfrastructureFailure {
                combined_text: parts.join("\n\n"),
                timed_out: false,
            })
            .with_suggestion("Check that every staged file is readable and writable.");
        }

        if self.fixed.is_empty() {
            return CheckOutcome::passed();
        }

        let command = format!("git add {}", self.fixed.join(" "));
        CheckOutcome::new(AggregatedResult::FindingsToFix {
            combined_text: parts.join("\n\n"),
        })
        .with_suggestion("Files were fixed in place. Review the changes and stage them again.")
        .with_command(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckStatus;
    use std::fs;

    #[test]
    fn test_text_file_detection() {
        assert!(is_text_file("main.go"));
        assert!(is_text_file("docs/NOTES.TXT"));
        assert!(is_text_file("build/Makefile"));
        assert!(is_text_file(".gitignore"));
        assert!(is_text_file("deploy/.env"));
        assert!(is_text_file("analysis.R"));
        assert!(!is_text_file("logo.png"));
        assert!(!is_text_file("bin/tool"));
        assert!(!is_text_file("archive.tar.gz"));
    }

    #[tokio::test]
    async fn test_only_changed_files_are_written() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), "x").unwrap();
        fs::write(tmp.path().join("b.txt"), "ok").unwrap();

        let files = vec!["a.txt".to_string(), "b.txt".to_string()];
        let report = fix_files(tmp.path(), &files, Deadline::none(), |content| {
            (content == b"x").then(|| b"y".to_vec())
        })
        .await;

        assert_eq!(report.fixed, vec!["a.txt"]);
        assert!(report.errors.is_empty());
        assert_eq!(fs::read(tmp.path().join("a.txt")).unwrap(), b"y");
        assert_eq!(fs::read(tmp.path().join("b.txt")).unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_binary_content_is_left_alone() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("data.json"), b"{\0}").unwrap();

        let report = fix_files(
            tmp.path(),
            &["data.json".to_string()],
            Deadline::none(),
            |_| Some(Vec::new()),
        )
        .await;

        assert!(report.fixed.is_empty());
        assert_eq!(fs::read(tmp.path().join("data.json")).unwrap(), b"{\0}");
    }

    #[test]
    fn test_outcome_mapping() {
        let clean = FixReport::default().into_outcome("eof", "x", Duration::from_secs(1), "V");
        assert_eq!(clean.status(), CheckStatus::Passed);

        let fixed = FixReport {
            fixed: vec!["a.go".to_string(), "b.md".to_string()],
            ..Default::default()
        }
        .into_outcome("eof", "missing final newline", Duration::from_secs(1), "V");
        assert_eq!(fixed.status(), CheckStatus::FindingsToFix);
        assert_eq!(
            fixed.message(),
            Some("Fixed missing final newline in 2 file(s):\n  a.go\n  b.md")
        );
        assert_eq!(fixed.command.as_deref(), Some("git add a.go b.md"));

        let timed_out = FixReport {
            timed_out: true,
            ..Default::default()
        }
        .into_outcome("eof", "x", Duration::from_secs(30), "PREHOOK_EOF_TIMEOUT");
        assert_eq!(timed_out.status(), CheckStatus::InfrastructureFailure);
        assert!(timed_out
            .suggestion
            .unwrap()
            .contains("eof timed out after 30s. Run it on fewer files or raise PREHOOK_EOF_TIMEOUT."));
    }
}
