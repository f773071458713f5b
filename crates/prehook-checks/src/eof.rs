//! Final newline fixer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prehook_core::{Deadline, RepoFacts, Result};

use crate::check::{Check, CheckCategory, CheckMetadata, CheckOutcome};
use crate::fixer::{self, TEXT_FILE_PATTERNS};

pub const NAME: &str = "eof";

/// `content` with a newline appended when it lacks one. Empty files are left
/// alone.
pub fn ensure_final_newline(content: &[u8]) -> Option<Vec<u8>> {
    match content.last() {
        None | Some(b'\n') => None,
        Some(_) => {
            let mut out = Vec::with_capacity(content.len() + 1);
            out.extend_from_slice(content);
            out.push(b'\n');
            Some(out)
        }
    }
}

/// Makes sure staged text files end with a newline.
pub struct EofCheck {
    facts: Arc<RepoFacts>,
    timeout: Duration,
}

impl EofCheck {
    pub fn new(facts: Arc<RepoFacts>, timeout: Duration) -> Self {
        Self { facts, timeout }
    }
}

#[async_trait]
impl Check for EofCheck {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Ensure files end with newline"
    }

    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            name: NAME.to_string(),
            description: "Ensure text files end with a newline character".to_string(),
            file_patterns: TEXT_FILE_PATTERNS.iter().map(|p| p.to_string()).collect(),
            estimated_duration: Duration::from_secs(1),
            dependencies: Vec::new(),
            default_timeout: self.timeout,
            category: CheckCategory::Formatting,
            requires_files: true,
        }
    }

    fn filter_files(&self, files: &[String]) -> Vec<String> {
        fixer::text_files(files)
    }

    async fn run(&self, deadline: Deadline, files: &[String]) -> Result<CheckOutcome> {
        if files.is_empty() {
            return Ok(CheckOutcome::passed());
        }

        let repo_root = self.facts.repo_root(deadline).await?;
        let report = fixer::fix_files(
            &repo_root,
            files,
            deadline.child(self.timeout),
            ensure_final_newline,
        )
        .await;

        Ok(report.into_outcome(
            NAME,
            "missing final newline",
            self.timeout,
            "PREHOOK_EOF_TIMEOUT",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckStatus;
    use prehook_core::fakes::ScriptedRunner;
    use prehook_core::ProcessOutput;
    use std::fs;

    #[test]
    fn test_ensure_final_newline() {
        assert_eq!(ensure_final_newline(b"package a"), Some(b"package a\n".to_vec()));
        assert_eq!(ensure_final_newline(b"a\r\n"), None);
        assert_eq!(ensure_final_newline(b"a\n\n"), None);
        assert_eq!(ensure_final_newline(b""), None);
    }

    #[tokio::test]
    async fn test_appends_missing_newline() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("go.mod"), "module example.com/m").unwrap();
        fs::write(tmp.path().join("empty.txt"), "").unwrap();
        fs::write(tmp.path().join("main.go"), "package main\n").unwrap();

        let facts = Arc::new(RepoFacts::with_repo_root(
            Arc::new(ScriptedRunner::new()),
            tmp.path(),
        ));
        let check = EofCheck::new(facts, Duration::from_secs(30));
        let files = check.filter_files(&[
            "go.mod".to_string(),
            "empty.txt".to_string(),
            "main.go".to_string(),
            "image.jpg".to_string(),
        ]);
        assert_eq!(files, vec!["go.mod", "empty.txt", "main.go"]);

        let outcome = check.run(Deadline::none(), &files).await.unwrap();
        assert_eq!(outcome.status(), CheckStatus::FindingsToFix);
        assert_eq!(
            outcome.message(),
            Some("Fixed missing final newline in 1 file(s):\n  go.mod")
        );
        assert_eq!(
            fs::read_to_string(tmp.path().join("go.mod")).unwrap(),
            "module example.com/m\n"
        );
        assert_eq!(fs::read(tmp.path().join("empty.txt")).unwrap(), b"");
    }

    #[tokio::test]
    async fn test_unknown_repo_root_is_an_error() {
        let runner = Arc::new(
            ScriptedRunner::new().on("git", ProcessOutput::failed(128, "", "fatal: not a git repository\n")),
        );
        let check = EofCheck::new(Arc::new(RepoFacts::new(runner)), Duration::from_secs(30));

        let err = check
            .run(Deadline::none(), &["main.go".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unable to determine repository root"));
    }

    #[test]
    fn test_metadata() {
        let facts = Arc::new(RepoFacts::with_repo_root(Arc::new(ScriptedRunner::new()), "/repo"));
        let meta = EofCheck::new(facts, Duration::from_secs(7)).metadata();
        assert_eq!(meta.name, "eof");
        assert_eq!(meta.default_timeout, Duration::from_secs(7));
        assert!(meta.file_patterns.contains(&"Makefile".to_string()));
        assert!(meta.requires_files);
    }
}
