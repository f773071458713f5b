//! Trailing whitespace fixer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prehook_core::{Deadline, RepoFacts, Result};

use crate::check::{Check, CheckCategory, CheckMetadata, CheckOutcome};
use crate::fixer::{self, TEXT_FILE_PATTERNS};

pub const NAME: &str = "whitespace";

/// `content` with spaces and tabs removed from every line end, or `None` when
/// nothing trails. Line endings (`\n` or `\r\n`) are kept as they are.
pub fn strip_trailing_whitespace(content: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(content.len());
    let mut changed = false;

    for line in content.split_inclusive(|b| *b == b'\n') {
        let ending = if line.ends_with(b"\r\n") {
            2
        } else if line.ends_with(b"\n") {
            1
        } else {
            0
        };
        let (body, ending) = line.split_at(line.len() - ending);
        let kept = body
            .iter()
            .rposition(|b| !matches!(b, b' ' | b'\t'))
            .map_or(0, |i| i + 1);

        changed |= kept != body.len();
        out.extend_from_slice(&body[..kept]);
        out.extend_from_slice(ending);
    }

    changed.then_some(out)
}

/// Removes trailing spaces and tabs from staged text files.
pub struct WhitespaceCheck {
    facts: Arc<RepoFacts>,
    timeout: Duration,
}

impl WhitespaceCheck {
    pub fn new(facts: Arc<RepoFacts>, timeout: Duration) -> Self {
        Self { facts, timeout }
    }
}

#[async_trait]
impl Check for WhitespaceCheck {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Fix trailing whitespace"
    }

    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            name: NAME.to_string(),
            description: "Remove trailing whitespace from text files".to_string(),
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
            strip_trailing_whitespace,
        )
        .await;

        Ok(report.into_outcome(
            NAME,
            "trailing whitespace",
            self.timeout,
            "PREHOOK_WHITESPACE_TIMEOUT",
        ))
    }
}
