//! Formatter check: `gofumpt -w` over the staged Go files.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prehook_core::diagnostics;
use prehook_core::{
    aggregate, CommandSpec, Deadline, FileGroup, PrehookError, ProcessOutput, RepoFacts, Result,
    ValidationOutcome, ValidationRunner, Validator,
};

use crate::check::{go_files, Check, CheckCategory, CheckMetadata, CheckOutcome};

pub const NAME: &str = "fumpt";

struct Gofumpt;

impl Validator for Gofumpt {
    fn tool(&self) -> &str {
        "gofumpt"
    }

    fn command(&self, group: &FileGroup, _tags: &[String]) -> CommandSpec {
        let mut cmd = CommandSpec::new("gofumpt")
            .current_dir(&group.working_dir)
            .arg("-w");
        for path in group.member_paths() {
            cmd = cmd.arg(path.to_string_lossy());
        }
        cmd
    }

    /// Syntax errors in the input are the user's to fix; permission problems are not.
    fn findings(&self, output: &ProcessOutput) -> Option<String> {
        let combined = output.combined();
        if combined.contains("permission denied") {
            return None;
        }
        diagnostics::format_findings(&combined, "syntax error")
    }

    fn constraint_candidates(&self, _group: &FileGroup) -> Vec<std::path::PathBuf> {
        Vec::new()
    }
}

/// Rewrites Go files in place with gofumpt.
pub struct FumptCheck {
    facts: Arc<RepoFacts>,
    validation: ValidationRunner,
    timeout: Duration,
}

impl FumptCheck {
    pub fn new(facts: Arc<RepoFacts>, timeout: Duration) -> Self {
        let validation = ValidationRunner::new(facts.runner());
        Self {
            facts,
            validation,
            timeout,
        }
    }

    fn suggestion(&self, outcome: &ValidationOutcome) -> Option<String> {
        let text = match outcome {
            ValidationOutcome::Success => return None,
            ValidationOutcome::TimedOut => {
                let err = PrehookError::ValidatorTimedOut {
                    tool: "gofumpt".to_string(),
                    timeout: self.timeout,
                };
                return Some(format!(
                    "{err}. Run it on fewer files or raise PREHOOK_FUMPT_TIMEOUT."
                ));
            }
            ValidationOutcome::ReportedFindings { .. } => {
                return Some(
                    "Go syntax errors prevent formatting. Fix them before running fumpt."
                        .to_string(),
                )
            }
            ValidationOutcome::ToolFailure { diagnostic_text } => diagnostic_text,
        };

        let suggestion = if text.contains("permission denied") {
            "Permission denied. Check that every Go file is writable."
        } else if text.contains("failed to start") {
            "gofumpt is not installed. Install it with: go install mvdan.cc/gofumpt@latest"
        } else {
            "Run 'gofumpt -w' on the files manually to see the full error output."
        };
        Some(suggestion.to_string())
    }
}

#[async_trait]
impl Check for FumptCheck {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Format Go code with gofumpt"
    }

    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            name: NAME.to_string(),
            description: "Format Go code with gofumpt (stricter gofmt)".to_string(),
            file_patterns: vec!["*.go".to_string()],
            estimated_duration: Duration::from_secs(3),
            dependencies: vec![NAME.to_string()],
            default_timeout: self.timeout,
            category: CheckCategory::Formatting,
            requires_files: true,
        }
    }

    fn filter_files(&self, files: &[String]) -> Vec<String> {
        go_files(files)
    }

    async fn run(&self, deadline: Deadline, files: &[String]) -> Result<CheckOutcome> {
        if files.is_empty() {
            return Ok(CheckOutcome::passed());
        }

        let repo_root = self.facts.repo_root(deadline).await?;
        let group = FileGroup::repository(repo_root, files.to_vec());
        let outcome = self
            .validation
            .run_group(&Gofumpt, &group, &[], deadline, self.timeout)
            .await;

        let suggestion = self.suggestion(&outcome);
        let mut result = CheckOutcome::new(aggregate(&BTreeMap::from([(group.key.clone(), outcome)])));
        if let Some(suggestion) = suggestion {
            result = result
                .with_suggestion(suggestion)
                .with_command(format!("gofumpt -w {}", files.join(" ")));
        }
        Ok(result)
    }
}
