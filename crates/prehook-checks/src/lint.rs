//! Linter check: golangci-lint once per resolved directory group.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prehook_core::diagnostics;
use prehook_core::{
    aggregate, AggregatedResult, CommandSpec, Deadline, FileGroup, FileGrouper, ProcessOutput,
    RepoFacts, Result, ValidationOutcome, ValidationRunner, Validator,
};

use crate::check::{go_files, Check, CheckCategory, CheckMetadata, CheckOutcome};

pub const NAME: &str = "lint";

struct GolangciLint;

impl Validator for GolangciLint {
    fn tool(&self) -> &str {
        "golangci-lint"
    }

    fn command(&self, group: &FileGroup, tags: &[String]) -> CommandSpec {
        let mut cmd = CommandSpec::new("golangci-lint")
            .current_dir(&group.working_dir)
            .args(["run", "--new-from-rev=HEAD~1"]);
        if !tags.is_empty() {
            cmd = cmd.args(["--build-tags".to_string(), tags.join(",")]);
        }
        cmd.arg(group.target.to_string())
    }

    /// Configuration errors are tool failures even when they mention a file position.
    fn findings(&self, output: &ProcessOutput) -> Option<String> {
        let combined = output.combined();
        let lower = combined.to_ascii_lowercase();
        if lower.contains("can't load config") || lower.contains("failed to load config") {
            return None;
        }
        diagnostics::format_findings(&combined, "linting issue")
    }
}

/// Runs golangci-lint with full module context for every touched directory.
pub struct LintCheck {
    facts: Arc<RepoFacts>,
    validation: ValidationRunner,
    timeout: Duration,
    build_tags: Vec<String>,
    fallback_module_dir: Option<PathBuf>,
}

impl LintCheck {
    pub fn new(facts: Arc<RepoFacts>, timeout: Duration) -> Self {
        let validation = ValidationRunner::new(facts.runner());
        Self {
            facts,
            validation,
            timeout,
            build_tags: Vec::new(),
            fallback_module_dir: None,
        }
    }

    /// Tags passed on every invocation.
    pub fn with_build_tags(mut self, tags: Vec<String>) -> Self {
        self.build_tags = tags;
        self
    }

    /// Module used for directories outside every discovered module.
    pub fn with_fallback_module_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.fallback_module_dir = dir;
        self
    }

    fn guidance(&self, outcomes: &BTreeMap<String, ValidationOutcome>, result: &AggregatedResult) -> (String, String) {
        let command = if self.build_tags.is_empty() {
            "golangci-lint run".to_string()
        } else {
            format!("golangci-lint run --build-tags {}", self.build_tags.join(","))
        };

        let suggestion = match result {
            AggregatedResult::Success => String::new(),
            AggregatedResult::FindingsToFix { .. } => {
                "Fix the linting issues shown above. Run 'golangci-lint run' in each directory for full details."
                    .to_string()
            }
            AggregatedResult::InfrastructureFailure { timed_out: true, .. } => format!(
                "Lint timed out after {}s. Consider increasing PREHOOK_LINT_TIMEOUT.",
                self.timeout.as_secs()
            ),
            AggregatedResult::InfrastructureFailure { combined_text, .. } => {
                if combined_text.contains("build constraints exclude all") {
                    "Build constraints exclude all Go files. Add the needed tags to PREHOOK_BUILD_TAGS or to 'build-tags' in your golangci-lint configuration."
                        .to_string()
                } else if combined_text.contains("failed to start") {
                    "golangci-lint is not installed. Install it with: go install github.com/golangci/golangci-lint/cmd/golangci-lint@latest"
                        .to_string()
                } else if combined_text.to_ascii_lowercase().contains("config") {
                    "Fix golangci-lint configuration issues. Check your .golangci.yml or run 'golangci-lint config path'."
                        .to_string()
                } else if outcomes.len() > 1 {
                    "Run 'golangci-lint run' manually on each directory to see detailed error output."
                        .to_string()
                } else {
                    "Run 'golangci-lint run' manually to see detailed error output.".to_string()
                }
            }
        };
        (suggestion, command)
    }
}

#[async_trait]
impl Check for LintCheck {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Run golangci-lint on Go code"
    }

    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            name: NAME.to_string(),
            description: "Run golangci-lint with full module context".to_string(),
            file_patterns: vec!["*.go".to_string()],
            estimated_duration: Duration::from_secs(10),
            dependencies: vec![NAME.to_string()],
            default_timeout: self.timeout,
            category: CheckCategory::Linting,
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
        let grouper = FileGrouper::new(repo_root).with_fallback_module_dir(self.fallback_module_dir.clone());
        let groups = grouper.resolve_groups(files);
        if groups.is_empty() {
            tracing::debug!(files = files.len(), "no Go module owns the changed files, nothing to lint");
            return Ok(CheckOutcome::passed());
        }

        let mut outcomes = BTreeMap::new();
        for (key, group) in &groups {
            let outcome = self
                .validation
                .run_group(&GolangciLint, group, &self.build_tags, deadline, self.timeout)
                .await;
            outcomes.insert(key.clone(), outcome);
        }

        let result = aggregate(&outcomes);
        if result.is_success() {
            return Ok(CheckOutcome::new(result));
        }
        let (suggestion, command) = self.guidance(&outcomes, &result);
        Ok(CheckOutcome::new(result)
            .with_suggestion(suggestion)
            .with_command(command))
    }
}
