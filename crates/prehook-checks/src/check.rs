//! Check trait, metadata and outcomes.

use std::time::Duration;

use async_trait::async_trait;
use prehook_core::{AggregatedResult, Deadline, Result};
use serde::{Deserialize, Serialize};

/// What kind of problem a check looks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    Formatting,
    Linting,
    Dependencies,
    Security,
}

impl CheckCategory {
    pub fn name(&self) -> &'static str {
        match self {
            CheckCategory::Formatting => "formatting",
            CheckCategory::Linting => "linting",
            CheckCategory::Dependencies => "dependencies",
            CheckCategory::Security => "security",
        }
    }
}

/// Static description of a check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckMetadata {
    pub name: String,
    pub description: String,

    /// Glob-style patterns of the files the check looks at.
    pub file_patterns: Vec<String>,

    pub estimated_duration: Duration,

    /// Build targets the check expects the repository to provide.
    pub dependencies: Vec<String>,

    pub default_timeout: Duration,
    pub category: CheckCategory,

    /// Whether the check is skipped when no file matches.
    pub requires_files: bool,
}

/// Final status of one check in a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    FindingsToFix,
    InfrastructureFailure,
    Skipped,
}

impl CheckStatus {
    pub fn name(&self) -> &'static str {
        match self {
            CheckStatus::Passed => "passed",
            CheckStatus::FindingsToFix => "findings_to_fix",
            CheckStatus::InfrastructureFailure => "infrastructure_failure",
            CheckStatus::Skipped => "skipped",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CheckStatus::FindingsToFix | CheckStatus::InfrastructureFailure
        )
    }
}

/// Result of running one check, with user guidance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub result: AggregatedResult,

    /// What the user should do next.
    pub suggestion: Option<String>,

    /// Command to reproduce the failure manually.
    pub command: Option<String>,
}

impl CheckOutcome {
    pub fn passed() -> Self {
        Self {
            result: AggregatedResult::Success,
            suggestion: None,
            command: None,
        }
    }

    pub fn new(result: AggregatedResult) -> Self {
        Self {
            result,
            suggestion: None,
            command: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn status(&self) -> CheckStatus {
        match self.result {
            AggregatedResult::Success => CheckStatus::Passed,
            AggregatedResult::FindingsToFix { .. } => CheckStatus::FindingsToFix,
            AggregatedResult::InfrastructureFailure { .. } => CheckStatus::InfrastructureFailure,
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.result.combined_text()
    }
}

/// A pre-commit check.
#[async_trait]
pub trait Check: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn metadata(&self) -> CheckMetadata;

    /// The subset of `files` this check cares about.
    fn filter_files(&self, files: &[String]) -> Vec<String>;

    /// Run against already filtered files (relative to the repository root).
    ///
    /// `Err` means the check could not run at all (for example the repository
    /// root is unknown); tool problems are reported in the outcome.
    async fn run(&self, deadline: Deadline, files: &[String]) -> Result<CheckOutcome>;
}

/// Files ending in `.go`.
pub fn go_files(files: &[String]) -> Vec<String> {
    files
        .iter()
        .filter(|f| f.ends_with(".go"))
        .cloned()
        .collect()
}
