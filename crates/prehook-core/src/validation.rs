//! Per-group validator execution and output classification.
//!
//! Validators are third-party binaries with no structured output, so their
//! combined stdout/stderr is pattern matched. All of that matching goes
//! through [`classify`], in a fixed order:
//!
//! 1. timeout (partial output may look like findings)
//! 2. constraint exclusion marker (handled by a tagged retry)
//! 3. validator-specific findings
//! 4. anything else is a tool failure

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::constraints::detect_constraints;
use crate::deadline::Deadline;
use crate::diagnostics;
use crate::error::PrehookError;
use crate::grouping::FileGroup;
use crate::obs;
use crate::process::{CommandRunner, CommandSpec, ProcessOutput};

/// Output signature of a validator that saw no files under the active tags.
pub const CONSTRAINT_EXCLUSION_MARKER: &str = "build constraints exclude all";

/// Outcome of validating one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Success,
    ReportedFindings { diagnostic_text: String },
    ToolFailure { diagnostic_text: String },
    TimedOut,
}

impl ValidationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ValidationOutcome::Success)
    }

    pub fn diagnostic_text(&self) -> Option<&str> {
        match self {
            ValidationOutcome::ReportedFindings { diagnostic_text }
            | ValidationOutcome::ToolFailure { diagnostic_text } => Some(diagnostic_text),
            ValidationOutcome::Success | ValidationOutcome::TimedOut => None,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            ValidationOutcome::Success => "success",
            ValidationOutcome::ReportedFindings { .. } => "findings",
            ValidationOutcome::ToolFailure { .. } => "tool_failure",
            ValidationOutcome::TimedOut => "timed_out",
        }
    }
}

/// Result of classifying one captured run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Success,
    TimedOut,
    ConstraintsExcluded,
    Findings(String),
    ToolFailure(String),
}

/// An external tool run once per [`FileGroup`].
pub trait Validator: Send + Sync {
    /// Tool name used in messages.
    fn tool(&self) -> &str;

    /// The command line for `group` with the given build tags.
    fn command(&self, group: &FileGroup, tags: &[String]) -> CommandSpec;

    /// Findings text when `output` reports issues in the input, `None`
    /// when it does not look like normal findings output.
    fn findings(&self, output: &ProcessOutput) -> Option<String> {
        diagnostics::format_findings(&output.combined(), "issue")
    }

    /// Files scanned for constraint tags after an exclusion failure.
    fn constraint_candidates(&self, group: &FileGroup) -> Vec<PathBuf> {
        let mut candidates = group.member_paths();
        if let Ok(entries) = std::fs::read_dir(&group.source_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "go") && !candidates.contains(&path) {
                    candidates.push(path);
                }
            }
        }
        candidates
    }
}

/// Classify a captured run. Pure; identical input gives identical output.
pub fn classify(validator: &dyn Validator, output: &ProcessOutput) -> Classification {
    if output.success() {
        return Classification::Success;
    }
    if output.timed_out {
        return Classification::TimedOut;
    }

    let combined = output.combined();
    if combined.contains(CONSTRAINT_EXCLUSION_MARKER) {
        return Classification::ConstraintsExcluded;
    }
    if let Some(text) = validator.findings(output) {
        return Classification::Findings(text);
    }
    Classification::ToolFailure(combined.trim().to_string())
}

/// Runs validators against groups under deadlines.
#[derive(Clone)]
pub struct ValidationRunner {
    runner: Arc<dyn CommandRunner>,
}

impl ValidationRunner {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Validate one group. The run is bounded by `min(timeout, deadline)`;
    /// a constraint retry gets its own budget of the same size.
    pub async fn run_group(
        &self,
        validator: &dyn Validator,
        group: &FileGroup,
        tags: &[String],
        deadline: Deadline,
        timeout: Duration,
    ) -> ValidationOutcome {
        let started = Instant::now();

        let outcome = match self.attempt(validator, group, tags, deadline, timeout).await {
            Err(outcome) => outcome,
            Ok(Classification::ConstraintsExcluded) => {
                self.retry_with_constraints(validator, group, tags, deadline, timeout)
                    .await
            }
            Ok(classification) => into_outcome(classification),
        };

        obs::emit_group_validated(
            validator.tool(),
            &group.key,
            outcome.label(),
            started.elapsed().as_millis() as u64,
        );
        outcome
    }

    async fn attempt(
        &self,
        validator: &dyn Validator,
        group: &FileGroup,
        tags: &[String],
        deadline: Deadline,
        timeout: Duration,
    ) -> Result<Classification, ValidationOutcome> {
        let cmd = validator.command(group, tags);
        tracing::debug!(command = %cmd.display(), group = %group.key, "running validator");

        match self.runner.run(&cmd, deadline.child(timeout)).await {
            Ok(output) => Ok(classify(validator, &output)),
            Err(err) => Err(ValidationOutcome::ToolFailure {
                diagnostic_text: PrehookError::ValidatorToolFailure {
                    tool: validator.tool().to_string(),
                    message: err.to_string(),
                }
                .to_string(),
            }),
        }
    }

    async fn retry_with_constraints(
        &self,
        validator: &dyn Validator,
        group: &FileGroup,
        tags: &[String],
        deadline: Deadline,
        timeout: Duration,
    ) -> ValidationOutcome {
        let detected = detect_constraints(&validator.constraint_candidates(group));
        if detected.is_empty() {
            return ValidationOutcome::ToolFailure {
                diagnostic_text: format!(
                    "{} excluded every file in {} and no build tags were found to retry with",
                    validator.tool(),
                    group.key
                ),
            };
        }

        let mut retry_tags = tags.to_vec();
        for tag in &detected {
            if !retry_tags.contains(tag) {
                retry_tags.push(tag.clone());
            }
        }
        tracing::info!(group = %group.key, tags = ?detected, "retrying with detected build tags");

        match self
            .attempt(validator, group, &retry_tags, deadline, timeout)
            .await
        {
            Err(outcome) => outcome,
            Ok(Classification::Success) => ValidationOutcome::Success,
            Ok(Classification::TimedOut) => ValidationOutcome::TimedOut,
            Ok(Classification::Findings(text)) => ValidationOutcome::ReportedFindings {
                diagnostic_text: text,
            },
            Ok(Classification::ConstraintsExcluded) | Ok(Classification::ToolFailure(_)) => {
                ValidationOutcome::ToolFailure {
                    diagnostic_text: PrehookError::ConstraintRetryExhausted { tags: detected }
                        .to_string(),
                }
            }
        }
    }
}

fn into_outcome(classification: Classification) -> ValidationOutcome {
    match classification {
        Classification::Success => ValidationOutcome::Success,
        Classification::TimedOut => ValidationOutcome::TimedOut,
        Classification::Findings(text) => ValidationOutcome::ReportedFindings {
            diagnostic_text: text,
        },
        Classification::ToolFailure(text) => ValidationOutcome::ToolFailure {
            diagnostic_text: text,
        },
        Classification::ConstraintsExcluded => ValidationOutcome::ToolFailure {
            diagnostic_text: format!("{CONSTRAINT_EXCLUSION_MARKER} files"),
        },
    }
}
