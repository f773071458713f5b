//! Pipeline orchestration: select, filter and run checks under one deadline.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use prehook_core::obs::{self, PipelineSpan};
use prehook_core::{AggregatedResult, Config, Deadline, PrehookError, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::check::{Check, CheckOutcome, CheckStatus};
use crate::registry::Registry;

/// Per-invocation choices layered over the configuration.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Changed files, relative to the repository root.
    pub files: Vec<String>,

    /// Run only these checks (empty means every registered check).
    pub only: Vec<String>,

    /// Checks to skip in addition to the configured skip list.
    pub skip: Vec<String>,

    pub fail_fast: bool,

    /// Concurrent checks; 0 uses the configured worker count.
    pub parallel: usize,
}

/// Outcome of one check within a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub name: String,
    pub status: CheckStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Number of files the check was given after filtering.
    pub files: usize,

    pub duration_ms: u64,
}

impl CheckReport {
    fn skipped(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Skipped,
            message: Some(reason.to_string()),
            suggestion: None,
            command: None,
            files: 0,
            duration_ms: 0,
        }
    }

    fn from_outcome(name: &str, outcome: CheckOutcome, files: usize, duration_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            status: outcome.status(),
            message: outcome.message().map(str::to_string),
            suggestion: outcome.suggestion,
            command: outcome.command,
            files,
            duration_ms,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }
}

/// Result of a complete pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: String,

    /// Whether no check failed.
    pub success: bool,

    /// Reports in registration order.
    pub checks: Vec<CheckReport>,

    pub duration_ms: u64,

    /// Files considered after exclusion.
    pub total_files: usize,
}

impl PipelineResult {
    pub fn passed_count(&self) -> usize {
        self.count(|s| s == CheckStatus::Passed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(|s| s.is_failure())
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|s| s == CheckStatus::Skipped)
    }

    fn count(&self, pred: impl Fn(CheckStatus) -> bool) -> usize {
        self.checks.iter().filter(|c| pred(c.status)).count()
    }
}

/// Whether `file` matches an exclude pattern. A pattern ending in `/` names a
/// directory anywhere in the path; any other pattern matches by substring.
pub fn is_excluded(file: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        if pattern.ends_with('/') {
            file.starts_with(pattern.as_str()) || file.contains(&format!("/{pattern}"))
        } else {
            file.contains(pattern.as_str())
        }
    })
}

/// Pre-commit pipeline over a registry.
pub struct Pipeline {
    registry: Arc<Registry>,
    config: Config,
}

impl Pipeline {
    pub fn new(registry: Arc<Registry>, config: Config) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run every selected check.
    ///
    /// Fails only when `only` names an unregistered check; check problems are
    /// reported per check.
    pub async fn run(&self, options: PipelineOptions) -> Result<PipelineResult> {
        let run_id = Uuid::new_v4().to_string();
        let span = PipelineSpan::new(&run_id);
        self.execute(options, span.run_id())
            .instrument(span.span())
            .await
    }

    async fn execute(&self, options: PipelineOptions, run_id: &str) -> Result<PipelineResult> {
        let started = Instant::now();
        let deadline = Deadline::after(self.config.timeout);

        let unknown: Vec<&String> = options
            .only
            .iter()
            .filter(|name| self.registry.get(name).is_none())
            .collect();
        if !unknown.is_empty() {
            return Err(PrehookError::Config(format!(
                "unknown check(s) {unknown:?}; available: {}",
                self.registry.names().join(", ")
            )));
        }

        let files: Vec<String> = options
            .files
            .iter()
            .filter(|f| !is_excluded(f, &self.config.exclude_patterns))
            .cloned()
            .collect();
        let (skip, skip_all) = self.skip_list(&options.skip);

        info!(
            files = files.len(),
            excluded = options.files.len() - files.len(),
            "starting pre-commit pipeline"
        );

        let mut reports = Vec::new();
        let mut jobs = Vec::new();
        for check in self.registry.checks() {
            let name = check.name();
            if !options.only.is_empty() && !options.only.iter().any(|o| o == name) {
                continue;
            }
            if skip_all || skip.contains(name) {
                reports.push(CheckReport::skipped(name, "skipped by configuration"));
                continue;
            }
            let matched = check.filter_files(&files);
            if matched.is_empty() {
                reports.push(CheckReport::from_outcome(name, CheckOutcome::passed(), 0, 0));
                continue;
            }
            jobs.push((check.clone(), matched));
        }

        let fail_fast = options.fail_fast || self.config.fail_fast;
        if fail_fast {
            let mut failed = false;
            for (check, matched) in jobs {
                if failed {
                    reports.push(CheckReport::skipped(check.name(), "skipped after an earlier failure"));
                    continue;
                }
                let report = run_check(check, matched, deadline).await;
                failed = report.status.is_failure();
                reports.push(report);
            }
        } else {
            let parallel = match options.parallel {
                0 => self.config.effective_workers(),
                n => n,
            };
            let finished: Vec<CheckReport> = stream::iter(jobs)
                .map(|(check, matched)| run_check(check, matched, deadline))
                .buffer_unordered(parallel.max(1))
                .collect()
                .await;
            reports.extend(finished);
        }

        let order = self.registry.names();
        reports.sort_by_key(|r| order.iter().position(|n| *n == r.name));

        let success = !reports.iter().any(|r| r.status.is_failure());
        let duration_ms = started.elapsed().as_millis() as u64;
        obs::emit_pipeline_finished(run_id, success, reports.len(), duration_ms);

        Ok(PipelineResult {
            run_id: run_id.to_string(),
            success,
            checks: reports,
            duration_ms,
            total_files: files.len(),
        })
    }

    /// Registered names to skip from the options and the configuration, and
    /// whether everything is skipped.
    fn skip_list(&self, extra: &[String]) -> (BTreeSet<String>, bool) {
        let mut skip = BTreeSet::new();
        let mut skip_all = self.config.skips_all();

        for name in extra.iter().chain(self.config.skip.iter()) {
            let name = name.trim();
            if name.eq_ignore_ascii_case(prehook_core::config::SKIP_ALL) {
                skip_all = true;
            } else if self.registry.get(name).is_some() {
                skip.insert(name.to_string());
            } else if !name.is_empty() {
                warn!(check = %name, "ignoring unknown check in skip list");
            }
        }
        (skip, skip_all)
    }
}

async fn run_check(check: Arc<dyn Check>, files: Vec<String>, deadline: Deadline) -> CheckReport {
    let name = check.name().to_string();
    obs::emit_check_started(&name, files.len());
    let started = Instant::now();

    let outcome = match check.run(deadline, &files).await {
        Ok(outcome) => outcome,
        Err(err) => CheckOutcome::new(AggregatedResult::InfrastructureFailure {
            combined_text: err.to_string(),
            timed_out: false,
        }),
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    let report = CheckReport::from_outcome(&name, outcome, files.len(), duration_ms);
    obs::emit_check_finished(&name, report.status.name(), duration_ms);
    report
}
