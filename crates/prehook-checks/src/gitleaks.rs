//! Secret scanning with gitleaks over the repository working tree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prehook_core::{
    aggregate, AggregatedResult, CommandSpec, Deadline, FileGroup, ProcessOutput, RepoFacts,
    Result, ValidationRunner, Validator,
};

use crate::check::{Check, CheckCategory, CheckMetadata, CheckOutcome};

pub const NAME: &str = "gitleaks";

const FINDING_FIELDS: [&str; 4] = ["Finding:", "Secret:", "File:", "Line:"];

/// The `Finding`/`Secret`/`File`/`Line` lines of a gitleaks report, one
/// paragraph per finding, under a count header.
pub fn format_leaks(output: &str) -> Option<String> {
    let mut body = String::new();
    let mut count = 0;

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !FINDING_FIELDS.iter().any(|f| line.contains(f)) {
            continue;
        }
        let starts_finding = line.contains("Finding:");
        if starts_finding && count > 0 {
            body.push('\n');
        }
        body.push_str(line);
        body.push('\n');
        if starts_finding {
            count += 1;
        }
    }

    (count > 0).then(|| format!("Found {count} secret(s):\n{body}"))
}

struct Gitleaks {
    config: Option<PathBuf>,
}

impl Validator for Gitleaks {
    fn tool(&self) -> &str {
        "gitleaks"
    }

    fn command(&self, group: &FileGroup, _tags: &[String]) -> CommandSpec {
        let mut cmd = CommandSpec::new("gitleaks")
            .current_dir(&group.repo_root)
            .args(["detect", "--no-git", "--source"])
            .arg(group.repo_root.to_string_lossy())
            .arg("--verbose");
        if let Some(config) = &self.config {
            cmd = cmd.arg("--config").arg(config.to_string_lossy());
        }
        cmd
    }

    fn findings(&self, output: &ProcessOutput) -> Option<String> {
        let combined = output.combined();
        if !combined.contains("leaks found") && !combined.contains("Finding:") {
            return None;
        }
        Some(format_leaks(&combined).unwrap_or_else(|| combined.trim().to_string()))
    }

    fn constraint_candidates(&self, _group: &FileGroup) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Scans the whole working tree for committed credentials.
pub struct GitleaksCheck {
    facts: Arc<RepoFacts>,
    validation: ValidationRunner,
    timeout: Duration,
    config: Option<PathBuf>,
}

impl GitleaksCheck {
    pub fn new(facts: Arc<RepoFacts>, timeout: Duration) -> Self {
        let validation = ValidationRunner::new(facts.runner());
        Self {
            facts,
            validation,
            timeout,
            config: None,
        }
    }

    /// Explicit rules file; relative paths are resolved against the root.
    pub fn with_config(mut self, config: Option<PathBuf>) -> Self {
        self.config = config;
        self
    }

    /// The configured rules file if it exists, then `.gitleaks.toml` in the
    /// root, then in `.github/`.
    pub fn find_config(&self, repo_root: &Path) -> Option<PathBuf> {
        if let Some(custom) = &self.config {
            let path = if custom.is_absolute() {
                custom.clone()
            } else {
                repo_root.join(custom)
            };
            if path.exists() {
                return Some(path);
            }
            tracing::warn!(path = %path.display(), "gitleaks config not found, using defaults");
        }

        [
            repo_root.join(".gitleaks.toml"),
            repo_root.join(".github").join(".gitleaks.toml"),
        ]
        .into_iter()
        .find(|p| p.exists())
    }

    fn suggestion(&self, result: &AggregatedResult) -> Option<&'static str> {
        match result {
            AggregatedResult::Success => None,
            AggregatedResult::FindingsToFix { .. } => {
                Some("Remove secrets from code or add exceptions to the .gitleaks.toml allowlist.")
            }
            AggregatedResult::InfrastructureFailure { timed_out: true, .. } => {
                Some("Gitleaks timed out. Consider increasing PREHOOK_GITLEAKS_TIMEOUT.")
            }
            AggregatedResult::InfrastructureFailure { combined_text, .. } => {
                if combined_text.contains("failed to start") {
                    Some("gitleaks is not installed. See https://github.com/gitleaks/gitleaks#installation")
                } else if combined_text.contains("config")
                    && (combined_text.contains("error") || combined_text.contains("invalid"))
                {
                    Some("Fix gitleaks configuration issues. Check your .gitleaks.toml file syntax.")
                } else {
                    Some("Run 'gitleaks detect --verbose' manually to see detailed error output.")
                }
            }
        }
    }
}

#[async_trait]
impl Check for GitleaksCheck {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Scan for secrets and credentials in code"
    }

    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            name: NAME.to_string(),
            description: "Scan for secrets and credentials in code using gitleaks".to_string(),
            file_patterns: vec!["*".to_string()],
            estimated_duration: Duration::from_secs(5),
            dependencies: vec![NAME.to_string()],
            default_timeout: self.timeout,
            category: CheckCategory::Security,
            requires_files: true,
        }
    }

    fn filter_files(&self, files: &[String]) -> Vec<String> {
        files.to_vec()
    }

    async fn run(&self, deadline: Deadline, files: &[String]) -> Result<CheckOutcome> {
        if files.is_empty() {
            return Ok(CheckOutcome::passed());
        }

        let repo_root = self.facts.repo_root(deadline).await?;
        let validator = Gitleaks {
            config: self.find_config(&repo_root),
        };
        let group = FileGroup::repository(repo_root, files.to_vec());
        let outcome = self
            .validation
            .run_group(&validator, &group, &[], deadline, self.timeout)
            .await;

        let result = aggregate(&BTreeMap::from([(group.key.clone(), outcome)]));
        let mut check_outcome = CheckOutcome::new(result);
        if let Some(suggestion) = self.suggestion(&check_outcome.result) {
            check_outcome = check_outcome
                .with_suggestion(suggestion)
                .with_command("gitleaks detect --no-git --verbose");
        }
        Ok(check_outcome)
    }
}
