//! Dependency tidiness check: `go mod tidy -diff` per owning module.
//!
//! Toolchains without `-diff` fall back to running `go mod tidy` and asking git
//! whether the manifest or checksum file changed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prehook_core::git;
use prehook_core::{
    aggregate, AggregatedResult, CommandRunner, CommandSpec, Deadline, FileGroup, FileGrouper, InvocationTarget,
    ProcessOutput, RepoFacts, Result, ValidationOutcome, ValidationRunner, Validator,
};

use crate::check::{Check, CheckCategory, CheckMetadata, CheckOutcome};

pub const NAME: &str = "mod-tidy";

const GIT_STATUS_TIMEOUT: Duration = Duration::from_secs(5);
const UNSUPPORTED_FLAG_MARKERS: [&str; 2] = ["unknown flag", "flag provided but not defined"];

fn diff_not_supported(text: &str) -> bool {
    UNSUPPORTED_FLAG_MARKERS.iter().any(|m| text.contains(m))
}

/// Diff lines from `go mod tidy -diff`, without toolchain warnings.
pub fn tidy_diff_lines(stdout: &str) -> Vec<&str> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("go: warning:"))
        .collect()
}

struct TidyDiff;

impl Validator for TidyDiff {
    fn tool(&self) -> &str {
        "go mod tidy -diff"
    }

    fn command(&self, group: &FileGroup, _tags: &[String]) -> CommandSpec {
        CommandSpec::new("go")
            .args(["mod", "tidy", "-diff"])
            .current_dir(&group.working_dir)
    }

    fn findings(&self, output: &ProcessOutput) -> Option<String> {
        if diff_not_supported(&output.stderr) {
            return None;
        }
        let lines = tidy_diff_lines(&output.stdout);
        if lines.is_empty() {
            return None;
        }
        Some(format!("go.mod or go.sum are not tidy:\n{}", lines.join("\n")))
    }

    fn constraint_candidates(&self, _group: &FileGroup) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Verifies that `go.mod`/`go.sum` of every touched module are tidy.
pub struct ModTidyCheck {
    facts: Arc<RepoFacts>,
    validation: ValidationRunner,
    timeout: Duration,
    fallback_module_dir: Option<PathBuf>,
}

impl ModTidyCheck {
    pub fn new(facts: Arc<RepoFacts>, timeout: Duration) -> Self {
        let validation = ValidationRunner::new(facts.runner());
        Self {
            facts,
            validation,
            timeout,
            fallback_module_dir: None,
        }
    }

    /// Primary module directory used when no changed file maps to a module.
    pub fn with_fallback_module_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.fallback_module_dir = dir;
        self
    }

    /// The configured module directory (or the root) when it is a module.
    fn primary_module(&self, grouper: &FileGrouper, files: &[String]) -> Option<FileGroup> {
        let root = grouper.repo_root();
        let dir = match &self.fallback_module_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        };
        if !grouper.resolver().is_module_root(&dir) {
            return None;
        }

        let key = dir
            .strip_prefix(root)
            .ok()
            .filter(|rel| !rel.as_os_str().is_empty())
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|| ".".to_string());
        Some(FileGroup {
            key,
            working_dir: dir.clone(),
            target: InvocationTarget::RecursivePackage,
            source_dir: dir,
            repo_root: root.to_path_buf(),
            files: files.to_vec(),
        })
    }

    async fn tidy_module(&self, group: &FileGroup, deadline: Deadline) -> ValidationOutcome {
        let outcome = self
            .validation
            .run_group(&TidyDiff, group, &[], deadline, self.timeout)
            .await;

        match &outcome {
            ValidationOutcome::ToolFailure { diagnostic_text } if diff_not_supported(diagnostic_text) => {
                tracing::debug!(module = %group.key, "go mod tidy -diff unsupported, falling back");
                self.legacy_tidy(&group.working_dir, deadline).await
            }
            _ => outcome,
        }
    }

    async fn legacy_tidy(&self, module_dir: &Path, deadline: Deadline) -> ValidationOutcome {
        let runner = self.facts.runner();
        let cmd = CommandSpec::new("go").args(["mod", "tidy"]).current_dir(module_dir);

        let output = match runner.run(&cmd, deadline.child(self.timeout)).await {
            Ok(output) => output,
            Err(err) => {
                return ValidationOutcome::ToolFailure {
                    diagnostic_text: err.to_string(),
                }
            }
        };
        if output.timed_out {
            return ValidationOutcome::TimedOut;
        }
        if !output.success() {
            return ValidationOutcome::ToolFailure {
                diagnostic_text: output.combined().trim().to_string(),
            };
        }

        let manifests = [PathBuf::from("go.mod"), PathBuf::from("go.sum")];
        match git::status_porcelain(
            runner.as_ref(),
            module_dir,
            &manifests,
            deadline.child(GIT_STATUS_TIMEOUT),
        )
        .await
        {
            Ok(status) if status.is_empty() => ValidationOutcome::Success,
            Ok(status) => ValidationOutcome::ReportedFindings {
                diagnostic_text: format!("go mod tidy changed module files:\n{status}"),
            },
            Err(err) => ValidationOutcome::ToolFailure {
                diagnostic_text: err.to_string(),
            },
        }
    }

    fn suggestion(&self, result: &AggregatedResult) -> Option<String> {
        let suggestion = match result {
            AggregatedResult::Success => return None,
            AggregatedResult::FindingsToFix { .. } => {
                "Run 'go mod tidy' in each module listed above and stage go.mod/go.sum.".to_string()
            }
            AggregatedResult::InfrastructureFailure { timed_out: true, .. } => format!(
                "Mod tidy timed out after {}s. Consider increasing PREHOOK_MOD_TIDY_TIMEOUT.",
                self.timeout.as_secs()
            ),
            AggregatedResult::InfrastructureFailure { combined_text, .. } => {
                if combined_text.contains("no go.mod file") {
                    "No go.mod file found. Initialize a module with 'go mod init <module-name>'."
                        .to_string()
                } else if combined_text.contains("checksum mismatch") {
                    "Module checksum verification failed. Run 'go clean -modcache' and try again."
                        .to_string()
                } else if combined_text.contains("network") || combined_text.contains("timeout") {
                    "Network error downloading modules. Check your connection and proxy settings."
                        .to_string()
                } else {
                    "Run 'go mod tidy' manually in the module directory to see detailed error output."
                        .to_string()
                }
            }
        };
        Some(suggestion)
    }
}

#[async_trait]
impl Check for ModTidyCheck {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Ensure go.mod and go.sum are tidy"
    }

    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            name: NAME.to_string(),
            description: "Ensure go.mod and go.sum are tidy in every touched module".to_string(),
            file_patterns: vec!["go.mod".to_string(), "go.sum".to_string(), "*.go".to_string()],
            estimated_duration: Duration::from_secs(5),
            dependencies: vec![NAME.to_string()],
            default_timeout: self.timeout,
            category: CheckCategory::Dependencies,
            requires_files: true,
        }
    }

    /// Manifest changes when there are any, otherwise Go sources (imports may
    /// have changed).
    fn filter_files(&self, files: &[String]) -> Vec<String> {
        let is_manifest = |f: &&String| {
            f.as_str() == "go.mod"
                || f.as_str() == "go.sum"
                || f.ends_with("/go.mod")
                || f.ends_with("/go.sum")
        };
        let manifests: Vec<String> = files.iter().filter(is_manifest).cloned().collect();
        if !manifests.is_empty() {
            return manifests;
        }
        crate::check::go_files(files)
    }

    async fn run(&self, deadline: Deadline, files: &[String]) -> Result<CheckOutcome> {
        if files.is_empty() {
            return Ok(CheckOutcome::passed());
        }

        let repo_root = self.facts.repo_root(deadline).await?;
        let grouper = FileGrouper::new(repo_root);
        let mut groups = grouper.group_by_module(files);
        if groups.is_empty() {
            match self.primary_module(&grouper, files) {
                Some(group) => {
                    groups.insert(group.key.clone(), group);
                }
                None => {
                    tracing::debug!("no Go module found, skipping mod-tidy");
                    return Ok(CheckOutcome::passed());
                }
            }
        }

        let mut outcomes = BTreeMap::new();
        for (key, group) in &groups {
            outcomes.insert(key.clone(), self.tidy_module(group, deadline).await);
        }

        let result = aggregate(&outcomes);
        let suggestion = self.suggestion(&result);
        let mut outcome = CheckOutcome::new(result);
        if let Some(suggestion) = suggestion {
            outcome = outcome
                .with_suggestion(suggestion)
                .with_command("go mod tidy -diff");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckStatus;
    use prehook_core::fakes::ScriptedRunner;
    use std::fs;

    fn module(root: &Path, rel: &str) {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("go.mod"), "module example.com/m\n").unwrap();
    }

    fn check_in(root: &Path, runner: ScriptedRunner) -> (Arc<ScriptedRunner>, ModTidyCheck) {
        let runner = Arc::new(runner);
        let facts = Arc::new(RepoFacts::with_repo_root(runner.clone(), root));
        (runner, ModTidyCheck::new(facts, Duration::from_secs(30)))
    }

    #[test]
    fn test_filter_prefers_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, check) = check_in(tmp.path(), ScriptedRunner::new());
        let files = vec!["svc/go.sum".to_string(), "svc/main.go".to_string()];
        assert_eq!(check.filter_files(&files), vec!["svc/go.sum"]);
        let files = vec!["svc/main.go".to_string(), "README.md".to_string()];
        assert_eq!(check.filter_files(&files), vec!["svc/main.go"]);
    }

    #[test]
    fn test_diff_lines_drop_warnings() {
        let out = "go: warning: ignoring go.mod in $GOPATH\n--- go.mod\n+++ go.mod\n+require x v1\n";
        assert_eq!(tidy_diff_lines(out), vec!["--- go.mod", "+++ go.mod", "+require x v1"]);
    }

    #[tokio::test]
    async fn test_untidy_module_reports_diff() {
        let tmp = tempfile::tempdir().unwrap();
        module(tmp.path(), "svc");

        let (runner, check) = check_in(
            tmp.path(),
            ScriptedRunner::new().on(
                "go",
                ProcessOutput::failed(1, "go: warning: x\n--- go.mod\n+++ go.mod\n-require y v1\n", ""),
            ),
        );
        let outcome = check
            .run(Deadline::none(), &["svc/main.go".to_string()])
            .await
            .unwrap();

        assert_eq!(outcome.status(), CheckStatus::FindingsToFix);
        let message = outcome.message().unwrap();
        assert!(message.contains("-require y v1"));
        assert!(!message.contains("go: warning"));
        assert_eq!(runner.calls()[0].working_dir, Some(tmp.path().join("svc")));
    }

    #[tokio::test]
    async fn test_falls_back_when_diff_flag_is_unknown() {
        let tmp = tempfile::tempdir().unwrap();
        module(tmp.path(), ".");

        let (runner, check) = check_in(
            tmp.path(),
            ScriptedRunner::new()
                .on_arg("go", "-diff", ProcessOutput::failed(2, "", "flag provided but not defined: -diff\n"))
                .on("go", ProcessOutput::ok(""))
                .on("git", ProcessOutput::ok(" M go.sum\n")),
        );
        let outcome = check
            .run(Deadline::none(), &["main.go".to_string()])
            .await
            .unwrap();

        assert_eq!(outcome.status(), CheckStatus::FindingsToFix);
        assert!(outcome.message().unwrap().contains("M go.sum"));
        assert_eq!(runner.call_count("go"), 2);
        assert_eq!(
            runner.calls()[2].args,
            vec!["status", "--porcelain", "--", "go.mod", "go.sum"]
        );
    }

    #[tokio::test]
    async fn test_moduleless_repo_passes() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("scripts")).unwrap();

        let (runner, check) = check_in(tmp.path(), ScriptedRunner::new());
        let outcome = check
            .run(Deadline::none(), &["scripts/gen.go".to_string()])
            .await
            .unwrap();
        assert_eq!(outcome.status(), CheckStatus::Passed);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_configured_primary_module_is_used_for_orphans() {
        let tmp = tempfile::tempdir().unwrap();
        let outer = tmp.path().join("outer");
        let repo = outer.join("repo");
        fs::create_dir_all(repo.join("scripts")).unwrap();
        module(&outer, ".");

        let (runner, check) = check_in(&repo, ScriptedRunner::new().on("go", ProcessOutput::ok("")));
        let check = check.with_fallback_module_dir(Some(outer.clone()));
        let outcome = check
            .run(Deadline::none(), &["scripts/gen.go".to_string()])
            .await
            .unwrap();

        assert_eq!(outcome.status(), CheckStatus::Passed);
        assert_eq!(runner.calls()[0].working_dir, Some(outer));
    }

    #[tokio::test]
    async fn test_checksum_mismatch_suggestion() {
        let tmp = tempfile::tempdir().unwrap();
        module(tmp.path(), ".");

        let (_, check) = check_in(
            tmp.path(),
            ScriptedRunner::new().on(
                "go",
                ProcessOutput::failed(1, "", "verifying example.com/x@v1.0.0: checksum mismatch\n"),
            ),
        );
        let outcome = check
            .run(Deadline::none(), &["go.sum".to_string()])
            .await
            .unwrap();
        assert_eq!(outcome.status(), CheckStatus::InfrastructureFailure);
        assert!(outcome.suggestion.unwrap().contains("go clean -modcache"));
    }
}
