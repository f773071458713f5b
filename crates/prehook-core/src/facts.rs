//! Cached repository facts shared by every check in one pre-commit run.
//!
//! [`RepoFacts`] resolves the repository root at most once (a failed
//! resolution is cached exactly like a successful one) and keeps a TTL cache of
//! build-target capabilities. One instance is created per run and handed to all
//! checks by `Arc`, so concurrent checks amortize the probes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::deadline::Deadline;
use crate::error::{CapabilityError, PrehookError, Result};
use crate::git;
use crate::obs;
use crate::process::{CommandRunner, CommandSpec, ProcessOutput};

/// How long a capability entry stays fresh.
pub const CAPABILITY_TTL: Duration = Duration::from_secs(5 * 60);

const REPO_ROOT_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const DESCRIPTION_TIMEOUT: Duration = Duration::from_secs(2);
const DESCRIPTION_MIN_BUDGET: Duration = Duration::from_millis(50);
const TARGET_LIST_TIMEOUT: Duration = Duration::from_secs(5);

const NO_RULE_MARKER: &str = "No rule to make target";
const FALLBACK_TARGETS: &[&str] = &["help", "build", "test", "clean", "install"];

/// Cached knowledge about one named build target.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityInfo {
    pub name: String,
    pub exists: bool,
    pub description: String,
    pub error: Option<CapabilityError>,
    pub last_checked: DateTime<Utc>,
    #[serde(skip)]
    checked_at: Instant,
}

impl CapabilityInfo {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            exists: false,
            description: String::new(),
            error: None,
            last_checked: Utc::now(),
            checked_at: Instant::now(),
        }
    }

    /// Whether the entry is younger than `ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.checked_at.elapsed() < ttl
    }
}

/// Repository root and capability cache.
pub struct RepoFacts {
    runner: Arc<dyn CommandRunner>,
    start_dir: Option<PathBuf>,
    ttl: Duration,
    repo_root: OnceCell<std::result::Result<PathBuf, String>>,
    capabilities: RwLock<HashMap<String, CapabilityInfo>>,
}

impl RepoFacts {
    /// Facts for the repository containing the current directory.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            start_dir: None,
            ttl: CAPABILITY_TTL,
            repo_root: OnceCell::new(),
            capabilities: RwLock::new(HashMap::new()),
        }
    }

    /// Facts with an already known repository root; no git query is made.
    pub fn with_repo_root(runner: Arc<dyn CommandRunner>, root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: OnceCell::new_with(Some(Ok(root.into()))),
            ..Self::new(runner)
        }
    }

    /// Resolve the repository from `dir` instead of the current directory.
    pub fn with_start_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.start_dir = Some(dir.into());
        self
    }

    /// Override the capability TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The process runner shared with the checks.
    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.runner)
    }

    /// Repository root, resolved at most once.
    ///
    /// Concurrent callers wait for the first resolution and all receive the
    /// same value, including the same error when resolution failed.
    pub async fn repo_root(&self, deadline: Deadline) -> Result<PathBuf> {
        let resolved = self
            .repo_root
            .get_or_init(|| async {
                let result = git::show_toplevel(
                    self.runner.as_ref(),
                    self.start_dir.as_deref(),
                    deadline.child(REPO_ROOT_TIMEOUT),
                )
                .await;
                match result {
                    Ok(root) => {
                        tracing::debug!(repo_root = %root.display(), "resolved repository root");
                        Ok(root)
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "repository root resolution failed");
                        Err(err.to_string())
                    }
                }
            })
            .await;

        resolved
            .clone()
            .map_err(PrehookError::RepoRootUnresolvable)
    }

    /// Capability info for a build target, probing at most once per TTL.
    ///
    /// Concurrent lookups of different names never block each other; two
    /// lookups of the same stale name may both probe and the last write wins.
    pub async fn capability_info(&self, deadline: Deadline, name: &str) -> CapabilityInfo {
        if let Some(info) = self.cached(name) {
            obs::emit_capability_probed(name, info.exists, true);
            return info;
        }

        let mut info = CapabilityInfo::new(name);

        let repo_root = match self.repo_root(deadline).await {
            Ok(root) => root,
            Err(err) => {
                info.error = Some(CapabilityError::RepoRoot {
                    message: err.to_string(),
                });
                self.store(info.clone());
                return info;
            }
        };

        let probe_deadline = deadline.child(PROBE_TIMEOUT);
        let probe = CommandSpec::new("make")
            .args(["-n", name])
            .current_dir(&repo_root);

        match self.runner.run(&probe, probe_deadline).await {
            Ok(output) if output.success() => {
                info.exists = true;
                info.description = self.describe(&repo_root, name, probe_deadline).await;
            }
            Ok(output) => {
                info.error = Some(classify_probe_failure(name, &output));
            }
            Err(err) => {
                info.error = Some(CapabilityError::Probe {
                    name: name.to_string(),
                    message: err.to_string(),
                });
            }
        }

        obs::emit_capability_probed(name, info.exists, false);
        self.store(info.clone());
        info
    }

    /// Whether a build target exists.
    pub async fn has_capability(&self, deadline: Deadline, name: &str) -> bool {
        self.capability_info(deadline, name).await.exists
    }

    /// Capability info for a target that must exist; a missing target is an
    /// error carrying the lookup's cause.
    pub async fn require_capability(
        &self,
        deadline: Deadline,
        name: &str,
    ) -> Result<CapabilityInfo> {
        let info = self.capability_info(deadline, name).await;
        if info.exists {
            return Ok(info);
        }
        let cause = info.error.unwrap_or_else(|| CapabilityError::NotFound {
            name: name.to_string(),
        });
        Err(cause.into())
    }

    /// Every target the build configuration declares.
    ///
    /// Falls back to a conventional list when listing fails or the root query
    /// timed out; a repository that cannot be found is an error.
    pub async fn available_targets(&self, deadline: Deadline) -> Result<Vec<String>> {
        let repo_root = match self.repo_root(deadline).await {
            Ok(root) => root,
            Err(err) if err.to_string().contains("timed out") => {
                return Ok(fallback_targets());
            }
            Err(err) => return Err(err),
        };

        let cmd = CommandSpec::new("make").arg("-qp").current_dir(&repo_root);
        match self.runner.run(&cmd, deadline.child(TARGET_LIST_TIMEOUT)).await {
            Ok(output) if !output.timed_out && !output.stdout.trim().is_empty() => {
                Ok(parse_make_targets(&output.stdout))
            }
            Ok(_) | Err(_) => Ok(fallback_targets()),
        }
    }

    /// Run a build target from the repository root.
    pub async fn execute_target(
        &self,
        deadline: Deadline,
        name: &str,
        timeout: Duration,
    ) -> Result<ProcessOutput> {
        let repo_root = self.repo_root(deadline).await?;
        let cmd = CommandSpec::new("make").arg(name).current_dir(&repo_root);
        self.runner.run(&cmd, deadline.child(timeout)).await
    }

    fn cached(&self, name: &str) -> Option<CapabilityInfo> {
        let guard = self
            .capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        guard
            .get(name)
            .filter(|info| info.is_fresh(self.ttl))
            .cloned()
    }

    fn store(&self, info: CapabilityInfo) {
        let mut guard = self
            .capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.insert(info.name.clone(), info);
    }

    /// Best-effort description from `make help`; skipped when the parent
    /// budget is nearly spent.
    async fn describe(&self, repo_root: &std::path::Path, name: &str, parent: Deadline) -> String {
        if parent.is_expired() {
            return String::new();
        }
        if matches!(parent.remaining(), Some(left) if left < DESCRIPTION_MIN_BUDGET) {
            return String::new();
        }

        let help = CommandSpec::new("make").arg("help").current_dir(repo_root);
        let output = match self.runner.run(&help, parent.child(DESCRIPTION_TIMEOUT)).await {
            Ok(output) if output.success() => output,
            _ => return String::new(),
        };

        if let Some(desc) = description_from_help(&output.stdout, name) {
            return desc;
        }
        if parent.is_expired() {
            return String::new();
        }
        conventional_description(name)
            .map(str::to_string)
            .unwrap_or_default()
    }
}

fn classify_probe_failure(name: &str, output: &ProcessOutput) -> CapabilityError {
    let combined = output.combined();
    if combined.contains(NO_RULE_MARKER) {
        CapabilityError::NotFound {
            name: name.to_string(),
        }
    } else if output.timed_out {
        CapabilityError::ProbeTimeout {
            name: name.to_string(),
        }
    } else {
        CapabilityError::Probe {
            name: name.to_string(),
            message: format!(
                "exit code {}: {}",
                output.exit_code.unwrap_or(-1),
                combined.trim()
            ),
        }
    }
}

fn fallback_targets() -> Vec<String> {
    FALLBACK_TARGETS.iter().map(|t| t.to_string()).collect()
}

fn description_from_help(help: &str, target: &str) -> Option<String> {
    help.lines()
        .filter_map(|line| line.split_once(target).map(|(_, rest)| rest))
        .map(|rest| {
            rest.trim()
                .trim_start_matches([':', '-'])
                .trim()
                .to_string()
        })
        .find(|desc| !desc.is_empty())
}

fn conventional_description(target: &str) -> Option<&'static str> {
    let desc = match target {
        "fumpt" => "Format Go code with gofumpt",
        "lint" => "Run golangci-lint on Go code",
        "mod-tidy" => "Tidy Go module dependencies",
        "test" => "Run tests",
        "build" => "Build the project",
        "clean" => "Clean build artifacts",
        "install" => "Install dependencies",
        "help" => "Show help information",
        "format" => "Format source code",
        "check" => "Run checks",
        "validate" => "Validate code",
        "generate" => "Generate code",
        "docs" => "Generate documentation",
        "coverage" => "Generate test coverage",
        "benchmark" => "Run benchmarks",
        _ => return None,
    };
    Some(desc)
}

/// Target names from `make -qp` database output, first occurrence order.
pub fn parse_make_targets(output: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut targets = Vec::new();

    for raw in output.lines() {
        if raw.starts_with('\t') {
            continue;
        }
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.contains('=') {
            continue;
        }
        let Some((target, _)) = line.split_once(':') else {
            continue;
        };
        let target = target.trim();
        if target.is_empty()
            || target.starts_with('.')
            || target.contains('/')
            || target.contains('%')
        {
            continue;
        }
        if seen.insert(target.to_string()) {
            targets.push(target.to_string());
        }
    }

    targets
}
