//! Version-control facility: repository root, staged files, file status.

use std::path::{Path, PathBuf};

use crate::deadline::Deadline;
use crate::error::{PrehookError, Result};
use crate::process::{CommandRunner, CommandSpec};

fn git(dir: Option<&Path>) -> CommandSpec {
    let cmd = CommandSpec::new("git");
    match dir {
        Some(dir) => cmd.current_dir(dir),
        None => cmd,
    }
}

async fn run_git(runner: &dyn CommandRunner, cmd: CommandSpec, deadline: Deadline) -> Result<String> {
    let display = cmd.display();
    let output = runner.run(&cmd, deadline).await.map_err(|e| match e {
        PrehookError::Spawn { source, .. } => {
            PrehookError::Git(format!("failed to run git: {source}"))
        }
        other => other,
    })?;

    if output.timed_out {
        return Err(PrehookError::Git(format!("{display} timed out")));
    }
    if !output.success() {
        return Err(PrehookError::Git(format!(
            "{display} failed: {}",
            output.stderr.trim()
        )));
    }
    Ok(output.stdout)
}

fn lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Top-level working directory of the repository containing `dir`.
///
/// Runs `git rev-parse --show-toplevel`.
pub async fn show_toplevel(
    runner: &dyn CommandRunner,
    dir: Option<&Path>,
    deadline: Deadline,
) -> Result<PathBuf> {
    let stdout = run_git(
        runner,
        git(dir).args(["rev-parse", "--show-toplevel"]),
        deadline,
    )
    .await?;

    let root = stdout.trim();
    if root.is_empty() {
        return Err(PrehookError::Git(
            "git rev-parse --show-toplevel returned empty output".to_string(),
        ));
    }
    Ok(PathBuf::from(root))
}

/// Staged added/copied/modified/renamed files, relative to the repository root.
pub async fn staged_files(
    runner: &dyn CommandRunner,
    repo_root: &Path,
    deadline: Deadline,
) -> Result<Vec<String>> {
    let stdout = run_git(
        runner,
        git(Some(repo_root)).args(["diff", "--cached", "--name-only", "--diff-filter=ACMR"]),
        deadline,
    )
    .await?;
    Ok(lines(&stdout))
}

/// Every tracked file, relative to the repository root.
pub async fn tracked_files(
    runner: &dyn CommandRunner,
    repo_root: &Path,
    deadline: Deadline,
) -> Result<Vec<String>> {
    let stdout = run_git(runner, git(Some(repo_root)).arg("ls-files"), deadline).await?;
    Ok(lines(&stdout))
}

/// `git status --porcelain` restricted to `paths`. Empty when unchanged.
pub async fn status_porcelain(
    runner: &dyn CommandRunner,
    dir: &Path,
    paths: &[PathBuf],
    deadline: Deadline,
) -> Result<String> {
    let mut cmd = git(Some(dir)).args(["status", "--porcelain", "--"]);
    for path in paths {
        cmd = cmd.arg(path.to_string_lossy());
    }
    let stdout = run_git(runner, cmd, deadline).await?;
    Ok(stdout.trim().to_string())
}
