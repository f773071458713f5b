//! prehook - pre-commit validation runner
//!
//! ## Commands
//!
//! - `run`: Run the enabled checks against staged (or given) files
//! - `list`: Show registered checks and their metadata
//! - `targets`: Show build-target capabilities of the repository

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use prehook_checks::{
    CheckReport, CheckStatus, DependencyError, Pipeline, PipelineOptions, PipelineResult, Registry,
};
use prehook_core::{git, CapabilityInfo, Config, Deadline, RepoFacts, TokioCommandRunner};
use serde::Serialize;
use tracing::Level;

#[derive(Parser)]
#[command(name = "prehook")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pre-commit validation runner for Go repositories", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run checks against changed files
    Run {
        /// Files to check, relative to the repository root (default: staged files)
        files: Vec<String>,

        /// Check every tracked file
        #[arg(long, conflicts_with = "files")]
        all_files: bool,

        /// Run only these checks (comma-separated)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Skip these checks (comma-separated, `all` skips everything)
        #[arg(long, value_delimiter = ',')]
        skip: Vec<String>,

        /// Run checks one at a time and stop at the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Maximum concurrent checks (default: PREHOOK_PARALLEL_WORKERS)
        #[arg(long, default_value = "0")]
        parallel: usize,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        report: ReportFormat,
    },

    /// List registered checks
    List {
        #[arg(long, value_enum, default_value = "text")]
        report: ReportFormat,
    },

    /// Show build targets known to the repository
    Targets {
        /// Targets to look up (default: every discoverable target)
        names: Vec<String>,

        #[arg(long, value_enum, default_value = "text")]
        report: ReportFormat,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct TargetsReport {
    targets: Vec<CapabilityInfo>,
    missing_dependencies: Vec<DependencyError>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    prehook_core::init_tracing(cli.json, level);

    let config = Config::from_env().context("Failed to load prehook configuration")?;
    let facts = Arc::new(RepoFacts::new(Arc::new(TokioCommandRunner)));
    let registry = Arc::new(Registry::with_config(&config, facts.clone()));

    match cli.command {
        Commands::Run {
            files,
            all_files,
            only,
            skip,
            fail_fast,
            parallel,
            report,
        } => {
            let files = collect_files(&facts, &config, files, all_files).await?;
            let options = PipelineOptions {
                files,
                only,
                skip,
                fail_fast,
                parallel,
            };
            cmd_run(Pipeline::new(registry, config), options, report).await
        }
        Commands::List { report } => cmd_list(&registry, report),
        Commands::Targets { names, report } => cmd_targets(&registry, &facts, names, report).await,
    }
}

async fn collect_files(
    facts: &RepoFacts,
    config: &Config,
    files: Vec<String>,
    all_files: bool,
) -> Result<Vec<String>> {
    if !files.is_empty() {
        return Ok(files);
    }

    let deadline = Deadline::after(config.timeout);
    let root: PathBuf = facts
        .repo_root(deadline)
        .await
        .context("Failed to locate the git repository")?;
    let runner = facts.runner();

    if all_files {
        git::tracked_files(runner.as_ref(), &root, deadline)
            .await
            .context("Failed to list tracked files")
    } else {
        git::staged_files(runner.as_ref(), &root, deadline)
            .await
            .context("Failed to list staged files")
    }
}

async fn cmd_run(pipeline: Pipeline, options: PipelineOptions, report: ReportFormat) -> Result<()> {
    if options.files.is_empty() {
        println!("No files to check.");
        return Ok(());
    }

    let result = pipeline
        .run(options)
        .await
        .context("Pre-commit pipeline failed to run")?;

    match report {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        ReportFormat::Text => print_result(&result),
    }

    if result.success {
        Ok(())
    } else {
        anyhow::bail!("{} check(s) failed", result.failed_count())
    }
}

fn print_result(result: &PipelineResult) {
    for check in &result.checks {
        print_report(check);
    }

    println!();
    println!(
        "Summary: {} passed, {} failed, {} skipped ({} files, {}ms)",
        result.passed_count(),
        result.failed_count(),
        result.skipped_count(),
        result.total_files,
        result.duration_ms
    );
    if result.success {
        println!("✓ All checks passed!");
    }
}

fn print_report(check: &CheckReport) {
    let mark = match check.status {
        CheckStatus::Passed => "✓",
        CheckStatus::Skipped => "-",
        CheckStatus::FindingsToFix | CheckStatus::InfrastructureFailure => "✗",
    };
    println!("{mark} {} ({}ms)", check.name, check.duration_ms);

    if !check.status.is_failure() {
        return;
    }
    if let Some(message) = &check.message {
        for line in message.lines() {
            println!("    {line}");
        }
    }
    if let Some(suggestion) = &check.suggestion {
        println!("  Suggestion: {suggestion}");
    }
    if let Some(command) = &check.command {
        println!("  Command: {command}");
    }
}

fn cmd_list(registry: &Registry, report: ReportFormat) -> Result<()> {
    let metadata = registry.metadata();
    if report == ReportFormat::Json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    println!("Registered checks:");
    for meta in &metadata {
        println!(
            "  {:<10} [{}] {} (timeout {}s)",
            meta.name,
            meta.category.name(),
            meta.description,
            meta.default_timeout.as_secs()
        );
    }
    println!(
        "Estimated total: {}s",
        registry.estimated_duration().as_secs()
    );
    Ok(())
}

async fn cmd_targets(
    registry: &Registry,
    facts: &RepoFacts,
    names: Vec<String>,
    report: ReportFormat,
) -> Result<()> {
    let deadline = Deadline::none();
    let names = if names.is_empty() {
        facts
            .available_targets(deadline)
            .await
            .context("Failed to list build targets")?
    } else {
        names
    };

    let mut targets = Vec::with_capacity(names.len());
    for name in &names {
        targets.push(facts.capability_info(deadline, name).await);
    }
    let missing_dependencies = registry.validate_dependencies(deadline).await;

    if report == ReportFormat::Json {
        let report = TargetsReport {
            targets,
            missing_dependencies,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for info in &targets {
        let mark = if info.exists { "✓" } else { "✗" };
        match &info.error {
            Some(err) if !info.exists => println!("{mark} {:<16} {err}", info.name),
            _ => println!("{mark} {:<16} {}", info.name, info.description),
        }
    }
    if !missing_dependencies.is_empty() {
        println!();
        println!("Missing check dependencies:");
        for missing in &missing_dependencies {
            println!("  - {missing}");
        }
    }
    Ok(())
}
