//! End-to-end orchestration: grouping, validation with retry, aggregation and
//! the shared facts cache, driven by a scripted process runner.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use prehook_core::fakes::ScriptedRunner;
use prehook_core::{
    aggregate, AggregatedResult, CommandSpec, Deadline, FileGroup, FileGrouper, ModuleResolver,
    ProcessOutput, RepoFacts, ValidationOutcome, ValidationRunner, Validator,
};

struct GolangciLint;

impl Validator for GolangciLint {
    fn tool(&self) -> &str {
        "golangci-lint"
    }

    fn command(&self, group: &FileGroup, tags: &[String]) -> CommandSpec {
        let mut cmd = CommandSpec::new("golangci-lint")
            .current_dir(&group.working_dir)
            .arg("run");
        if !tags.is_empty() {
            cmd = cmd.args(["--build-tags", &tags.join(",")]);
        }
        cmd.arg(group.target.to_string())
    }
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn files(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

async fn validate_all(
    runner: Arc<ScriptedRunner>,
    groups: &BTreeMap<String, FileGroup>,
) -> BTreeMap<String, ValidationOutcome> {
    let validation = ValidationRunner::new(runner);
    let mut outcomes = BTreeMap::new();
    for (key, group) in groups {
        let outcome = validation
            .run_group(
                &GolangciLint,
                group,
                &[],
                Deadline::after(Duration::from_secs(30)),
                Duration::from_secs(10),
            )
            .await;
        outcomes.insert(key.clone(), outcome);
    }
    outcomes
}

#[test]
fn find_module_root_holds_for_every_depth_and_boundary() {
    let tmp = tempfile::tempdir().unwrap();
    let module = tmp.path().join("m");
    write(&module, "go.mod", "module example.com/m\n");
    let resolver = ModuleResolver::go();

    let mut dir = module.clone();
    for depth in 0..5 {
        if depth > 0 {
            dir = dir.join(format!("d{depth}"));
            fs::create_dir_all(&dir).unwrap();
        }
        for boundary in [tmp.path(), module.as_path()] {
            assert_eq!(
                resolver.find_module_root(&dir, boundary),
                Some(module.clone()),
                "depth {depth}, boundary {}",
                boundary.display()
            );
        }
        // A boundary below the module root hides it.
        if depth > 0 {
            assert_eq!(resolver.find_module_root(&dir, &dir), None);
        }
    }
}

#[tokio::test]
async fn nested_package_is_validated_from_its_module() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "pkg/go.mod", "module example.com/pkg\n");
    write(tmp.path(), "pkg/a/x.go", "package a\n");
    write(tmp.path(), "pkg/a/y.go", "package a\n");

    let groups = FileGrouper::new(tmp.path()).resolve_groups(&files(&["pkg/a/x.go", "pkg/a/y.go"]));
    assert_eq!(groups.len(), 1);
    let group = &groups["pkg/a"];
    assert_eq!(group.working_dir, tmp.path().join("pkg"));
    assert_eq!(group.target.to_string(), "./a/...");

    let runner = Arc::new(ScriptedRunner::new().on("golangci-lint", ProcessOutput::ok("")));
    let outcomes = validate_all(runner.clone(), &groups).await;
    assert_eq!(aggregate(&outcomes), AggregatedResult::Success);

    let calls = runner.calls();
    assert_eq!(calls[0].working_dir.as_deref(), Some(tmp.path().join("pkg").as_path()));
    assert_eq!(calls[0].args, vec!["run", "./a/..."]);
}

#[tokio::test]
async fn constraint_excluded_group_recovers_with_detected_tag() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "go.mod", "module example.com/root\n");
    write(tmp.path(), "tools/tools.go", "//go:build tools\n\npackage tools\n");

    let groups = FileGrouper::new(tmp.path()).resolve_groups(&files(&["tools/tools.go"]));
    let runner = Arc::new(ScriptedRunner::new().on_sequence(
        "golangci-lint",
        vec![
            ProcessOutput::failed(
                1,
                "",
                "ERRO Running error: context loading failed: no go files to analyze: build constraints exclude all Go files in tools\n",
            ),
            ProcessOutput::ok(""),
        ],
    ));

    let outcomes = validate_all(runner.clone(), &groups).await;
    assert_eq!(outcomes["tools"], ValidationOutcome::Success);
    assert_eq!(aggregate(&outcomes), AggregatedResult::Success);
    assert_eq!(
        runner.calls()[1].args,
        vec!["run", "--build-tags", "tools", "./tools/..."]
    );
}

#[tokio::test]
async fn mixed_groups_escalate_to_infrastructure_failure() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "api/go.mod", "module example.com/api\n");
    write(tmp.path(), "web/go.mod", "module example.com/web\n");
    write(tmp.path(), "scripts/gen.go", "package main\n");

    let input = files(&["api/handler.go", "web/server.go", "scripts/gen.go"]);
    let groups = FileGrouper::new(tmp.path()).resolve_groups(&input);
    assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["api", "web"]);

    // Both groups target ./..., so answers are scripted in key order.
    let runner = Arc::new(ScriptedRunner::new().on_sequence(
        "golangci-lint",
        vec![
            ProcessOutput::failed(
                1,
                "\x1b[1mhandler.go:7:2\x1b[0m: ineffectual assignment (ineffassign)\n",
                "",
            ),
            ProcessOutput::failed(2, "", "Error: can't load config: unknown linter 'foo'\n"),
        ],
    ));

    let outcomes = validate_all(runner, &groups).await;
    match aggregate(&outcomes) {
        AggregatedResult::InfrastructureFailure { combined_text, timed_out } => {
            assert!(!timed_out);
            assert!(combined_text.contains("Directory api:\nFound 1 issue(s):\nhandler.go:7:2: ineffectual assignment"));
            assert!(combined_text.contains("Directory web:\nError: can't load config"));
            assert!(!combined_text.contains('\x1b'));
        }
        other => panic!("expected infrastructure failure, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_build_target_is_probed_once() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .on("git", ProcessOutput::ok("/work/repo\n"))
            .on_arg(
                "make",
                "-n",
                ProcessOutput::failed(2, "", "make: *** No rule to make target 'fumpt'.  Stop.\n"),
            ),
    );
    let facts = Arc::new(RepoFacts::new(runner.clone()));

    let first = facts.capability_info(Deadline::none(), "fumpt").await;
    assert!(!first.exists);
    assert!(first.error.as_ref().unwrap().to_string().contains("not found"));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let facts = Arc::clone(&facts);
            tokio::spawn(async move { facts.capability_info(Deadline::none(), "fumpt").await })
        })
        .collect();
    for handle in handles {
        let again = handle.await.unwrap();
        assert_eq!(again.error, first.error);
        assert_eq!(again.last_checked, first.last_checked);
    }

    assert_eq!(runner.call_count_with_arg("make", "-n"), 1);
    assert_eq!(runner.call_count("git"), 1);
}
