//! Partitioning changed files into validation groups.
//!
//! Files are first grouped by containing directory; each directory is then
//! resolved to the working directory and invocation target the validator
//! needs for full module context. Directories that belong to no module are
//! dropped without error.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::module::ModuleResolver;
use crate::obs;

/// Key used for files at the repository root.
pub const ROOT_KEY: &str = ".";

/// What the validator is pointed at, relative to the group's working directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum InvocationTarget {
    /// The whole module (`./...`).
    RecursivePackage,

    /// A directory below the module root and everything under it (`./rel/...`).
    SubPackage(String),

    /// A single directory (`./rel`).
    Directory(String),
}

impl fmt::Display for InvocationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationTarget::RecursivePackage => write!(f, "./..."),
            InvocationTarget::SubPackage(rel) => write!(f, "./{rel}/..."),
            InvocationTarget::Directory(rel) if rel == ROOT_KEY => write!(f, "."),
            InvocationTarget::Directory(rel) => write!(f, "./{rel}"),
        }
    }
}

/// A batch of files validated by one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileGroup {
    /// Directory (or module) path relative to the repository root.
    pub key: String,

    /// Absolute directory the tool is run from.
    pub working_dir: PathBuf,

    pub target: InvocationTarget,

    /// Absolute directory the member files live in.
    pub source_dir: PathBuf,

    /// Absolute repository root.
    pub repo_root: PathBuf,

    /// Member files, relative to the repository root, in input order.
    pub files: Vec<String>,
}

impl FileGroup {
    /// One group covering the whole repository, run from its root.
    pub fn repository(repo_root: impl Into<PathBuf>, files: Vec<String>) -> Self {
        let repo_root = repo_root.into();
        Self {
            key: ROOT_KEY.to_string(),
            working_dir: repo_root.clone(),
            target: InvocationTarget::Directory(ROOT_KEY.to_string()),
            source_dir: repo_root.clone(),
            repo_root,
            files,
        }
    }

    /// Absolute paths of the member files.
    pub fn member_paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| self.repo_root.join(f)).collect()
    }
}

/// Builds [`FileGroup`]s for one repository.
#[derive(Debug, Clone)]
pub struct FileGrouper {
    repo_root: PathBuf,
    resolver: ModuleResolver,
    fallback_module_dir: Option<PathBuf>,
}

impl FileGrouper {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            resolver: ModuleResolver::go(),
            fallback_module_dir: None,
        }
    }

    pub fn with_resolver(mut self, resolver: ModuleResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Module directory used for directories outside every discovered module.
    /// Relative paths are taken from the repository root.
    pub fn with_fallback_module_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.fallback_module_dir = dir.map(|d| {
            if d.is_absolute() {
                d
            } else {
                self.repo_root.join(d)
            }
        });
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn resolver(&self) -> &ModuleResolver {
        &self.resolver
    }

    /// Files keyed by their containing directory relative to the root.
    pub fn group_by_directory(&self, files: &[String]) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for file in files {
            groups.entry(directory_key(file)).or_default().push(file.clone());
        }
        groups
    }

    /// Directory groups resolved to working directories and targets.
    ///
    /// Directories with no enclosing module (and outside the fallback module)
    /// are left out of the result.
    pub fn resolve_groups(&self, files: &[String]) -> BTreeMap<String, FileGroup> {
        let mut resolved = BTreeMap::new();
        for (key, members) in self.group_by_directory(files) {
            if let Some(group) = self.resolve_directory(&key, members) {
                resolved.insert(key, group);
            }
        }
        resolved
    }

    /// Files keyed by their owning module, each group targeting the whole
    /// module. Files outside every module are left out.
    pub fn group_by_module(&self, files: &[String]) -> BTreeMap<String, FileGroup> {
        let mut groups: BTreeMap<String, FileGroup> = BTreeMap::new();

        for (key, members) in self.group_by_directory(files) {
            let dir = self.absolute(&key);
            let Some(module_root) = self.resolver.find_module_root(&dir, &self.repo_root) else {
                tracing::debug!(directory = %key, "no module owns directory, skipping");
                obs::emit_group_skipped(&key, "no enclosing module");
                continue;
            };

            let module_key = self.relative_key(&module_root);
            groups
                .entry(module_key.clone())
                .or_insert_with(|| FileGroup {
                    key: module_key,
                    working_dir: module_root.clone(),
                    target: InvocationTarget::RecursivePackage,
                    source_dir: module_root.clone(),
                    repo_root: self.repo_root.clone(),
                    files: Vec::new(),
                })
                .files
                .extend(members);
        }
        groups
    }

    fn resolve_directory(&self, key: &str, files: Vec<String>) -> Option<FileGroup> {
        let dir = self.absolute(key);

        let (working_dir, target) = if self.resolver.is_module_root(&dir) {
            (dir.clone(), InvocationTarget::RecursivePackage)
        } else if let Some(module_root) = self.resolver.find_module_root(&dir, &self.repo_root) {
            let rel = relative_slash_path(&dir, &module_root)?;
            (module_root, InvocationTarget::SubPackage(rel))
        } else if let Some(fallback) = self.fallback_for(&dir) {
            let rel = relative_slash_path(&dir, &fallback)?;
            (fallback, InvocationTarget::Directory(rel))
        } else {
            tracing::debug!(directory = %key, "no module owns directory, skipping");
            obs::emit_group_skipped(key, "no enclosing module");
            return None;
        };

        Some(FileGroup {
            key: key.to_string(),
            working_dir,
            target,
            source_dir: dir,
            repo_root: self.repo_root.clone(),
            files,
        })
    }

    fn fallback_for(&self, dir: &Path) -> Option<PathBuf> {
        let fallback = self.fallback_module_dir.as_ref()?;
        if self.resolver.is_module_root(fallback) && dir.starts_with(fallback) {
            Some(fallback.clone())
        } else {
            None
        }
    }

    fn absolute(&self, key: &str) -> PathBuf {
        if key == ROOT_KEY {
            self.repo_root.clone()
        } else {
            self.repo_root.join(key)
        }
    }

    fn relative_key(&self, dir: &Path) -> String {
        relative_slash_path(dir, &self.repo_root).unwrap_or_else(|| ROOT_KEY.to_string())
    }
}

/// Containing directory of a relative file path, `"."` at the root.
pub fn directory_key(file: &str) -> String {
    match Path::new(file).parent() {
        Some(parent) => {
            let key = slash_path(parent);
            if key.is_empty() {
                ROOT_KEY.to_string()
            } else {
                key
            }
        }
        None => ROOT_KEY.to_string(),
    }
}

/// `path` relative to `base` with `/` separators; `"."` when equal.
fn relative_slash_path(path: &Path, base: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    if rel.as_os_str().is_empty() {
        Some(ROOT_KEY.to_string())
    } else {
        Some(slash_path(rel))
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::CurDir => None,
            other => Some(other.as_os_str().to_string_lossy().into_owned()),
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::GO_MANIFEST;
    use std::collections::BTreeSet;
    use std::fs;

    fn manifest(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(GO_MANIFEST), "module example.com/m\n").unwrap();
    }

    fn files(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_directory_key() {
        assert_eq!(directory_key("main.go"), ".");
        assert_eq!(directory_key("pkg/a/x.go"), "pkg/a");
        assert_eq!(directory_key("./cmd/tool.go"), "cmd");
        assert_eq!(directory_key("./main.go"), ".");
    }

    #[test]
    fn test_target_display() {
        assert_eq!(InvocationTarget::RecursivePackage.to_string(), "./...");
        assert_eq!(InvocationTarget::SubPackage("a/b".into()).to_string(), "./a/b/...");
        assert_eq!(InvocationTarget::Directory("a".into()).to_string(), "./a");
        assert_eq!(InvocationTarget::Directory(".".into()).to_string(), ".");
    }

    #[test]
    fn test_group_by_directory() {
        let grouper = FileGrouper::new("/repo");
        let groups = grouper.group_by_directory(&files(&["a/x.go", "b/y.go", "a/z.go", "top.go"]));
        assert_eq!(groups["a"], files(&["a/x.go", "a/z.go"]));
        assert_eq!(groups["b"], files(&["b/y.go"]));
        assert_eq!(groups["."], files(&["top.go"]));
    }

    #[test]
    fn test_subdirectory_resolves_to_enclosing_module() {
        let tmp = tempfile::tempdir().unwrap();
        manifest(&tmp.path().join("pkg"));
        fs::create_dir_all(tmp.path().join("pkg/a")).unwrap();

        let grouper = FileGrouper::new(tmp.path());
        let groups = grouper.resolve_groups(&files(&["pkg/a/x.go", "pkg/a/y.go"]));

        assert_eq!(groups.len(), 1);
        let group = &groups["pkg/a"];
        assert_eq!(group.working_dir, tmp.path().join("pkg"));
        assert_eq!(group.target.to_string(), "./a/...");
        assert_eq!(group.files, files(&["pkg/a/x.go", "pkg/a/y.go"]));
    }

    #[test]
    fn test_module_root_directory_targets_whole_module() {
        let tmp = tempfile::tempdir().unwrap();
        manifest(&tmp.path().join("svc"));

        let grouper = FileGrouper::new(tmp.path());
        let groups = grouper.resolve_groups(&files(&["svc/main.go", "svc/util.go"]));
        let group = &groups["svc"];
        assert_eq!(group.working_dir, tmp.path().join("svc"));
        assert_eq!(group.target, InvocationTarget::RecursivePackage);
    }

    #[test]
    fn test_moduleless_directories_are_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        manifest(&tmp.path().join("svc"));
        fs::create_dir_all(tmp.path().join("scripts")).unwrap();

        let grouper = FileGrouper::new(tmp.path());
        let groups = grouper.resolve_groups(&files(&["svc/main.go", "scripts/gen.go"]));
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["svc"]);
    }

    #[test]
    fn test_fallback_module_dir_applies_to_moduleless_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let outer = tmp.path().join("outer");
        let repo = outer.join("repo");
        fs::create_dir_all(repo.join("tools")).unwrap();
        manifest(&outer);

        // The fallback lies outside the repo, so the bounded walk cannot reach it.
        let grouper = FileGrouper::new(&repo).with_fallback_module_dir(Some(outer.clone()));
        let groups = grouper.resolve_groups(&files(&["tools/gen.go"]));
        let group = &groups["tools"];
        assert_eq!(group.working_dir, outer);
        assert_eq!(group.target, InvocationTarget::Directory("repo/tools".into()));
    }

    #[test]
    fn test_single_directory_resolves_like_any_other() {
        let tmp = tempfile::tempdir().unwrap();
        manifest(&tmp.path().join("svc"));
        fs::create_dir_all(tmp.path().join("svc/api")).unwrap();
        fs::create_dir_all(tmp.path().join("svc/db")).unwrap();

        let grouper = FileGrouper::new(tmp.path());
        let alone = grouper.resolve_groups(&files(&["./svc/api/h.go", "svc/api/r.go"]));
        let mixed = grouper.resolve_groups(&files(&[
            "./svc/api/h.go",
            "svc/db/conn.go",
            "svc/api/r.go",
        ]));

        assert_eq!(alone.len(), 1);
        assert_eq!(alone["svc/api"], mixed["svc/api"]);
        assert_eq!(alone["svc/api"].target.to_string(), "./api/...");
    }

    #[test]
    fn test_resolution_is_a_partition() {
        let tmp = tempfile::tempdir().unwrap();
        manifest(tmp.path());
        manifest(&tmp.path().join("tools"));
        for dir in ["cmd", "internal/a", "internal/b", "tools/lint"] {
            fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }

        let input = files(&[
            "main.go",
            "cmd/run.go",
            "internal/a/a.go",
            "internal/b/b.go",
            "internal/a/a_test.go",
            "tools/lint/lint.go",
        ]);
        let groups = FileGrouper::new(tmp.path()).resolve_groups(&input);

        let mut seen = Vec::new();
        for group in groups.values() {
            seen.extend(group.files.iter().cloned());
        }
        assert_eq!(seen.len(), input.len());
        assert_eq!(
            seen.into_iter().collect::<BTreeSet<_>>(),
            input.into_iter().collect::<BTreeSet<_>>()
        );
        assert_eq!(groups["tools/lint"].working_dir, tmp.path().join("tools"));
        assert_eq!(groups["."].target, InvocationTarget::RecursivePackage);
    }

    #[test]
    fn test_group_by_module_merges_directories() {
        let tmp = tempfile::tempdir().unwrap();
        manifest(&tmp.path().join("svc"));
        fs::create_dir_all(tmp.path().join("svc/api")).unwrap();
        fs::create_dir_all(tmp.path().join("docs")).unwrap();

        let grouper = FileGrouper::new(tmp.path());
        let groups = grouper.group_by_module(&files(&[
            "svc/go.mod",
            "svc/api/handler.go",
            "docs/gen.go",
        ]));

        assert_eq!(groups.len(), 1);
        let group = &groups["svc"];
        assert_eq!(group.working_dir, tmp.path().join("svc"));
        assert_eq!(group.files, files(&["svc/go.mod", "svc/api/handler.go"]));
        assert_eq!(group.member_paths()[1], tmp.path().join("svc/api/handler.go"));
    }
}
