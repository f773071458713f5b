//! Module boundary resolution.
//!
//! A directory is a module root iff it directly contains the manifest file of
//! the build ecosystem (`go.mod` for Go). Resolution is a lookup against the
//! filesystem on every call; nothing is cached here.

use std::path::{Path, PathBuf};

/// Manifest file marking a Go module root.
pub const GO_MANIFEST: &str = "go.mod";

/// Finds the nearest enclosing module root of a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleResolver {
    manifest: String,
}

impl Default for ModuleResolver {
    fn default() -> Self {
        Self::go()
    }
}

impl ModuleResolver {
    /// Resolver for an arbitrary manifest file name.
    pub fn new(manifest: impl Into<String>) -> Self {
        Self {
            manifest: manifest.into(),
        }
    }

    /// Resolver for Go modules.
    pub fn go() -> Self {
        Self::new(GO_MANIFEST)
    }

    pub fn manifest(&self) -> &str {
        &self.manifest
    }

    /// Whether `dir` contains the manifest file.
    pub fn is_module_root(&self, dir: &Path) -> bool {
        dir.join(&self.manifest).is_file()
    }

    /// Walk upward from `start` to the nearest module root, never leaving
    /// `boundary`. Returns `None` when there is none.
    pub fn find_module_root(&self, start: &Path, boundary: &Path) -> Option<PathBuf> {
        if !start.starts_with(boundary) {
            return None;
        }

        let mut current = start;
        loop {
            if self.is_module_root(current) {
                return Some(current.to_path_buf());
            }
            let parent = current.parent()?;
            if parent == current || !parent.starts_with(boundary) {
                return None;
            }
            current = parent;
        }
    }
}
