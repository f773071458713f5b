//! Check registry built from configuration around one shared facts cache.

use std::sync::Arc;
use std::time::Duration;

use prehook_core::{Config, Deadline, RepoFacts};
use serde::Serialize;
use thiserror::Error;

use crate::check::{Check, CheckCategory, CheckMetadata};
use crate::eof::EofCheck;
use crate::fumpt::FumptCheck;
use crate::gitleaks::GitleaksCheck;
use crate::lint::LintCheck;
use crate::mod_tidy::ModTidyCheck;
use crate::whitespace::WhitespaceCheck;

/// A declared build target that the repository does not provide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("check '{check}' requires build target '{dependency}' which is not available: {reason}")]
pub struct DependencyError {
    pub check: String,
    pub dependency: String,
    pub reason: String,
}

/// Registered checks, in registration order.
pub struct Registry {
    facts: Arc<RepoFacts>,
    checks: Vec<Arc<dyn Check>>,
}

impl Registry {
    /// Empty registry over `facts`.
    pub fn new(facts: Arc<RepoFacts>) -> Self {
        Self {
            facts,
            checks: Vec::new(),
        }
    }

    /// Every enabled check, configured from `config`.
    pub fn with_config(config: &Config, facts: Arc<RepoFacts>) -> Self {
        let mut registry = Self::new(facts.clone());

        if config.whitespace.enabled {
            registry.register(Arc::new(WhitespaceCheck::new(
                facts.clone(),
                config.whitespace.timeout,
            )));
        }
        if config.eof.enabled {
            registry.register(Arc::new(EofCheck::new(facts.clone(), config.eof.timeout)));
        }
        if config.fumpt.enabled {
            registry.register(Arc::new(FumptCheck::new(facts.clone(), config.fumpt.timeout)));
        }
        if config.lint.enabled {
            registry.register(Arc::new(
                LintCheck::new(facts.clone(), config.lint.timeout)
                    .with_build_tags(config.build_tags.clone())
                    .with_fallback_module_dir(config.module_dir()),
            ));
        }
        if config.mod_tidy.enabled {
            registry.register(Arc::new(
                ModTidyCheck::new(facts.clone(), config.mod_tidy.timeout)
                    .with_fallback_module_dir(config.module_dir()),
            ));
        }
        if config.gitleaks.enabled {
            registry.register(Arc::new(
                GitleaksCheck::new(facts, config.gitleaks.timeout)
                    .with_config(config.gitleaks_config.clone()),
            ));
        }

        tracing::debug!(checks = ?registry.names(), "registry built");
        registry
    }

    /// Add a check, replacing any registered under the same name.
    pub fn register(&mut self, check: Arc<dyn Check>) {
        match self.checks.iter_mut().find(|c| c.name() == check.name()) {
            Some(existing) => *existing = check,
            None => self.checks.push(check),
        }
    }

    pub fn facts(&self) -> &Arc<RepoFacts> {
        &self.facts
    }

    pub fn names(&self) -> Vec<String> {
        self.checks.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Check>> {
        self.checks.iter().find(|c| c.name() == name).cloned()
    }

    pub fn checks(&self) -> &[Arc<dyn Check>] {
        &self.checks
    }

    pub fn metadata(&self) -> Vec<CheckMetadata> {
        self.checks.iter().map(|c| c.metadata()).collect()
    }

    pub fn by_category(&self, category: CheckCategory) -> Vec<Arc<dyn Check>> {
        self.checks
            .iter()
            .filter(|c| c.metadata().category == category)
            .cloned()
            .collect()
    }

    /// Sum of the estimated durations of every registered check.
    pub fn estimated_duration(&self) -> Duration {
        self.checks
            .iter()
            .map(|c| c.metadata().estimated_duration)
            .sum()
    }

    /// Declared dependencies missing from the repository's build targets.
    ///
    /// Lookups go through the shared capability cache, so a target declared by
    /// several checks is probed once.
    pub async fn validate_dependencies(&self, deadline: Deadline) -> Vec<DependencyError> {
        let mut missing = Vec::new();
        for check in &self.checks {
            for dependency in check.metadata().dependencies {
                if let Err(err) = self.facts.require_capability(deadline, &dependency).await {
                    missing.push(DependencyError {
                        check: check.name().to_string(),
                        dependency,
                        reason: err.to_string(),
                    });
                }
            }
        }
        missing
    }
}
