//! Environment-driven configuration.
//!
//! Everything is read through a lookup function so tests never touch the
//! process environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::error::{PrehookError, Result};

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_FUMPT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LINT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MOD_TIDY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_GITLEAKS_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_WHITESPACE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_EOF_TIMEOUT_SECS: u64 = 30;

/// Upper bound for any configured timeout (one day).
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Skip-list entry meaning "every check".
pub const SKIP_ALL: &str = "all";

/// Per-check switch and time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckSettings {
    pub enabled: bool,
    pub timeout: Duration,
}

impl CheckSettings {
    fn enabled_for(secs: u64) -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(secs),
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Budget for the whole pipeline.
    pub timeout: Duration,

    pub whitespace: CheckSettings,
    pub eof: CheckSettings,
    pub fumpt: CheckSettings,
    pub lint: CheckSettings,
    pub mod_tidy: CheckSettings,
    pub gitleaks: CheckSettings,

    /// Tags always passed to the linter.
    pub build_tags: Vec<String>,

    /// Checksum file of the primary module; its directory is the fallback
    /// module directory.
    pub go_sum_file: Option<PathBuf>,

    /// Secret scanner configuration, absolute or repository-relative.
    pub gitleaks_config: Option<PathBuf>,

    /// Path patterns removed before checks see the file list.
    pub exclude_patterns: Vec<String>,

    /// Concurrent checks; 0 means available parallelism.
    pub parallel_workers: usize,

    pub fail_fast: bool,

    /// Check names to skip, as given (validated by the registry).
    pub skip: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            whitespace: CheckSettings::enabled_for(DEFAULT_WHITESPACE_TIMEOUT_SECS),
            eof: CheckSettings::enabled_for(DEFAULT_EOF_TIMEOUT_SECS),
            fumpt: CheckSettings::enabled_for(DEFAULT_FUMPT_TIMEOUT_SECS),
            lint: CheckSettings::enabled_for(DEFAULT_LINT_TIMEOUT_SECS),
            mod_tidy: CheckSettings::enabled_for(DEFAULT_MOD_TIDY_TIMEOUT_SECS),
            gitleaks: CheckSettings::enabled_for(DEFAULT_GITLEAKS_TIMEOUT_SECS),
            build_tags: Vec::new(),
            go_sum_file: None,
            gitleaks_config: None,
            exclude_patterns: Vec::new(),
            parallel_workers: 0,
            fail_fast: false,
            skip: Vec::new(),
        }
    }
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. All problems are reported together.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut problems = Vec::new();
        let mut config = Config::default();

        read_secs(&get, "PREHOOK_TIMEOUT_SECONDS", &mut config.timeout, &mut problems);
        for (prefix, settings) in [
            ("WHITESPACE", &mut config.whitespace),
            ("EOF", &mut config.eof),
            ("FUMPT", &mut config.fumpt),
            ("LINT", &mut config.lint),
            ("MOD_TIDY", &mut config.mod_tidy),
            ("GITLEAKS", &mut config.gitleaks),
        ] {
            read_secs(
                &get,
                &format!("PREHOOK_{prefix}_TIMEOUT"),
                &mut settings.timeout,
                &mut problems,
            );
            read_bool(
                &get,
                &format!("PREHOOK_ENABLE_{prefix}"),
                &mut settings.enabled,
                &mut problems,
            );
        }

        if let Some(tags) = get("PREHOOK_BUILD_TAGS") {
            config.build_tags = split_list(&tags).into_iter().filter(|t| !t.is_empty()).collect();
        }
        config.go_sum_file = get("PREHOOK_GO_SUM_FILE").map(PathBuf::from);
        config.gitleaks_config = get("PREHOOK_GITLEAKS_CONFIG").map(PathBuf::from);

        if let Some(patterns) = get("PREHOOK_EXCLUDE_PATTERNS") {
            config.exclude_patterns = split_list(&patterns);
        }

        if let Some(raw) = get("PREHOOK_PARALLEL_WORKERS") {
            match raw.parse::<usize>() {
                Ok(n) => config.parallel_workers = n,
                Err(_) => problems.push(format!(
                    "PREHOOK_PARALLEL_WORKERS must be a non-negative integer, got '{raw}'"
                )),
            }
        }
        read_bool(&get, "PREHOOK_FAIL_FAST", &mut config.fail_fast, &mut problems);

        if let Some(skip) = get("SKIP").or_else(|| get("PREHOOK_SKIP")) {
            config.skip = split_list(&skip).into_iter().filter(|s| !s.is_empty()).collect();
        }

        problems.extend(config.problems());
        if !problems.is_empty() {
            return Err(PrehookError::Config(problems.join("; ")));
        }
        Ok(config)
    }

    /// Check the invariants of an already built configuration.
    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PrehookError::Config(problems.join("; ")))
        }
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (name, timeout) in [
            ("timeout", self.timeout),
            ("whitespace timeout", self.whitespace.timeout),
            ("eof timeout", self.eof.timeout),
            ("fumpt timeout", self.fumpt.timeout),
            ("lint timeout", self.lint.timeout),
            ("mod-tidy timeout", self.mod_tidy.timeout),
            ("gitleaks timeout", self.gitleaks.timeout),
        ] {
            if timeout.is_zero() {
                problems.push(format!("{name} must be greater than zero"));
            } else if timeout > Duration::from_secs(MAX_TIMEOUT_SECS) {
                problems.push(format!("{name} must not exceed {MAX_TIMEOUT_SECS} seconds"));
            }
        }
        if self.exclude_patterns.iter().any(|p| p.trim().is_empty()) {
            problems.push("exclude patterns must not be empty".to_string());
        }
        problems
    }

    /// Directory of the configured checksum file, if it names one.
    pub fn module_dir(&self) -> Option<PathBuf> {
        let parent = self.go_sum_file.as_deref()?.parent()?;
        if parent.as_os_str().is_empty() || parent == Path::new(".") {
            None
        } else {
            Some(parent.to_path_buf())
        }
    }

    /// Whether the skip list disables every check.
    pub fn skips_all(&self) -> bool {
        self.skip.iter().any(|s| s.eq_ignore_ascii_case(SKIP_ALL))
    }

    /// Worker count with 0 resolved to the available parallelism.
    pub fn effective_workers(&self) -> usize {
        if self.parallel_workers > 0 {
            self.parallel_workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

fn read_secs<G>(get: &G, key: &str, slot: &mut Duration, problems: &mut Vec<String>)
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else { return };
    match raw.parse::<u64>() {
        Ok(secs) => *slot = Duration::from_secs(secs),
        Err(_) => problems.push(format!("{key} must be a whole number of seconds, got '{raw}'")),
    }
}

fn read_bool<G>(get: &G, key: &str, slot: &mut bool, problems: &mut Vec<String>)
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else { return };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => *slot = true,
        "0" | "false" | "no" | "off" => *slot = false,
        _ => problems.push(format!("{key} must be a boolean, got '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.lint.timeout, Duration::from_secs(60));
        assert!(config.gitleaks.enabled);
        assert!(config.module_dir().is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PREHOOK_LINT_TIMEOUT", "120"),
            ("PREHOOK_ENABLE_GITLEAKS", "false"),
            ("PREHOOK_BUILD_TAGS", "integration, e2e"),
            ("PREHOOK_GO_SUM_FILE", "services/api/go.sum"),
            ("PREHOOK_EXCLUDE_PATTERNS", "vendor/, testdata"),
            ("PREHOOK_PARALLEL_WORKERS", "2"),
            ("PREHOOK_FAIL_FAST", "yes"),
        ])
        .unwrap();

        assert_eq!(config.lint.timeout, Duration::from_secs(120));
        assert!(!config.gitleaks.enabled);
        assert_eq!(config.build_tags, vec!["integration", "e2e"]);
        assert_eq!(config.module_dir(), Some(PathBuf::from("services/api")));
        assert_eq!(config.exclude_patterns, vec!["vendor/", "testdata"]);
        assert_eq!(config.effective_workers(), 2);
        assert!(config.fail_fast);
    }

    #[test]
    fn test_root_go_sum_has_no_module_dir() {
        let config = load(&[("PREHOOK_GO_SUM_FILE", "go.sum")]).unwrap();
        assert!(config.module_dir().is_none());
    }

    #[test]
    fn test_skip_prefers_first_nonempty_variable() {
        let config = load(&[("SKIP", "lint,fumpt"), ("PREHOOK_SKIP", "gitleaks")]).unwrap();
        assert_eq!(config.skip, vec!["lint", "fumpt"]);

        let config = load(&[("SKIP", "  "), ("PREHOOK_SKIP", "gitleaks")]).unwrap();
        assert_eq!(config.skip, vec!["gitleaks"]);

        let config = load(&[("PREHOOK_SKIP", "ALL")]).unwrap();
        assert!(config.skips_all());
    }

    #[test]
    fn test_invalid_values_are_reported_together() {
        let err = load(&[
            ("PREHOOK_LINT_TIMEOUT", "0"),
            ("PREHOOK_FUMPT_TIMEOUT", "soon"),
            ("PREHOOK_FAIL_FAST", "maybe"),
            ("PREHOOK_EXCLUDE_PATTERNS", "vendor/,,"),
        ])
        .unwrap_err();

        let msg = err.to_string();
        assert!(matches!(err, PrehookError::Config(_)));
        assert!(msg.contains("lint timeout must be greater than zero"));
        assert!(msg.contains("PREHOOK_FUMPT_TIMEOUT"));
        assert!(msg.contains("PREHOOK_FAIL_FAST"));
        assert!(msg.contains("exclude patterns"));
    }

    #[test]
    fn test_timeouts_beyond_a_day_are_rejected() {
        let err = load(&[
            ("PREHOOK_TIMEOUT_SECONDS", "18446744073709551615"),
            ("PREHOOK_GITLEAKS_TIMEOUT", "86401"),
        ])
        .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("timeout must not exceed 86400 seconds"));
        assert!(msg.contains("gitleaks timeout must not exceed"));

        let config = load(&[("PREHOOK_TIMEOUT_SECONDS", "86400")]).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(MAX_TIMEOUT_SECS));
    }

    #[test]
    fn test_builtin_fixers_are_configurable() {
        let config = load(&[
            ("PREHOOK_WHITESPACE_TIMEOUT", "5"),
            ("PREHOOK_ENABLE_EOF", "off"),
        ])
        .unwrap();

        assert_eq!(config.whitespace.timeout, Duration::from_secs(5));
        assert!(config.whitespace.enabled);
        assert!(!config.eof.enabled);
        assert_eq!(config.eof.timeout, Duration::from_secs(DEFAULT_EOF_TIMEOUT_SECS));
    }
}
