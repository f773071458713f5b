//! Folding per-group outcomes into one check decision.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::diagnostics;
use crate::validation::ValidationOutcome;

const TIMED_OUT_TEXT: &str = "validation timed out";

/// Decision for one check across all of its groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AggregatedResult {
    Success,
    FindingsToFix {
        combined_text: String,
    },
    /// At least one group crashed or timed out; findings from other groups are
    /// included in the text.
    InfrastructureFailure {
        combined_text: String,
        timed_out: bool,
    },
}

impl AggregatedResult {
    pub fn is_success(&self) -> bool {
        matches!(self, AggregatedResult::Success)
    }

    pub fn combined_text(&self) -> Option<&str> {
        match self {
            AggregatedResult::Success => None,
            AggregatedResult::FindingsToFix { combined_text }
            | AggregatedResult::InfrastructureFailure { combined_text, .. } => Some(combined_text),
        }
    }
}

/// Aggregate outcomes keyed by group path.
///
/// Any tool failure or timeout makes the whole result an infrastructure
/// failure, even when other groups only reported findings. The decision does
/// not depend on the order of the groups.
pub fn aggregate(outcomes: &BTreeMap<String, ValidationOutcome>) -> AggregatedResult {
    if outcomes.len() == 1 {
        if let Some(outcome) = outcomes.values().next() {
            return single(outcome);
        }
    }

    let mut findings = Vec::new();
    let mut failures = Vec::new();
    let mut timed_out = false;

    for (key, outcome) in outcomes {
        match outcome {
            ValidationOutcome::Success => {}
            ValidationOutcome::ReportedFindings { diagnostic_text } => {
                findings.push(attributed(key, diagnostic_text));
            }
            ValidationOutcome::ToolFailure { diagnostic_text } => {
                failures.push(attributed(key, diagnostic_text));
            }
            ValidationOutcome::TimedOut => {
                timed_out = true;
                failures.push(attributed(key, TIMED_OUT_TEXT));
            }
        }
    }

    if !failures.is_empty() {
        failures.extend(findings);
        return AggregatedResult::InfrastructureFailure {
            combined_text: failures.join("\n\n"),
            timed_out,
        };
    }
    if !findings.is_empty() {
        return AggregatedResult::FindingsToFix {
            combined_text: findings.join("\n\n"),
        };
    }
    AggregatedResult::Success
}

fn single(outcome: &ValidationOutcome) -> AggregatedResult {
    match outcome {
        ValidationOutcome::Success => AggregatedResult::Success,
        ValidationOutcome::ReportedFindings { diagnostic_text } => AggregatedResult::FindingsToFix {
            combined_text: diagnostics::clean(diagnostic_text),
        },
        ValidationOutcome::ToolFailure { diagnostic_text } => {
            AggregatedResult::InfrastructureFailure {
                combined_text: diagnostics::clean(diagnostic_text),
                timed_out: false,
            }
        }
        ValidationOutcome::TimedOut => AggregatedResult::InfrastructureFailure {
            combined_text: TIMED_OUT_TEXT.to_string(),
            timed_out: true,
        },
    }
}

fn attributed(key: &str, text: &str) -> String {
    format!("Directory {key}:\n{}", diagnostics::clean(text))
}
