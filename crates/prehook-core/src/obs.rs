//! Structured lifecycle events for checks, groups and capability probes.
//!
//! Events carry an `event` field (`check.started`, `group.validated`, ...) so
//! they can be filtered in JSON logs. Lifecycle events are `info!`; per-group
//! and probe events are `debug!`.

use tracing::{debug, info, Span};

/// Span carrying the run id of one pipeline execution.
///
/// Futures run with `.instrument(span.span())` inherit the `run_id` field.
pub struct PipelineSpan {
    run_id: String,
    span: Span,
}

impl PipelineSpan {
    pub fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            span: tracing::info_span!("prehook.pipeline", run_id = %run_id),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }
}

pub fn emit_check_started(check: &str, files: usize) {
    info!(event = "check.started", check = %check, files = files);
}

pub fn emit_check_finished(check: &str, status: &str, duration_ms: u64) {
    info!(
        event = "check.finished",
        check = %check,
        status = %status,
        duration_ms = duration_ms,
    );
}

/// One validator invocation (including any retry) finished for a group.
pub fn emit_group_validated(tool: &str, group: &str, outcome: &str, duration_ms: u64) {
    debug!(
        event = "group.validated",
        tool = %tool,
        group = %group,
        outcome = %outcome,
        duration_ms = duration_ms,
    );
}

/// A directory was left out of validation.
pub fn emit_group_skipped(group: &str, reason: &str) {
    debug!(event = "group.skipped", group = %group, reason = %reason);
}

pub fn emit_capability_probed(name: &str, exists: bool, cached: bool) {
    debug!(
        event = "capability.probed",
        capability = %name,
        exists = exists,
        cached = cached,
    );
}

pub fn emit_pipeline_finished(run_id: &str, success: bool, checks: usize, duration_ms: u64) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        success = success,
        checks = checks,
        duration_ms = duration_ms,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_span_keeps_run_id() {
        let span = PipelineSpan::new("run-1");
        assert_eq!(span.run_id(), "run-1");
        let _entered = span.span().entered();
        emit_check_started("lint", 3);
    }
}
