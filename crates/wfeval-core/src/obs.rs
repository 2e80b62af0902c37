//! Structured observability hooks for the evaluation lifecycle.
//!
//! This module provides emission functions for key lifecycle events: state
//! creation, evaluation recorded, token contention, state finished and
//! shutdown failures.
//!
//! Events are emitted at `info!` level unless noted (configurable via the
//! `RUST_LOG` env var, see [`crate::telemetry::init_tracing`]).

use tracing::{debug, error, info};

/// Emit event: evaluation state created for an entity.
///
/// # Example
///
/// ```ignore
/// emit_state_created("wfi-123");
/// // logs: event=eval_state.created workflow_id=wfi-123
/// ```
pub fn emit_state_created(id: &str) {
    info!(event = "eval_state.created", workflow_id = %id);
}

/// Emit event: an evaluation record was appended (debug level, once per evaluation).
pub fn emit_evaluation_recorded(
    id: &str,
    seq: usize,
    cause: Option<&str>,
    action: Option<&str>,
    failed: bool,
) {
    debug!(
        event = "eval.recorded",
        workflow_id = %id,
        seq = seq,
        cause = cause.unwrap_or(""),
        action = action.unwrap_or(""),
        failed = failed,
    );
}

/// Emit event: the exclusivity token was unavailable and the attempt fell back.
pub fn emit_evaluation_contended(id: &str, cause: Option<&str>) {
    debug!(event = "eval.contended", workflow_id = %id, cause = cause.unwrap_or(""));
}

/// Emit event: evaluation state finished.
pub fn emit_state_finished(id: &str, success: bool) {
    info!(event = "eval_state.finished", workflow_id = %id, success = success);
}

/// Emit event: closing a state during shutdown failed (error level).
pub fn emit_close_error(id: &str, error: &dyn std::fmt::Display) {
    error!(event = "eval_state.close_error", workflow_id = %id, error = %error, "failed to close evaluation state");
}

/// Emit event: cache shutdown completed.
pub fn emit_cache_closed(states: usize, failures: usize) {
    info!(event = "eval_cache.closed", states = states, failures = failures);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_emitters_do_not_panic() {
        // Emission must never panic, whatever subscriber is installed.
        emit_state_created("wfi-1");
        emit_evaluation_recorded("wfi-1", 1, Some("tick"), None, false);
        emit_state_finished("wfi-1", true);
    }

    #[traced_test]
    #[test]
    fn test_emit_state_created_logs_workflow_id() {
        emit_state_created("wfi-created");
        assert!(logs_contain("eval_state.created"));
        assert!(logs_contain("wfi-created"));
    }

    #[traced_test]
    #[test]
    fn test_emit_close_error_logs_error() {
        emit_close_error("wfi-err", &"evaluation in progress");
        assert!(logs_contain("eval_state.close_error"));
        assert!(logs_contain("evaluation in progress"));
    }

    #[traced_test]
    #[test]
    fn test_emit_state_finished_logs_success_flag() {
        emit_state_finished("wfi-done", false);
        assert!(logs_contain("eval_state.finished"));
        assert!(logs_contain("success=false"));
    }
}
