//! Evaluation state of a single controlled entity.
//!
//! Two independent primitives coexist here:
//!
//! - the **exclusivity token** ([`EvalToken`]) enforces that only one
//!   evaluation of the entity runs at a time. It is held for the duration of a
//!   potentially slow decision call and can be polled without blocking.
//! - the **data lock** protects the log, the finished flag and the span. It is
//!   held only while copying or mutating those fields, never across an
//!   evaluation, so status queries do not wait on in-progress evaluations.

use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::Span;

use crate::error::{EvalError, Result};
use crate::log::EvalLog;
use crate::metrics::METRICS;
use crate::obs;
use crate::record::{EvalRecord, RecordSummary};
use crate::token::EvalToken;
use crate::trace::TraceContext;

/// Component marker attached to every evaluation span.
pub const COMPONENT: &str = "controller.workflow";

/// Name of the span opened for each evaluation state.
pub const SPAN_NAME: &str = "eval_state";

/// Reason given to [`EvalState::finish`] by [`EvalState::close`].
pub const CLOSED_REASON: &str = "closed";

#[derive(Debug)]
struct StateData {
    log: EvalLog,
    finished: bool,
    /// Open until the state finishes; taken exactly once.
    span: Option<Span>,
}

/// The state of one entity (e.g. a workflow invocation) evaluated by a
/// controller: its evaluation history, exclusivity token and trace span.
#[derive(Debug)]
pub struct EvalState {
    id: String,
    token: EvalToken,
    data: RwLock<StateData>,
    span_ctx: TraceContext,
}

impl EvalState {
    /// Create a state for `id` and open its span, following from `parent`.
    ///
    /// The span is a trace root of its own; `parent` is only linked to it.
    /// The exclusivity token starts out available.
    pub fn new(id: impl Into<String>, parent: &TraceContext) -> Self {
        let id = id.into();
        let span = tracing::info_span!(
            parent: None,
            "eval_state",
            component = COMPONENT,
            workflow.id = %id,
            success = tracing::field::Empty,
        );
        parent.link(&span);
        let span_ctx = TraceContext::of(&span);

        METRICS.inc_states_created();
        obs::emit_state_created(&id);

        Self {
            id,
            token: EvalToken::new(),
            data: RwLock::new(StateData {
                log: EvalLog::new(),
                finished: false,
                span: Some(span),
            }),
            span_ctx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Context of this state's span, for propagating to child work.
    ///
    /// Stays valid as an identifier after the span has been closed.
    pub fn span(&self) -> TraceContext {
        self.span_ctx.clone()
    }

    /// The exclusivity token. Whoever acquires it may evaluate the entity.
    ///
    /// ```ignore
    /// if let Some(_guard) = state.lock().try_acquire() {
    ///     // evaluate, record; the token is freed when the guard drops
    /// } else {
    ///     // another evaluation is in progress: skip or requeue
    /// }
    /// ```
    pub fn lock(&self) -> &EvalToken {
        &self.token
    }

    /// Release exclusive access. A no-op when the token is already free.
    pub fn free(&self) {
        self.token.free();
    }

    pub fn is_finished(&self) -> bool {
        self.read().finished
    }

    /// Mark the state as finished and close its span.
    ///
    /// Only the first call has an effect; it records `success` on the span and
    /// attaches `reasons` (space-joined) as an event. Returns whether this
    /// call performed the transition.
    pub fn finish(&self, success: bool, reasons: &[&str]) -> bool {
        let span = {
            let mut data = self.write();
            if data.finished {
                return false;
            }
            data.finished = true;
            data.span.take()
        };

        if let Some(span) = span {
            span.record("success", success);
            if !reasons.is_empty() {
                tracing::info!(parent: &span, reason = %reasons.join(" "), "evaluation state finished");
            }
            // Dropping the last handle closes the span.
            drop(span);
        }

        METRICS.inc_states_finished();
        obs::emit_state_finished(&self.id, success);
        true
    }

    /// Finish the state as unsuccessful with reason `"closed"`.
    ///
    /// The state is finished in every case. Returns
    /// [`EvalError::EvaluationInProgress`] when this call finished the state
    /// while an evaluation still held the token, so shutdown can report the
    /// interrupted evaluation. Closing an already finished state is `Ok`.
    pub fn close(&self) -> Result<()> {
        let in_progress = self.token.is_held();
        if self.finish(false, &[CLOSED_REASON]) && in_progress {
            return Err(EvalError::EvaluationInProgress {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Attach a message to this state's span. Ignored once finished.
    pub fn annotate(&self, message: impl fmt::Display) {
        if let Some(span) = self.read().span.as_ref() {
            tracing::info!(parent: span, "{}", message);
        }
    }

    /// Append an evaluation record to the log.
    pub fn record(&self, record: EvalRecord) {
        let cause = record.cause.clone();
        let action = record.action_name().map(str::to_string);
        let failed = record.is_error();
        let seq = {
            let mut data = self.write();
            data.log.record(record);
            data.log.count()
        };
        METRICS.inc_evaluations_recorded();
        obs::emit_evaluation_recorded(&self.id, seq, cause.as_deref(), action.as_deref(), failed);
    }

    /// Copy of the full evaluation log.
    pub fn logs(&self) -> EvalLog {
        self.read().log.clone()
    }

    pub fn count(&self) -> usize {
        self.read().log.count()
    }

    pub fn get(&self, i: usize) -> Option<EvalRecord> {
        self.read().log.get(i).cloned()
    }

    pub fn first(&self) -> Option<EvalRecord> {
        self.read().log.first().cloned()
    }

    pub fn last(&self) -> Option<EvalRecord> {
        self.read().log.last().cloned()
    }

    /// Number of most recent evaluations that ended in an error.
    pub fn consecutive_errors(&self) -> usize {
        self.read().log.consecutive_errors()
    }

    /// Consistent view of the state for status output.
    pub fn snapshot(&self) -> StateSnapshot {
        let data = self.read();
        StateSnapshot {
            id: self.id.clone(),
            finished: data.finished,
            locked: self.token.is_held(),
            evaluations: data.log.count(),
            consecutive_errors: data.log.consecutive_errors(),
            last: data.log.last().map(EvalRecord::summary),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StateData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StateData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serializable status of an [`EvalState`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub id: String,
    pub finished: bool,
    pub locked: bool,
    pub evaluations: usize,
    pub consecutive_errors: usize,
    pub last: Option<RecordSummary>,
}
