//! The contract between the evaluation core and the control loop driving it.
//!
//! A scheduler calls [`EvalDriver::evaluate`] for every tick or notification
//! that concerns an entity. The driver then:
//!
//! 1. fetches (or lazily creates) the entity's [`EvalState`] from the cache;
//! 2. tries to take the exclusivity token, falling back with
//!    [`EvalAttempt::Contended`] when another evaluation holds it;
//! 3. runs the [`Controller`] and appends an [`EvalRecord`] with the cause,
//!    action, error and rule path;
//! 4. frees the token, whatever the controller returned (the guard also frees
//!    it while unwinding, in builds that unwind on panic);
//! 5. finishes the state when the controller reports a terminal outcome.
//!
//! Schedulers that need a different fallback can follow the same steps by hand
//! using [`EvalCache`] and [`EvalState`] directly.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::Instrument;

use crate::cache::EvalCache;
use crate::config::DriverConfig;
use crate::metrics::METRICS;
use crate::obs;
use crate::record::{Action, EvalRecord};
use crate::state::EvalState;
use crate::token::EvalGuard;
use crate::trace::TraceContext;

/// Reason used when a state is given up on after repeated errors.
pub const TOO_MANY_ERRORS_REASON: &str = "too many consecutive evaluation errors";

/// Terminal verdict for an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub reasons: Vec<String>,
}

/// What a [`Controller`] decided during one evaluation.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub action: Option<Arc<dyn Action>>,
    pub rule_path: Vec<String>,
    /// Set when the entity reached a terminal state.
    pub outcome: Option<Outcome>,
}

impl Evaluation {
    /// An evaluation that decided nothing needs to happen.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, action: Arc<dyn Action>) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_rule_path<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rule_path = rules.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the entity as finished successfully.
    pub fn succeeded(mut self, reason: impl Into<String>) -> Self {
        self.outcome = Some(Outcome {
            success: true,
            reasons: vec![reason.into()],
        });
        self
    }

    /// Mark the entity as finished unsuccessfully.
    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.outcome = Some(Outcome {
            success: false,
            reasons: vec![reason.into()],
        });
        self
    }
}

/// Decision engine evaluated for an entity while the driver holds its token.
///
/// Returning `Err` is not fatal: the error is stored in the evaluation record
/// and the entity stays eligible for further evaluations.
#[async_trait]
pub trait Controller: Send + Sync {
    async fn evaluate(&self, state: &EvalState, cause: &str) -> anyhow::Result<Evaluation>;
}

/// Result of one evaluation attempt.
#[derive(Debug, Clone)]
pub enum EvalAttempt {
    /// The controller ran; carries the record appended to the log.
    Evaluated(EvalRecord),
    /// Another evaluation held the token.
    Contended,
    /// The state had already finished; nothing ran.
    Finished,
}

impl EvalAttempt {
    pub fn is_evaluated(&self) -> bool {
        matches!(self, EvalAttempt::Evaluated(_))
    }

    pub fn record(&self) -> Option<&EvalRecord> {
        match self {
            EvalAttempt::Evaluated(record) => Some(record),
            _ => None,
        }
    }
}

/// Runs a [`Controller`] against cached evaluation states.
///
/// With [`DriverConfig::evict_finished`], finished states are removed from
/// the cache and their IDs remembered, so later ticks or notifications for
/// them report [`EvalAttempt::Finished`] instead of creating a fresh state.
pub struct EvalDriver<C> {
    cache: Arc<EvalCache>,
    controller: C,
    config: DriverConfig,
    evicted: RwLock<HashSet<String>>,
}

impl<C: Controller> EvalDriver<C> {
    pub fn new(cache: Arc<EvalCache>, controller: C, config: DriverConfig) -> Self {
        Self {
            cache,
            controller,
            config,
            evicted: RwLock::new(HashSet::new()),
        }
    }

    pub fn cache(&self) -> &Arc<EvalCache> {
        &self.cache
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Evaluate entity `id` once, on behalf of `cause`.
    ///
    /// `parent` is only used if the entity's state has to be created.
    pub async fn evaluate(&self, id: &str, cause: &str, parent: &TraceContext) -> EvalAttempt {
        let state = {
            // Held across the lookup so an eviction cannot slip in between.
            let evicted = self.evicted.read().unwrap_or_else(PoisonError::into_inner);
            if evicted.contains(id) {
                return EvalAttempt::Finished;
            }
            self.cache.get_or_create(id, parent)
        };
        if state.is_finished() {
            return EvalAttempt::Finished;
        }

        let Some(guard) = self.acquire(&state).await else {
            METRICS.inc_lock_contended();
            obs::emit_evaluation_contended(id, Some(cause));
            return EvalAttempt::Contended;
        };
        // The previous holder may have finished the state while we waited.
        if state.is_finished() {
            return EvalAttempt::Finished;
        }

        let span = tracing::info_span!("evaluation", workflow.id = %id, cause = %cause);
        state.span().link(&span);

        let mut record = EvalRecord::new().with_cause(cause);
        let outcome = match self
            .controller
            .evaluate(&state, cause)
            .instrument(span)
            .await
        {
            Ok(evaluation) => {
                record.action = evaluation.action;
                record.rule_path = evaluation.rule_path;
                evaluation.outcome
            }
            Err(e) => {
                record = record.with_error(e);
                None
            }
        };
        state.record(record.clone());
        drop(guard);

        if let Some(outcome) = outcome.or_else(|| self.exhausted(&state)) {
            let reasons: Vec<&str> = outcome.reasons.iter().map(String::as_str).collect();
            state.finish(outcome.success, &reasons);
            if self.config.evict_finished {
                self.evict(id);
            }
        }

        EvalAttempt::Evaluated(record)
    }

    /// Whether `id` finished and was evicted from the cache by this driver.
    pub fn is_evicted(&self, id: &str) -> bool {
        self.evicted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    fn evict(&self, id: &str) {
        let mut evicted = self.evicted.write().unwrap_or_else(PoisonError::into_inner);
        evicted.insert(id.to_string());
        self.cache.del(id);
    }

    async fn acquire<'a>(&self, state: &'a EvalState) -> Option<EvalGuard<'a>> {
        match self.config.lock_timeout() {
            Some(timeout) => state.lock().acquire_timeout(timeout).await,
            None => state.lock().try_acquire(),
        }
    }

    fn exhausted(&self, state: &EvalState) -> Option<Outcome> {
        let max = self.config.max_consecutive_errors?;
        (state.consecutive_errors() >= max).then(|| Outcome {
            success: false,
            reasons: vec![TOO_MANY_ERRORS_REASON.to_string()],
        })
    }
}
