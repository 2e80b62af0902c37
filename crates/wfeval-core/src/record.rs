//! A single evaluation of a controlled entity.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The outcome action of an evaluation.
///
/// Actions are produced and interpreted by the decision engine; the core only
/// stores them and reads their name for diagnostics. Use [`Action::as_any`] to
/// downcast back to the concrete type.
pub trait Action: fmt::Debug + Send + Sync + 'static {
    /// Short, human-readable action name (e.g. `"invoke_task"`).
    fn name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

/// Metadata describing one evaluation of an entity.
#[derive(Debug, Clone)]
pub struct EvalRecord {
    /// Time at which the evaluation started. Evaluations are treated as
    /// instantaneous, so there is no end time.
    pub timestamp: DateTime<Utc>,

    /// Why the evaluation was triggered, e.g. `"tick"` or `"notification"`.
    pub cause: Option<String>,

    /// The action the evaluation resulted in, if any.
    pub action: Option<Arc<dyn Action>>,

    /// The error the evaluation resulted in, if any.
    pub error: Option<Arc<anyhow::Error>>,

    /// Rules consulted to reach the outcome, in evaluation order.
    pub rule_path: Vec<String>,
}

impl EvalRecord {
    /// Create a record timestamped now.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Create a record with an explicit start time.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            cause: None,
            action: None,
            error: None,
            rule_path: Vec::new(),
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_action(mut self, action: Arc<dyn Action>) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_error(mut self, error: anyhow::Error) -> Self {
        self.error = Some(Arc::new(error));
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

    /// Append one rule to the rule path.
    pub fn push_rule(&mut self, rule: impl Into<String>) {
        self.rule_path.push(rule.into());
    }

    /// Name of the recorded action, if any.
    pub fn action_name(&self) -> Option<&str> {
        self.action.as_deref().map(|action| action.name())
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Flatten the record into a serializable summary for status output.
    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            timestamp: self.timestamp,
            cause: self.cause.clone(),
            action: self.action_name().map(str::to_string),
            error: self.error.as_ref().map(|e| format!("{e:#}")),
            rule_path: self.rule_path.clone(),
        }
    }
}

impl Default for EvalRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Display form of an [`EvalRecord`] with opaque fields rendered as strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub timestamp: DateTime<Utc>,
    pub cause: Option<String>,
    pub action: Option<String>,
    pub error: Option<String>,
    pub rule_path: Vec<String>,
}
