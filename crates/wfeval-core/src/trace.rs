//! Trace context handles for linking evaluation spans.

use tracing::span::Id;
use tracing::Span;

/// Opaque reference to a tracing span, used as the parent of a follows-from
/// link. Holding a context does not keep the span open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    id: Option<Id>,
}

impl TraceContext {
    /// A context with no parent; spans created from it start a new trace.
    pub fn none() -> Self {
        Self::default()
    }

    /// Context of the span the caller is currently in.
    pub fn current() -> Self {
        Self::of(&Span::current())
    }

    /// Context of the given span. Disabled spans yield an empty context.
    pub fn of(span: &Span) -> Self {
        Self { id: span.id() }
    }

    pub fn id(&self) -> Option<&Id> {
        self.id.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none()
    }

    /// Record `span` as following from this context. No-op for empty contexts.
    pub fn link(&self, span: &Span) {
        if let Some(id) = &self.id {
            span.follows_from(id.clone());
        }
    }
}

impl From<&Span> for TraceContext {
    fn from(span: &Span) -> Self {
        Self::of(span)
    }
}
