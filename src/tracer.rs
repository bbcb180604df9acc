//! Span interface consumed by the error monitor.
//!
//! Tracing backends live outside this crate. The monitor only needs to find
//! the active span and walk its parents, so that is all [`Span`] and
//! [`Tracer`] require.

use crate::trace_id::TraceIds;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A unique identifier for a span within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(pub u64);

impl SpanId {
    /// Generates a new monotonically increasing span ID.
    #[must_use]
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// A logical unit of work, as seen by the error monitor.
pub trait Span: Send + Sync {
    /// Span identifier.
    fn id(&self) -> SpanId;

    /// Human-readable operation name.
    fn name(&self) -> &str;

    /// Enclosing span, if any.
    fn parent(&self) -> Option<Arc<dyn Span>>;

    /// Trace IDs the span belongs to.
    fn trace_ids(&self) -> TraceIds {
        TraceIds::new()
    }
}

impl fmt::Debug for dyn Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

/// Tracer capability: knows which span is active.
pub trait Tracer: Send + Sync {
    /// The span currently active for this tracer's scope.
    fn active_span(&self) -> Option<Arc<dyn Span>>;
}

/// Returns the chain `root, ..., leaf` ending at `leaf`.
#[must_use]
pub fn span_path(leaf: Option<Arc<dyn Span>>) -> Vec<Arc<dyn Span>> {
    let mut path = Vec::new();
    let mut cursor = leaf;
    while let Some(span) = cursor {
        cursor = span.parent();
        path.push(span);
    }
    path.reverse();
    path
}

/// Minimal immutable span value.
///
/// Backend adapters can map their own spans onto this type when they do not
/// want to implement [`Span`] directly.
#[derive(Clone)]
pub struct SpanNode {
    id: SpanId,
    name: Arc<str>,
    parent: Option<Arc<dyn Span>>,
    trace_ids: TraceIds,
}

impl SpanNode {
    /// Creates a root span.
    #[must_use]
    pub fn root(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: SpanId::next(),
            name: name.into(),
            parent: None,
            trace_ids: TraceIds::new(),
        }
    }

    /// Creates a child of `parent`, inheriting its trace IDs.
    #[must_use]
    pub fn child_of(parent: Arc<dyn Span>, name: impl Into<Arc<str>>) -> Self {
        let trace_ids = parent.trace_ids();
        Self {
            id: SpanId::next(),
            name: name.into(),
            parent: Some(parent),
            trace_ids,
        }
    }

    /// Sets the trace IDs.
    #[must_use]
    pub fn with_trace_ids(mut self, trace_ids: TraceIds) -> Self {
        self.trace_ids = trace_ids;
        self
    }
}

impl Span for SpanNode {
    fn id(&self) -> SpanId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parent(&self) -> Option<Arc<dyn Span>> {
        self.parent.clone()
    }

    fn trace_ids(&self) -> TraceIds {
        self.trace_ids.clone()
    }
}

impl fmt::Debug for SpanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.id()))
            .finish()
    }
}
