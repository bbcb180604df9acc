//! Pluggable observability tools and the copy-on-write tool registry.
//!
//! A tool is any capability a call chain wants to carry along: a logger, a
//! metrics sink, a tracer, an error monitor. Tools are addressed by a stable
//! [`ToolId`] and stored as `Arc<dyn Tool>`. Typed access goes through the
//! per-kind accessors on [`Tool`] (`as_tracer`, `as_any` + downcast) rather
//! than through reflection on the registry itself.

use crate::field::FieldChain;
use crate::trace_id::TraceIds;
use crate::tracer::Tracer;
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Stable identifier of a tool kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolId(&'static str);

impl ToolId {
    /// Structured logger.
    pub const LOGGER: Self = Self("logger");
    /// Metrics sink.
    pub const METRICS: Self = Self("metrics");
    /// Tracer (source of the active span).
    pub const TRACER: Self = Self("tracer");
    /// Error monitor.
    pub const ERROR_MONITOR: Self = Self("error_monitor");

    /// Creates a custom tool identifier.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the identifier name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Capability trait for anything stored in a [`ToolRegistry`].
///
/// Derivations are copy-on-write: `with_context_fields` and `with_trace_ids`
/// return a new tool and leave `self` untouched, so a tool shared by many
/// call chains can be specialized per chain without locking.
pub trait Tool: Send + Sync + 'static {
    /// Returns a tool that carries `fields` as its ambient context.
    fn with_context_fields(&self, fields: &FieldChain) -> Arc<dyn Tool>;

    /// Returns a tool that carries `trace_ids` as its ambient trace scope.
    fn with_trace_ids(&self, trace_ids: &TraceIds) -> Arc<dyn Tool>;

    /// Delivers anything the tool buffers.
    fn flush(&self) {}

    /// Concrete-type access for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Tracer view of this tool, if it is one.
    fn as_tracer(&self) -> Option<&dyn Tracer> {
        None
    }
}

type Entry = (ToolId, Arc<dyn Tool>);

/// Immutable mapping from [`ToolId`] to tool instance.
///
/// [`with`](Self::with) copies the (small) entry table and shares every tool
/// instance with the receiver. Replacing an id keeps its position.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    entries: Option<Arc<SmallVec<[Entry; 4]>>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self { entries: None }
    }

    /// Returns a registry with `tool` registered under `id`.
    #[must_use]
    pub fn with(&self, id: ToolId, tool: Arc<dyn Tool>) -> Self {
        let mut entries: SmallVec<[Entry; 4]> = self.entries().iter().cloned().collect();
        match entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = tool,
            None => entries.push((id, tool)),
        }
        Self {
            entries: Some(Arc::new(entries)),
        }
    }

    /// Returns the tool registered under `id`.
    #[must_use]
    pub fn get(&self, id: ToolId) -> Option<&Arc<dyn Tool>> {
        self.entries()
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, tool)| tool)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = ToolId> + '_ {
        self.entries().iter().map(|(id, _)| *id)
    }

    /// Registered tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (ToolId, &Arc<dyn Tool>)> + '_ {
        self.entries().iter().map(|(id, tool)| (*id, tool))
    }

    fn entries(&self) -> &[Entry] {
        self.entries.as_deref().map_or(&[][..], SmallVec::as_slice)
    }
}

fn same_tool(a: &Arc<dyn Tool>, b: &Arc<dyn Tool>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl PartialEq for ToolRegistry {
    /// Two registries are equal when they map the same ids to the same
    /// instances in the same order.
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.entries(), other.entries());
        a.len() == b.len()
            && a
                .iter()
                .zip(b)
                .all(|((ia, ta), (ib, tb))| ia == ib && same_tool(ta, tb))
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
