//! The belt: one immutable context value bundling fields, trace IDs and tools.
//!
//! Every `with_*` method returns a new belt that shares all unmodified parts
//! with the receiver. Callers propagate the new value down their own call
//! chain; nothing flows back up to the caller that handed them the belt.
//!
//! ```
//! use belt::{Belt, Fields};
//!
//! let root = Belt::new().with_field("service", "billing");
//! let request = root.with_trace_id("req-42").with_field("user", "alice");
//!
//! assert_eq!(root.fields().len(), 1);
//! let keys: Vec<_> = request.fields().iter().map(|f| f.key().to_string()).collect();
//! assert_eq!(keys, ["user", "service"]);
//! ```

use crate::field::{Field, FieldChain, Fields, Properties, Value};
use crate::tool::{Tool, ToolId, ToolRegistry};
use crate::trace_id::{TraceId, TraceIds};
use std::fmt;
use std::sync::Arc;

/// Immutable observability context.
///
/// Cloning is three reference-count bumps.
#[derive(Clone, Default)]
pub struct Belt {
    fields: FieldChain,
    trace_ids: TraceIds,
    tools: ToolRegistry,
}

impl Belt {
    /// Creates an empty belt.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fields: FieldChain::new(),
            trace_ids: TraceIds::new(),
            tools: ToolRegistry::new(),
        }
    }

    /// Adds one field.
    #[must_use]
    pub fn with_field(&self, key: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        self.with_field_value(Field::new(key, value))
    }

    /// Adds one field carrying capability tags.
    #[must_use]
    pub fn with_field_props(
        &self,
        key: impl Into<Arc<str>>,
        value: impl Into<Value>,
        properties: Properties,
    ) -> Self {
        self.with_field_value(Field::new(key, value).with_properties(properties))
    }

    /// Adds a prepared field.
    #[must_use]
    pub fn with_field_value(&self, field: Field) -> Self {
        Self {
            fields: self.fields.with_field(field),
            ..self.clone()
        }
    }

    /// Adds a batch of fields as a single chain node.
    #[must_use]
    pub fn with_fields<I: IntoIterator<Item = Field>>(&self, fields: I) -> Self {
        Self {
            fields: self.fields.with_fields(fields),
            ..self.clone()
        }
    }

    /// Enters a new trace scope.
    #[must_use]
    pub fn with_trace_id(&self, id: impl Into<TraceId>) -> Self {
        Self {
            trace_ids: self.trace_ids.with(id),
            ..self.clone()
        }
    }

    /// Enters several trace scopes; the last one becomes the newest.
    #[must_use]
    pub fn with_trace_ids<I, T>(&self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TraceId>,
    {
        let trace_ids = ids
            .into_iter()
            .fold(self.trace_ids.clone(), |acc, id| acc.with(id));
        Self {
            trace_ids,
            ..self.clone()
        }
    }

    /// Registers (or replaces) a tool.
    #[must_use]
    pub fn with_tool(&self, id: ToolId, tool: Arc<dyn Tool>) -> Self {
        Self {
            tools: self.tools.with(id, tool),
            ..self.clone()
        }
    }

    /// Context fields, newest first.
    #[must_use]
    pub fn fields(&self) -> &FieldChain {
        &self.fields
    }

    /// Trace IDs, newest first.
    #[must_use]
    pub fn trace_ids(&self) -> &TraceIds {
        &self.trace_ids
    }

    /// Registered tools.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Returns the tool registered under `id`, or `None`.
    #[must_use]
    pub fn tool_by_id(&self, id: ToolId) -> Option<Arc<dyn Tool>> {
        self.tools.get(id).cloned()
    }

    /// Returns the tool registered under `id`, derived with this belt's
    /// fields and trace IDs.
    #[must_use]
    pub fn bound_tool(&self, id: ToolId) -> Option<Arc<dyn Tool>> {
        let tool = self.tools.get(id)?;
        let tool = if self.fields.is_empty() {
            Arc::clone(tool)
        } else {
            tool.with_context_fields(&self.fields)
        };
        Some(if self.trace_ids.is_empty() {
            tool
        } else {
            tool.with_trace_ids(&self.trace_ids)
        })
    }

    /// Flushes every registered tool.
    pub fn flush(&self) {
        for (_, tool) in self.tools.iter() {
            tool.flush();
        }
    }
}

impl Fields for Belt {
    fn for_each_field(&self, f: &mut dyn FnMut(&Field) -> bool) -> bool {
        self.fields.for_each_field(f)
    }

    fn len(&self) -> usize {
        self.fields.len()
    }
}

impl fmt::Debug for Belt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Belt")
            .field("fields", &self.fields)
            .field("trace_ids", &self.trace_ids)
            .field("tools", &self.tools)
            .finish()
    }
}
