//! Error and panic monitoring.
//!
//! An [`ErrorMonitor`] lives in a belt under [`ToolId::ERROR_MONITOR`]. Code
//! that wants to report something does not need to know whether one was
//! registered: [`from_belt`] falls back to a process-wide default monitor,
//! which emits nowhere until [`set_default_monitor`] installs a real one.
//!
//! ```
//! use belt::Belt;
//! use belt::errmon;
//! use std::sync::Arc;
//!
//! let belt = Belt::new().with_field("user", "alice");
//! let err: belt::ErrorRef = Arc::new(std::io::Error::other("disk full"));
//!
//! // The default monitor discards events but still returns them.
//! let event = errmon::observe_error(&belt, Some(err)).expect("not filtered");
//! assert_eq!(event.entry.message, "disk full");
//! ```

pub mod emitter;
pub mod event;
pub mod hooks;
pub mod monitor;
pub mod sampler;

pub use emitter::{Emitter, Emitters, NoopEmitter};
pub use event::{
    Entry, EntryProperties, Event, EventId, EventRefExt, Exception, ExternalId, PanicValue,
};
pub use hooks::{Hook, Hooks, PreHook, PreHookResult, PreHooks};
pub use monitor::ErrorMonitor;
pub use sampler::{
    AlwaysSample, NeverSample, RandomRatio, SAMPLED_FIELD, Sampler, SamplingStrategy, TraceIdRatio,
};

use crate::belt::Belt;
use crate::field::ErrorRef;
use crate::tool::ToolId;
use parking_lot::RwLock;
use std::any::Any;
use std::sync::{Arc, LazyLock};

static DEFAULT_MONITOR: LazyLock<RwLock<ErrorMonitor>> =
    LazyLock::new(|| RwLock::new(ErrorMonitor::default()));

/// The process-wide fallback monitor.
#[must_use]
pub fn default_monitor() -> ErrorMonitor {
    DEFAULT_MONITOR.read().clone()
}

/// Replaces the process-wide fallback monitor and returns the previous one.
pub fn set_default_monitor(monitor: ErrorMonitor) -> ErrorMonitor {
    std::mem::replace(&mut *DEFAULT_MONITOR.write(), monitor)
}

/// The monitor registered in `belt`, or the process default.
#[must_use]
pub fn from_belt(belt: &Belt) -> ErrorMonitor {
    belt.tool_by_id(ToolId::ERROR_MONITOR)
        .and_then(|tool| tool.as_any().downcast_ref::<ErrorMonitor>().cloned())
        .unwrap_or_else(default_monitor)
}

/// [`ErrorMonitor::observe_error`] on [`from_belt`].
pub fn observe_error(belt: &Belt, error: Option<ErrorRef>) -> Option<Event> {
    from_belt(belt).observe_error(belt, error)
}

/// [`ErrorMonitor::observe_recover`] on [`from_belt`].
pub fn observe_recover(belt: &Belt, payload: Option<Box<dyn Any + Send>>) -> Option<Event> {
    from_belt(belt).observe_recover(belt, payload)
}

impl Belt {
    /// Registers `monitor` under [`ToolId::ERROR_MONITOR`].
    #[must_use]
    pub fn with_error_monitor(&self, monitor: ErrorMonitor) -> Self {
        self.with_tool(ToolId::ERROR_MONITOR, Arc::new(monitor))
    }
}
