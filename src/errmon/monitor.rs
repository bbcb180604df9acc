//! The error monitor.
//!
//! # Pipeline
//!
//! ```text
//! observe_error / observe_recover
//!        │
//!        ├─ input absent ─────────────► None
//!        ▼
//!   pre-hooks ── skip ───────────────► None
//!        │ extra fields
//!        ▼
//!   capture (caller, stack, threads)
//!        ▼
//!   assemble Event
//!        ▼
//!     hooks ──── veto ───────────────► None
//!        ▼
//!     emit ──────────────────────────► Some(event)
//! ```
//!
//! Every step runs on the calling thread, in this order. Capture failures
//! only make the event thinner; they never fail the call.

use super::emitter::{Emitter, NoopEmitter};
use super::event::{Entry, EntryProperties, Event, EventId, Exception, PanicValue};
use super::hooks::{Hook, Hooks, PreHook, PreHooks};
use crate::belt::Belt;
use crate::capture::{Capture, PcFilter, SystemCapture, default_pc_filter};
use crate::carrier::CallContext;
use crate::field::{ErrorRef, FieldChain, Fields};
use crate::level::Level;
use crate::tool::{Tool, ToolId};
use crate::trace_id::TraceIds;
use crate::tracer::{Span, span_path};
use crate::tracing_compat::trace;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

enum Input {
    Error(ErrorRef),
    Panic(PanicValue),
}

/// Assembles, filters and dispatches error and panic events.
///
/// Cloning is cheap and every `with_*` derivation returns a new monitor that
/// shares the emitter and capture backend with the receiver.
#[derive(Clone)]
pub struct ErrorMonitor {
    emitter: Arc<dyn Emitter>,
    pre_hooks: PreHooks,
    hooks: Hooks,
    context_fields: FieldChain,
    /// Last chain folded in by `with_context_fields`; belts built on it
    /// contribute only their newer fields.
    folded_fields: FieldChain,
    trace_ids: TraceIds,
    capture: Arc<dyn Capture>,
    pc_filter: Option<PcFilter>,
}

impl ErrorMonitor {
    /// Creates a monitor emitting to `emitter`.
    #[must_use]
    pub fn new(emitter: Arc<dyn Emitter>) -> Self {
        Self {
            emitter,
            pre_hooks: PreHooks::new(),
            hooks: Hooks::new(),
            context_fields: FieldChain::new(),
            folded_fields: FieldChain::new(),
            trace_ids: TraceIds::new(),
            capture: Arc::new(SystemCapture::default()),
            pc_filter: None,
        }
    }

    /// Returns a monitor with `hooks` run after the existing pre-hooks.
    #[must_use]
    pub fn with_pre_hooks<I: IntoIterator<Item = Arc<dyn PreHook>>>(&self, hooks: I) -> Self {
        Self {
            pre_hooks: self.pre_hooks.with(hooks),
            ..self.clone()
        }
    }

    /// Returns a monitor with `hooks` run after the existing hooks.
    #[must_use]
    pub fn with_hooks<I: IntoIterator<Item = Arc<dyn Hook>>>(&self, hooks: I) -> Self {
        Self {
            hooks: self.hooks.with(hooks),
            ..self.clone()
        }
    }

    /// Returns a monitor whose events also carry `fields`, layered on top of
    /// the monitor's existing context fields.
    ///
    /// A belt whose fields extend `fields` (as with [`Belt::bound_tool`])
    /// adds only the fields above that shared part, so nothing is reported
    /// twice.
    #[must_use]
    pub fn with_context_fields(&self, fields: &FieldChain) -> Self {
        Self {
            context_fields: self.context_fields.with_chain(fields),
            folded_fields: fields.clone(),
            ..self.clone()
        }
    }

    /// Returns a monitor with `trace_ids` entered on top of its own. They are
    /// used for belts that carry no trace IDs.
    #[must_use]
    pub fn with_trace_ids(&self, trace_ids: &TraceIds) -> Self {
        let merged = if self.trace_ids.is_empty() {
            trace_ids.clone()
        } else {
            let mut newer = trace_ids.to_vec();
            newer.reverse();
            newer
                .into_iter()
                .fold(self.trace_ids.clone(), |acc, id| acc.with(id))
        };
        Self {
            trace_ids: merged,
            ..self.clone()
        }
    }

    /// Returns a monitor emitting to `emitter`.
    #[must_use]
    pub fn with_emitter(&self, emitter: Arc<dyn Emitter>) -> Self {
        Self {
            emitter,
            ..self.clone()
        }
    }

    /// Returns a monitor using `capture` as its diagnostic source.
    #[must_use]
    pub fn with_capture(&self, capture: Arc<dyn Capture>) -> Self {
        Self {
            capture,
            ..self.clone()
        }
    }

    /// Returns a monitor skipping frames with `filter` instead of the
    /// process-wide default.
    #[must_use]
    pub fn with_pc_filter(&self, filter: PcFilter) -> Self {
        Self {
            pc_filter: Some(filter),
            ..self.clone()
        }
    }

    /// The emitter.
    #[must_use]
    pub fn emitter(&self) -> &Arc<dyn Emitter> {
        &self.emitter
    }

    /// Pre-hooks, in run order.
    #[must_use]
    pub fn pre_hooks(&self) -> &PreHooks {
        &self.pre_hooks
    }

    /// Hooks, in run order.
    #[must_use]
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Fields added to every event.
    #[must_use]
    pub fn context_fields(&self) -> &FieldChain {
        &self.context_fields
    }

    /// Fallback trace IDs.
    #[must_use]
    pub fn trace_ids(&self) -> &TraceIds {
        &self.trace_ids
    }

    /// Forwards to the emitter.
    pub fn flush(&self) {
        self.emitter.flush();
    }

    /// Reports `error` in the context of `belt`.
    ///
    /// Returns `None` when `error` is `None`, a pre-hook skipped the call or a
    /// hook vetoed the event. Otherwise returns the emitted event.
    pub fn observe_error(&self, belt: &Belt, error: Option<ErrorRef>) -> Option<Event> {
        let error = error?;
        self.observe(belt, active_span(belt), Input::Error(error))
    }

    /// Reports a recovered panic payload in the context of `belt`.
    ///
    /// `payload` is what [`std::panic::catch_unwind`] returned in its `Err`.
    pub fn observe_recover(
        &self,
        belt: &Belt,
        payload: Option<Box<dyn Any + Send>>,
    ) -> Option<Event> {
        let value = PanicValue::from_payload(payload?);
        self.observe(belt, active_span(belt), Input::Panic(value))
    }

    /// [`observe_error`](Self::observe_error) with the belt and span carried
    /// by `ctx`.
    pub fn observe_error_in(&self, ctx: &CallContext, error: Option<ErrorRef>) -> Option<Event> {
        let error = error?;
        let belt = ctx.retrieve();
        let span = ctx.span().cloned().or_else(|| active_span(&belt));
        self.observe(&belt, span, Input::Error(error))
    }

    /// [`observe_recover`](Self::observe_recover) with the belt and span
    /// carried by `ctx`.
    pub fn observe_recover_in(
        &self,
        ctx: &CallContext,
        payload: Option<Box<dyn Any + Send>>,
    ) -> Option<Event> {
        let value = PanicValue::from_payload(payload?);
        let belt = ctx.retrieve();
        let span = ctx.span().cloned().or_else(|| active_span(&belt));
        self.observe(&belt, span, Input::Panic(value))
    }

    fn observe(&self, belt: &Belt, span: Option<Arc<dyn Span>>, input: Input) -> Option<Event> {
        let trace_ids = if belt.trace_ids().is_empty() {
            self.trace_ids.clone()
        } else {
            belt.trace_ids().clone()
        };

        let extra_fields = match &input {
            Input::Error(error) => self.pre_hooks.run_error(&trace_ids, error),
            Input::Panic(value) => self.pre_hooks.run_panic(&trace_ids, value),
        };
        let Some(extra_fields) = extra_fields else {
            trace!(trace_ids = ?trace_ids, "pre-hook skipped observe call");
            return None;
        };

        let filter = self.pc_filter.clone().unwrap_or_else(default_pc_filter);
        let caller = self.capture.caller_pc(&*filter);
        let stack_trace = self.capture.stack_trace(&*filter);
        let threads = self.capture.threads();

        let fields = self
            .context_fields
            .with_chain(&belt.fields().newer_than(&self.folded_fields))
            .with_fields(extra_fields);

        let (level, properties, message, exception) = match input {
            Input::Error(error) => (
                Level::Error,
                EntryProperties::IS_ERROR_EVENT,
                error.to_string(),
                Exception {
                    error: Some(error),
                    is_panic: false,
                    panic_value: None,
                    stack_trace,
                },
            ),
            Input::Panic(value) => (
                Level::Panic,
                EntryProperties::IS_PANIC_EVENT,
                value.to_string(),
                Exception {
                    error: None,
                    is_panic: true,
                    panic_value: Some(value),
                    stack_trace,
                },
            ),
        };

        let mut event = Event {
            entry: Entry {
                timestamp: SystemTime::now(),
                level,
                message,
                fields,
                trace_ids,
                caller,
                properties: EntryProperties::IS_ERROR_MONITORING_EVENT | properties,
            },
            id: EventId::next(),
            external_ids: Vec::new(),
            exception,
            spans: span_path(span),
            current_thread_id: threads.current_id,
            threads: threads.threads,
        };

        if !self.hooks.run(&mut event) {
            trace!(event_id = %event.id, "hook vetoed event");
            return None;
        }
        self.emitter.emit(&mut event);
        Some(event)
    }
}

impl Default for ErrorMonitor {
    fn default() -> Self {
        Self::new(Arc::new(NoopEmitter))
    }
}

/// Active span of the belt's tracer tool.
fn active_span(belt: &Belt) -> Option<Arc<dyn Span>> {
    belt.tool_by_id(ToolId::TRACER)?.as_tracer()?.active_span()
}

impl Tool for ErrorMonitor {
    fn with_context_fields(&self, fields: &FieldChain) -> Arc<dyn Tool> {
        Arc::new(Self::with_context_fields(self, fields))
    }

    fn with_trace_ids(&self, trace_ids: &TraceIds) -> Arc<dyn Tool> {
        Arc::new(Self::with_trace_ids(self, trace_ids))
    }

    fn flush(&self) {
        Self::flush(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for ErrorMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorMonitor")
            .field("pre_hooks", &self.pre_hooks)
            .field("hooks", &self.hooks)
            .field("context_fields", &self.context_fields.len())
            .field("trace_ids", &self.trace_ids)
            .field("custom_filter", &self.pc_filter.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errmon::event::EventRefExt;
    use crate::errmon::hooks::PreHookResult;
    use crate::field::{Field, Value};
    use crate::tracer::{SpanNode, Tracer};
    use parking_lot::Mutex;
    use std::io;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Event>>);

    impl Emitter for Collect {
        fn flush(&self) {}

        fn emit(&self, event: &mut Event) {
            self.0.lock().push(event.clone());
        }
    }

    struct FixedTracer(Arc<dyn Span>);

    impl Tracer for FixedTracer {
        fn active_span(&self) -> Option<Arc<dyn Span>> {
            Some(Arc::clone(&self.0))
        }
    }

    impl Tool for FixedTracer {
        fn with_context_fields(&self, _: &FieldChain) -> Arc<dyn Tool> {
            Arc::new(Self(Arc::clone(&self.0)))
        }

        fn with_trace_ids(&self, _: &TraceIds) -> Arc<dyn Tool> {
            Arc::new(Self(Arc::clone(&self.0)))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_tracer(&self) -> Option<&dyn Tracer> {
            Some(self)
        }
    }

    fn keys(fields: &FieldChain) -> Vec<String> {
        fields.iter().map(|f| f.key().to_string()).collect()
    }

    fn error(msg: &str) -> ErrorRef {
        Arc::new(io::Error::other(msg.to_string()))
    }

    #[test]
    fn absent_error_is_no_event() {
        let monitor = ErrorMonitor::default();
        let event = monitor.observe_error(&Belt::new(), None);
        assert!(event.is_none());
        assert!(monitor.observe_recover(&Belt::new(), None).is_none());
    }

    #[test]
    fn error_event_shape() {
        let sink = Arc::new(Collect::default());
        let monitor = ErrorMonitor::new(sink.clone());
        let err = error("disk full");
        let event = monitor
            .observe_error(&Belt::new(), Some(Arc::clone(&err)))
            .expect("event");

        assert_eq!(event.entry.level, Level::Error);
        assert_eq!(event.entry.message, "disk full");
        assert!(event.entry.properties.contains(
            EntryProperties::IS_ERROR_MONITORING_EVENT | EntryProperties::IS_ERROR_EVENT
        ));
        assert!(!event.entry.properties.contains(EntryProperties::IS_PANIC_EVENT));
        let seen = event.exception.error.as_ref().expect("error attached");
        assert!(Arc::ptr_eq(seen, &err));
        assert!(!event.exception.is_panic);
        assert_ne!(event.id, EventId::NONE);
        assert_eq!(sink.0.lock().len(), 1);
    }

    #[test]
    fn panic_event_shape() {
        let monitor = ErrorMonitor::default();
        let event = monitor.observe_recover(&Belt::new(), Some(Box::new("boom")));
        let event = event.as_ref();
        assert!(event.is_panic());
        assert_eq!(event.level(), Level::Panic);
        assert_eq!(event.message(), "boom");
        assert_eq!(event.panic_value().and_then(PanicValue::as_str), Some("boom"));
    }

    #[test]
    fn field_layering() {
        let monitor = ErrorMonitor::default()
            .with_context_fields(&FieldChain::new().with_field(Field::new("monitor", 1)));
        let extra: Arc<dyn PreHook> = Arc::new(Extra);
        let monitor = monitor.with_pre_hooks([extra]);
        let belt = Belt::new().with_field("belt", 2);

        let event = monitor
            .observe_error(&belt, Some(error("x")))
            .expect("event");
        assert_eq!(keys(&event.entry.fields), ["extra", "belt", "monitor"]);
    }

    struct Extra;

    impl PreHook for Extra {
        fn process_input_error(&self, _: &TraceIds, _: &ErrorRef) -> PreHookResult {
            PreHookResult::proceed().with_field(Field::new("extra", 3))
        }

        fn process_input_panic(&self, _: &TraceIds, _: &PanicValue) -> PreHookResult {
            PreHookResult::proceed()
        }
    }

    #[test]
    fn belt_trace_ids_win_over_monitor() {
        let monitor = ErrorMonitor::default().with_trace_ids(&TraceIds::new().with("monitor"));

        let own = monitor
            .observe_error(&Belt::new(), Some(error("x")))
            .expect("event");
        assert_eq!(own.entry.trace_ids, TraceIds::new().with("monitor"));

        let belt = Belt::new().with_trace_id("belt");
        let from_belt = monitor.observe_error(&belt, Some(error("x"))).expect("event");
        assert_eq!(from_belt.entry.trace_ids, TraceIds::new().with("belt"));
    }

    #[test]
    fn spans_are_root_to_leaf() {
        let root: Arc<dyn Span> = Arc::new(SpanNode::root("request"));
        let leaf: Arc<dyn Span> = Arc::new(SpanNode::child_of(Arc::clone(&root), "db"));
        let belt = Belt::new().with_tool(ToolId::TRACER, Arc::new(FixedTracer(leaf)));

        let event = ErrorMonitor::default()
            .observe_error(&belt, Some(error("x")))
            .expect("event");
        let names: Vec<_> = event.spans.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, ["request", "db"]);
    }

    #[test]
    fn call_context_span_is_used() {
        let span: Arc<dyn Span> = Arc::new(SpanNode::root("handler"));
        let ctx = CallContext::new()
            .attach(Belt::new().with_field("user", "alice"))
            .with_span(span);

        let event = ErrorMonitor::default()
            .observe_error_in(&ctx, Some(error("x")))
            .expect("event");
        assert_eq!(event.spans.len(), 1);
        assert_eq!(event.spans[0].name(), "handler");
        assert_eq!(event.entry.fields.get("user"), Some(Value::from("alice")));

        let panic = ErrorMonitor::default()
            .observe_recover_in(&ctx, Some(Box::new(String::from("bang"))))
            .expect("event");
        assert_eq!(panic.spans.len(), 1);
    }

    #[test]
    fn veto_suppresses_emit() {
        let sink = Arc::new(Collect::default());
        let veto: Arc<dyn Hook> = Arc::new(|_: &mut Event| false);
        let monitor = ErrorMonitor::new(sink.clone()).with_hooks([veto]);
        assert!(monitor.observe_error(&Belt::new(), Some(error("x"))).is_none());
        assert!(sink.0.lock().is_empty());
    }

    #[test]
    fn hooks_can_edit_event() {
        let tag: Arc<dyn Hook> = Arc::new(|event: &mut Event| {
            event.add_field(Field::new("tagged", true));
            true
        });
        let event = ErrorMonitor::default()
            .with_hooks([tag])
            .observe_error(&Belt::new(), Some(error("x")))
            .expect("event");
        assert_eq!(event.entry.fields.get("tagged"), Some(Value::from(true)));
    }

    #[test]
    fn derivation_leaves_receiver_untouched() {
        let base = ErrorMonitor::default();
        let veto: Arc<dyn Hook> = Arc::new(|_: &mut Event| false);
        let derived = base
            .with_hooks([veto])
            .with_context_fields(&FieldChain::new().with_field(Field::new("k", 1)))
            .with_trace_ids(&TraceIds::new().with("t"));
        assert!(base.hooks().is_empty());
        assert!(base.context_fields().is_empty());
        assert!(base.trace_ids().is_empty());
        assert_eq!(derived.hooks().len(), 1);
        assert!(Arc::ptr_eq(base.emitter(), derived.emitter()));
    }

    #[test]
    fn monitor_is_a_tool() {
        let belt = Belt::new()
            .with_tool(ToolId::ERROR_MONITOR, Arc::new(ErrorMonitor::default()))
            .with_field("svc", "api")
            .with_trace_id("t1");
        let bound = belt.bound_tool(ToolId::ERROR_MONITOR).expect("registered");
        let monitor = bound
            .as_any()
            .downcast_ref::<ErrorMonitor>()
            .expect("monitor type");
        assert_eq!(monitor.context_fields().get("svc"), Some(Value::from("api")));
        assert_eq!(monitor.trace_ids(), &TraceIds::new().with("t1"));
    }

    #[test]
    fn bound_monitor_reports_belt_fields_once() {
        let belt = Belt::new()
            .with_error_monitor(ErrorMonitor::default())
            .with_field("svc", "api");
        let bound = belt.bound_tool(ToolId::ERROR_MONITOR).expect("registered");
        let monitor = bound
            .as_any()
            .downcast_ref::<ErrorMonitor>()
            .expect("monitor type");

        let event = monitor
            .observe_error(&belt, Some(error("x")))
            .expect("event");
        assert_eq!(keys(&event.entry.fields), ["svc"]);

        let child = belt.with_field("user", "alice");
        let event = monitor
            .observe_error(&child, Some(error("x")))
            .expect("event");
        assert_eq!(keys(&event.entry.fields), ["user", "svc"]);

        let unrelated = Belt::new().with_field("svc", "web");
        let event = monitor
            .observe_error(&unrelated, Some(error("x")))
            .expect("event");
        assert_eq!(keys(&event.entry.fields), ["svc", "svc"]);
    }
}
