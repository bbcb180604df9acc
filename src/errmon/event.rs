//! Event types produced by the error monitor.

use crate::capture::{ProgramCounter, StackTrace, ThreadSnapshot};
use crate::field::{ErrorRef, Field, FieldChain};
use crate::level::Level;
use crate::trace_id::TraceIds;
use crate::tracer::Span;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Process-unique event identifier. Zero means "no event".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    /// The absent id.
    pub const NONE: Self = Self(0);

    /// Allocates the next id.
    #[must_use]
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Classification tags attached to an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EntryProperties(u8);

impl EntryProperties {
    /// No tags.
    pub const EMPTY: Self = Self(0);
    /// The entry was produced by the error monitor.
    pub const IS_ERROR_MONITORING_EVENT: Self = Self(1 << 0);
    /// The entry reports an error value.
    pub const IS_ERROR_EVENT: Self = Self(1 << 1);
    /// The entry reports a recovered panic.
    pub const IS_PANIC_EVENT: Self = Self(1 << 2);

    /// Returns `true` if every tag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no tag is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EntryProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// The log-entry part of an event.
#[derive(Debug, Clone)]
pub struct Entry {
    /// When the event was assembled.
    pub timestamp: SystemTime,
    /// `Error` or `Panic`.
    pub level: Level,
    /// Error display text or panic message.
    pub message: String,
    /// Context fields, newest first.
    pub fields: FieldChain,
    /// Trace scopes, newest first.
    pub trace_ids: TraceIds,
    /// First user frame above the observe call.
    pub caller: ProgramCounter,
    /// Classification tags.
    pub properties: EntryProperties,
}

/// Identifier assigned to an event by a sink.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalId {
    /// Which sink assigned it.
    pub source: String,
    /// The sink's id.
    pub id: String,
}

impl ExternalId {
    /// Creates an external id.
    #[must_use]
    pub fn new(source: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            id: id.into(),
        }
    }
}

/// Payload of a recovered panic.
///
/// The raw payload is kept intact so callers can downcast it or resume the
/// unwind. `&str` and `String` payloads are also exposed as text.
#[derive(Clone)]
pub struct PanicValue {
    payload: Arc<Mutex<Box<dyn Any + Send>>>,
    message: Option<String>,
}

impl PanicValue {
    /// Wraps a payload as returned by [`std::panic::catch_unwind`].
    #[must_use]
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&'static str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned());
        Self {
            payload: Arc::new(Mutex::new(payload)),
            message,
        }
    }

    /// Wraps any value.
    #[must_use]
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self::from_payload(Box::new(value))
    }

    /// The payload as text, for string payloads.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns `true` if the payload is a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.payload.lock().is::<T>()
    }

    /// Runs `f` on the payload if it is a `T`.
    pub fn with_payload<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.payload.lock().downcast_ref::<T>().map(f)
    }

    /// Recovers the raw payload if this is the only handle to it, e.g. to
    /// pass it to [`std::panic::resume_unwind`].
    ///
    /// # Errors
    ///
    /// Returns `self` unchanged when other clones are alive.
    pub fn try_into_payload(self) -> Result<Box<dyn Any + Send>, Self> {
        let message = self.message;
        Arc::try_unwrap(self.payload)
            .map(Mutex::into_inner)
            .map_err(|payload| Self { payload, message })
    }
}

impl fmt::Display for PanicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().unwrap_or("Box<dyn Any>"))
    }
}

impl fmt::Debug for PanicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PanicValue").field(&self.to_string()).finish()
    }
}

impl PartialEq<&str> for PanicValue {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

/// What went wrong.
#[derive(Debug, Clone, Default)]
pub struct Exception {
    /// The observed error; `None` for panics.
    pub error: Option<ErrorRef>,
    /// Whether this reports a recovered panic.
    pub is_panic: bool,
    /// The recovered payload; `None` for errors.
    pub panic_value: Option<PanicValue>,
    /// Stack at the observe call.
    pub stack_trace: StackTrace,
}

/// Everything known about one reported error or panic.
#[derive(Debug, Clone)]
pub struct Event {
    /// Log-entry view.
    pub entry: Entry,
    /// Process-unique id.
    pub id: EventId,
    /// Ids assigned by sinks during emit.
    pub external_ids: Vec<ExternalId>,
    /// The error or panic.
    pub exception: Exception,
    /// Active span path, root to leaf.
    pub spans: Vec<Arc<dyn Span>>,
    /// Id of the observing thread.
    pub current_thread_id: u64,
    /// Snapshot of the live threads.
    pub threads: Vec<ThreadSnapshot>,
}

impl Event {
    /// Adds a field on top of the entry's fields.
    pub fn add_field(&mut self, field: Field) {
        self.entry.fields = self.entry.fields.with_field(field);
    }

    /// Records a sink-assigned id.
    pub fn add_external_id(&mut self, id: ExternalId) {
        self.external_ids.push(id);
    }

    /// Snapshot of the observing thread, if it was captured.
    #[must_use]
    pub fn current_thread(&self) -> Option<&ThreadSnapshot> {
        self.threads.iter().find(|t| t.id == self.current_thread_id)
    }

    /// Returns `true` for panic events.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        self.exception.is_panic
    }
}

/// Null-safe accessors on an optional event.
///
/// Every getter returns the zero value when the event is absent, so callers
/// can inspect the result of an observe call without matching on it.
pub trait EventRefExt<'a> {
    /// Event id, or [`EventId::NONE`].
    fn event_id(self) -> EventId;
    /// Level, or the default level.
    fn level(self) -> Level;
    /// Message, or `""`.
    fn message(self) -> &'a str;
    /// The observed error.
    fn error(self) -> Option<&'a ErrorRef>;
    /// Panic flag, or `false`.
    fn is_panic(self) -> bool;
    /// Panic payload.
    fn panic_value(self) -> Option<&'a PanicValue>;
    /// Number of captured frames, or 0.
    fn stack_len(self) -> usize;
    /// External ids, or an empty slice.
    fn external_ids(self) -> &'a [ExternalId];
    /// Observing thread id, or 0.
    fn current_thread_id(self) -> u64;
}

impl<'a> EventRefExt<'a> for Option<&'a Event> {
    fn event_id(self) -> EventId {
        self.map_or(EventId::NONE, |e| e.id)
    }

    fn level(self) -> Level {
        self.map_or_else(Level::default, |e| e.entry.level)
    }

    fn message(self) -> &'a str {
        self.map_or("", |e| e.entry.message.as_str())
    }

    fn error(self) -> Option<&'a ErrorRef> {
        self.and_then(|e| e.exception.error.as_ref())
    }

    fn is_panic(self) -> bool {
        self.is_some_and(|e| e.exception.is_panic)
    }

    fn panic_value(self) -> Option<&'a PanicValue> {
        self.and_then(|e| e.exception.panic_value.as_ref())
    }

    fn stack_len(self) -> usize {
        self.map_or(0, |e| e.exception.stack_trace.len())
    }

    fn external_ids(self) -> &'a [ExternalId] {
        self.map_or(&[][..], |e| e.external_ids.as_slice())
    }

    fn current_thread_id(self) -> u64 {
        self.map_or(0, |e| e.current_thread_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_are_monotonic_and_nonzero() {
        let a = EventId::next();
        let b = EventId::next();
        assert_ne!(a, EventId::NONE);
        assert!(b > a);
    }

    #[test]
    fn entry_properties_combine() {
        let props = EntryProperties::IS_ERROR_MONITORING_EVENT | EntryProperties::IS_PANIC_EVENT;
        assert!(props.contains(EntryProperties::IS_PANIC_EVENT));
        assert!(props.contains(EntryProperties::IS_ERROR_MONITORING_EVENT));
        assert!(!props.contains(EntryProperties::IS_ERROR_EVENT));
        assert!(EntryProperties::EMPTY.is_empty());
    }

    #[test]
    fn panic_value_reads_string_payloads() {
        assert_eq!(PanicValue::new("boom"), "boom");
        assert_eq!(PanicValue::new(String::from("bang")).as_str(), Some("bang"));

        let opaque = PanicValue::new(42_u32);
        assert!(opaque.as_str().is_none());
        assert!(opaque.is::<u32>());
        assert_eq!(opaque.with_payload(|n: &u32| *n + 1), Some(43));
        assert_eq!(opaque.to_string(), "Box<dyn Any>");
    }

    #[test]
    fn panic_value_payload_recovery() {
        let value = PanicValue::new("boom");
        let clone = value.clone();
        let value = value.try_into_payload().expect_err("clone alive");
        drop(clone);
        let payload = value.try_into_payload().expect("sole owner");
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));
    }

    #[test]
    fn absent_event_getters_are_zero() {
        let none: Option<&Event> = None;
        assert_eq!(none.event_id(), EventId::NONE);
        assert_eq!(none.level(), Level::default());
        assert_eq!(none.message(), "");
        assert!(none.error().is_none());
        assert!(!none.is_panic());
        assert!(none.panic_value().is_none());
        assert_eq!(none.stack_len(), 0);
        assert!(none.external_ids().is_empty());
        assert_eq!(none.current_thread_id(), 0);
    }
}
