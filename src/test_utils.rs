//! Test helpers: logging setup, phase macros and instrumented doubles for
//! the error-monitor pipeline.
//!
//! Available to unit tests and, with the `test-internals` feature, to
//! integration tests.

use crate::capture::{Capture, ProgramCounter, StackTrace, SystemCapture, ThreadCapture};
use crate::errmon::{Emitter, Event, ExternalId, Hook, PanicValue, PreHook, PreHookResult};
use crate::field::{ErrorRef, Field};
use crate::trace_id::TraceIds;
use parking_lot::Mutex;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};

static INIT_LOGGING: Once = Once::new();

/// Installs a `tracing` subscriber writing to the test harness output.
///
/// Honors `RUST_LOG`; defaults to `belt=trace`. Safe to call from every test.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("belt=trace"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Marks the start of a test.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        ::tracing::info!(test = %$name, "=== phase start ===");
    };
}

/// Marks a section inside a test.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        ::tracing::info!(section = %$name, "--- section ---");
    };
}

/// Marks the successful end of a test, with optional key/value context.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        ::tracing::info!(test = %$name, "=== phase complete ===");
    };
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        ::tracing::info!(test = %$name, $($key = ?$value),+, "=== phase complete ===");
    };
}

/// Asserts `cond`, logging the expectation either way.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {{
        let passed = $cond;
        ::tracing::debug!(
            check = %$msg,
            expected = ?$expected,
            actual = ?$actual,
            passed,
            "assertion"
        );
        assert!(
            passed,
            "{}: expected {:?}, got {:?}",
            $msg, $expected, $actual
        );
    }};
}

// ============================================================================
// Emitter
// ============================================================================

/// Emitter keeping a copy of every event it receives.
///
/// Each emitted event is tagged with an external id `"<source>-<n>"`.
#[derive(Debug)]
pub struct RecordingEmitter {
    source: String,
    events: Mutex<Vec<Event>>,
    flushes: AtomicUsize,
}

impl RecordingEmitter {
    /// Creates an emitter tagging events with `source`.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            events: Mutex::new(Vec::new()),
            flushes: AtomicUsize::new(0),
        }
    }

    /// Copies of every emitted event, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// The most recent event.
    #[must_use]
    pub fn last(&self) -> Option<Event> {
        self.events.lock().last().cloned()
    }

    /// Number of emitted events.
    #[must_use]
    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    /// Number of flushes.
    #[must_use]
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl Default for RecordingEmitter {
    fn default() -> Self {
        Self::new("recording")
    }
}

impl Emitter for RecordingEmitter {
    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn emit(&self, event: &mut Event) {
        let mut events = self.events.lock();
        event.add_external_id(ExternalId::new(
            self.source.clone(),
            format!("{}-{}", self.source, events.len() + 1),
        ));
        events.push(event.clone());
    }
}

// ============================================================================
// Hooks
// ============================================================================

/// Pre-hook counting its calls; optionally skips or adds fields.
#[derive(Debug, Default)]
pub struct CountingPreHook {
    calls: AtomicUsize,
    skip: bool,
    extra_fields: Vec<Field>,
}

impl CountingPreHook {
    /// A pre-hook that lets everything through.
    #[must_use]
    pub fn proceeding() -> Self {
        Self::default()
    }

    /// A pre-hook that skips everything.
    #[must_use]
    pub fn skipping() -> Self {
        Self {
            skip: true,
            ..Self::default()
        }
    }

    /// Adds `field` to every result.
    #[must_use]
    pub fn with_extra_field(mut self, field: Field) -> Self {
        self.extra_fields.push(field);
        self
    }

    /// Number of calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn result(&self) -> PreHookResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        PreHookResult {
            skip: self.skip,
            extra_fields: self.extra_fields.clone(),
        }
    }
}

impl PreHook for CountingPreHook {
    fn process_input_error(&self, _trace_ids: &TraceIds, _error: &ErrorRef) -> PreHookResult {
        self.result()
    }

    fn process_input_panic(&self, _trace_ids: &TraceIds, _value: &PanicValue) -> PreHookResult {
        self.result()
    }
}

/// Hook counting its calls; optionally vetoes. Keeps the last event it saw.
#[derive(Debug, Default)]
pub struct CountingHook {
    calls: AtomicUsize,
    veto: bool,
    seen: Mutex<Option<Event>>,
}

impl CountingHook {
    /// A hook that lets everything through.
    #[must_use]
    pub fn passing() -> Self {
        Self::default()
    }

    /// A hook that vetoes everything.
    #[must_use]
    pub fn vetoing() -> Self {
        Self {
            veto: true,
            ..Self::default()
        }
    }

    /// Number of calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The last event passed to the hook.
    #[must_use]
    pub fn last_seen(&self) -> Option<Event> {
        self.seen.lock().clone()
    }
}

impl Hook for CountingHook {
    fn process_event(&self, event: &mut Event) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen.lock() = Some(event.clone());
        !self.veto
    }
}

// ============================================================================
// Capture
// ============================================================================

/// [`SystemCapture`] wrapper counting every capture request.
#[derive(Debug, Default)]
pub struct CountingCapture {
    inner: SystemCapture,
    caller_calls: AtomicUsize,
    stack_calls: AtomicUsize,
    thread_calls: AtomicUsize,
}

impl CountingCapture {
    /// Wraps a default [`SystemCapture`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total capture requests of any kind.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.caller_calls.load(Ordering::SeqCst)
            + self.stack_calls.load(Ordering::SeqCst)
            + self.thread_calls.load(Ordering::SeqCst)
    }

    /// Thread snapshot requests.
    #[must_use]
    pub fn thread_calls(&self) -> usize {
        self.thread_calls.load(Ordering::SeqCst)
    }
}

impl Capture for CountingCapture {
    fn caller_pc(&self, filter: &dyn Fn(ProgramCounter) -> bool) -> ProgramCounter {
        self.caller_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.caller_pc(filter)
    }

    fn stack_trace(&self, filter: &dyn Fn(ProgramCounter) -> bool) -> StackTrace {
        self.stack_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.stack_trace(filter)
    }

    fn threads(&self) -> ThreadCapture {
        self.thread_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.threads()
    }
}
