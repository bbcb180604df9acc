//! Belt: immutable observability context and error monitoring for Rust.
//!
//! # Overview
//!
//! A [`Belt`] bundles the context a call chain wants every log line, metric
//! and error report to carry: structured [`Field`]s, [`TraceIds`] and a
//! registry of pluggable [`Tool`]s (logger, metrics, tracer, error monitor).
//! Belts are persistent values. Deriving one allocates a single node and
//! shares everything else with the parent, so a belt can be handed to any
//! number of threads without locks.
//!
//! On top of that context, [`errmon`] reports errors and recovered panics:
//! pre-hooks decide cheaply whether to proceed, the stack and the live
//! threads are captured, hooks may edit or veto the event, and emitters
//! receive the result.
//!
//! # Core Guarantees
//!
//! - **No mutation**: every `with_*` returns a new value; the receiver never changes
//! - **Structural sharing**: unchanged sub-chains are shared by reference
//! - **No failing observe calls**: absent input, skips and vetoes return `None`;
//!   capture failures only thin out the event
//! - **Strict pipeline order**: pre-hooks, capture, hooks, emit, on the calling thread
//!
//! # Module Structure
//!
//! - [`field`]: Fields, values and the persistent field chain
//! - [`trace_id`]: Persistent trace-ID chain
//! - [`tool`]: Tool contract and registry
//! - [`belt`](mod@belt): The belt itself
//! - [`carrier`]: Call-context and thread-local carriers
//! - [`tracer`]: Span interface used to attach span paths to events
//! - [`level`]: Severity levels
//! - [`capture`]: Caller, stack trace and thread capture
//! - [`errmon`]: Error monitor, hooks, sampler, emitters and events
//! - [`config`]: Capture configuration
//! - [`error`](mod@error): Error types
//! - [`tracing_compat`]: Optional tracing integration (requires `tracing-integration` feature)
//!
//! # Example
//!
//! ```
//! use belt::errmon::{ErrorMonitor, Event};
//! use belt::{Belt, Fields};
//! use std::sync::Arc;
//!
//! let monitor = ErrorMonitor::default()
//!     .with_hooks([Arc::new(|event: &mut Event| !event.entry.message.is_empty())
//!         as Arc<dyn belt::errmon::Hook>]);
//! let belt = Belt::new()
//!     .with_error_monitor(monitor)
//!     .with_field("request_id", "r-17")
//!     .with_trace_id("trace-a");
//!
//! let err: belt::ErrorRef = Arc::new(std::io::Error::other("timeout"));
//! let event = belt::errmon::observe_error(&belt, Some(err)).expect("kept");
//! assert_eq!(event.entry.fields.get("request_id").map(|v| v.to_string()), Some("r-17".into()));
//! assert_eq!(event.entry.trace_ids.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod belt;
pub mod capture;
pub mod carrier;
pub mod config;
pub mod errmon;
pub mod error;
pub mod field;
pub mod level;
pub mod tool;
pub mod trace_id;
pub mod tracer;
pub mod tracing_compat;
pub(crate) mod util;

// ── Test-only modules ───────────────────────────────────────────────────
#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

// Re-exports for convenient access to core types
pub use belt::Belt;
pub use carrier::{BeltGuard, CallContext};
pub use config::{CaptureConfig, ThreadDumpConfig};
pub use errmon::{ErrorMonitor, Event, EventRefExt};
pub use error::{Error, Result};
pub use field::{ErrorRef, Field, FieldChain, Fields, Properties, Property, Value};
pub use level::Level;
pub use tool::{Tool, ToolId, ToolRegistry};
pub use trace_id::{TraceId, TraceIds};
pub use tracer::{Span, SpanId, SpanNode, Tracer};
