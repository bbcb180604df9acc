//! Optional tracing integration.
//!
//! With the `tracing-integration` feature the macros below forward to the
//! [`tracing`](https://docs.rs/tracing) crate. Without it they expand to
//! nothing, so internal diagnostics cost nothing in builds that do not want
//! them.
//!
//! The crate only logs about itself here: failed captures, skipped or vetoed
//! events. Rendering of [`Event`](crate::errmon::Event)s is an emitter concern.

#[cfg(feature = "tracing-integration")]
pub(crate) use tracing::{debug, trace};

#[cfg(not(feature = "tracing-integration"))]
macro_rules! trace {
    ($($arg:tt)*) => {{}};
}

#[cfg(not(feature = "tracing-integration"))]
macro_rules! debug {
    ($($arg:tt)*) => {{}};
}

#[cfg(not(feature = "tracing-integration"))]
pub(crate) use {debug, trace};
