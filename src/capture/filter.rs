//! Frame filters used to skip the observability machinery itself.
//!
//! A filter receives a frame address and returns `true` to accept it. The
//! process-wide default can be replaced at startup with
//! [`set_default_pc_filter`]; error monitors without an explicit filter use
//! whatever is installed at observe time.

use super::frame::ProgramCounter;
use parking_lot::RwLock;
use std::sync::{Arc, LazyLock};

/// Shared frame filter.
pub type PcFilter = Arc<dyn Fn(ProgramCounter) -> bool + Send + Sync>;

/// Symbol prefixes that belong to this crate, its capture backend, or the
/// language runtime.
const INTERNAL_PREFIXES: &[&str] = &[
    "belt::",
    "backtrace::",
    "rustc_demangle::",
    "std::",
    "core::",
    "alloc::",
    "panic_unwind::",
    "__rust",
    "rust_begin_unwind",
    "rust_panic",
];

/// Returns `true` if `function` is a frame of this crate or of the runtime.
#[must_use]
pub fn is_internal_function(function: &str) -> bool {
    let function = function.trim_start_matches('<');
    INTERNAL_PREFIXES
        .iter()
        .any(|prefix| function.starts_with(prefix))
}

/// The built-in filter: accepts every frame whose symbol is not internal.
///
/// Frames that cannot be symbolized are accepted; they are never ours.
#[must_use]
pub fn is_user_frame(pc: ProgramCounter) -> bool {
    if pc.is_none() {
        return false;
    }
    pc.function_name()
        .is_none_or(|function| !is_internal_function(&function))
}

/// Accepts every non-zero frame.
#[must_use]
pub fn accept_all(pc: ProgramCounter) -> bool {
    !pc.is_none()
}

static DEFAULT_FILTER: LazyLock<RwLock<PcFilter>> = LazyLock::new(|| {
    let filter: PcFilter = Arc::new(is_user_frame);
    RwLock::new(filter)
});

/// Returns the process-wide default filter.
#[must_use]
pub fn default_pc_filter() -> PcFilter {
    Arc::clone(&DEFAULT_FILTER.read())
}

/// Replaces the process-wide default filter and returns the previous one.
pub fn set_default_pc_filter(filter: PcFilter) -> PcFilter {
    std::mem::replace(&mut *DEFAULT_FILTER.write(), filter)
}
