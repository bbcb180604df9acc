//! Diagnostic capture: caller address, stack trace and thread snapshots.
//!
//! The error monitor talks to capture through the [`Capture`] trait so that
//! tests can substitute a double. [`SystemCapture`] is the real thing.

pub mod filter;
pub mod frame;
pub mod stack;
pub mod threads;

pub use filter::{PcFilter, accept_all, default_pc_filter, is_user_frame, set_default_pc_filter};
pub use frame::{Frame, ProgramCounter};
pub use stack::{AddressPool, Frames, StackTrace, caller_pc, capture_stack_trace};
pub use threads::{
    ThreadCapture, ThreadSnapshot, capture_threads, current_thread_id, dump_current, dump_threads,
    parse_thread_dump,
};

use crate::config::CaptureConfig;
use std::fmt;
use std::sync::Arc;

/// Source of diagnostic data for an event.
pub trait Capture: Send + Sync {
    /// First frame accepted by `filter`.
    fn caller_pc(&self, filter: &dyn Fn(ProgramCounter) -> bool) -> ProgramCounter;

    /// Stack from the first frame accepted by `filter` to the root.
    fn stack_trace(&self, filter: &dyn Fn(ProgramCounter) -> bool) -> StackTrace;

    /// Snapshot of the live threads.
    fn threads(&self) -> ThreadCapture;
}

/// Capture backed by the real stack walker and the OS thread list.
pub struct SystemCapture {
    pool: Arc<AddressPool>,
    config: CaptureConfig,
}

impl SystemCapture {
    /// Creates a capture with its own address pool sized by `config`.
    #[must_use]
    pub fn new(config: CaptureConfig) -> Self {
        let pool = Arc::new(AddressPool::new(
            config.stack_buffer_len,
            config.pool_capacity,
        ));
        Self { pool, config }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// The address pool used for stack walks.
    #[must_use]
    pub fn pool(&self) -> &Arc<AddressPool> {
        &self.pool
    }
}

impl Default for SystemCapture {
    fn default() -> Self {
        Self {
            pool: stack::shared_pool(),
            config: CaptureConfig::default(),
        }
    }
}

impl Capture for SystemCapture {
    fn caller_pc(&self, filter: &dyn Fn(ProgramCounter) -> bool) -> ProgramCounter {
        self.pool.caller_pc(filter)
    }

    fn stack_trace(&self, filter: &dyn Fn(ProgramCounter) -> bool) -> StackTrace {
        self.pool.capture_stack_trace(filter)
    }

    fn threads(&self) -> ThreadCapture {
        if self.config.capture_threads {
            capture_threads(&self.config.thread_dump)
        } else {
            ThreadCapture {
                current_id: current_thread_id(&self.config.thread_dump),
                threads: Vec::new(),
            }
        }
    }
}

impl fmt::Debug for SystemCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemCapture")
            .field("config", &self.config)
            .field("idle_buffers", &self.pool.idle())
            .finish()
    }
}
