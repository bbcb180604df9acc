//! Caller and stack trace capture.
//!
//! The walk itself only records raw addresses into a scratch buffer borrowed
//! from an [`AddressPool`]; symbol resolution happens lazily, the first time
//! a [`StackTrace`] is rendered or its frames are read.
//!
//! ```text
//! backtrace::trace ──► pooled Vec<usize> ──► filter ──► StackTrace { pcs }
//!                                                          │ (lazy)
//!                                                          ▼
//!                                                     Vec<Frame>
//! ```

use super::filter::default_pc_filter;
use super::frame::{Frame, ProgramCounter};
use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, LazyLock, OnceLock};

/// Default number of addresses a scratch buffer can hold.
pub const DEFAULT_STACK_BUFFER_LEN: usize = 1000;

/// Default number of idle buffers kept by a pool.
pub const DEFAULT_POOL_CAPACITY: usize = 16;

// ============================================================================
// AddressPool
// ============================================================================

/// Bounded pool of scratch buffers for stack walks.
///
/// Each [`checkout`](Self::checkout) hands out an exclusive, empty buffer.
/// On return the buffer is cleared and kept only while the pool holds fewer
/// than `capacity` idle buffers. A pool miss simply allocates.
#[derive(Debug)]
pub struct AddressPool {
    idle: Mutex<Vec<Vec<usize>>>,
    buffer_len: usize,
    capacity: usize,
}

impl AddressPool {
    /// Creates a pool of buffers holding `buffer_len` addresses each.
    #[must_use]
    pub fn new(buffer_len: usize, capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            buffer_len: buffer_len.max(1),
            capacity,
        }
    }

    /// Maximum number of addresses one walk records.
    #[must_use]
    pub const fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Number of idle buffers currently pooled.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// Borrows an empty buffer.
    #[must_use]
    pub fn checkout(&self) -> PooledBuffer<'_> {
        let buf = self
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.buffer_len));
        PooledBuffer { pool: self, buf }
    }

    fn give_back(&self, mut buf: Vec<usize>) {
        buf.clear();
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(buf);
        }
    }

    /// Walks the current stack into a pooled buffer and passes the raw
    /// addresses (innermost first) to `f`.
    fn walk<R>(&self, f: impl FnOnce(&[usize]) -> R) -> R {
        let mut buf = self.checkout();
        let limit = self.buffer_len;
        backtrace::trace(|frame| {
            buf.push(frame.ip() as usize);
            buf.len() < limit
        });
        f(&buf)
    }

    /// Returns the first frame above the capture point accepted by `filter`,
    /// or [`ProgramCounter::NONE`].
    #[must_use]
    pub fn caller_pc(&self, filter: &dyn Fn(ProgramCounter) -> bool) -> ProgramCounter {
        self.walk(|pcs| {
            pcs.iter()
                .map(|&pc| ProgramCounter(pc))
                .find(|&pc| filter(pc))
                .unwrap_or(ProgramCounter::NONE)
        })
    }

    /// Captures the stack from the first frame accepted by `filter` down to
    /// the root caller.
    #[must_use]
    pub fn capture_stack_trace(&self, filter: &dyn Fn(ProgramCounter) -> bool) -> StackTrace {
        self.walk(|pcs| {
            let start = pcs
                .iter()
                .position(|&pc| filter(ProgramCounter(pc)))
                .unwrap_or(pcs.len());
            StackTrace::from_pcs(pcs[start..].iter().map(|&pc| ProgramCounter(pc)).collect())
        })
    }
}

impl Default for AddressPool {
    fn default() -> Self {
        Self::new(DEFAULT_STACK_BUFFER_LEN, DEFAULT_POOL_CAPACITY)
    }
}

/// Exclusive checkout from an [`AddressPool`]; returned on drop.
pub struct PooledBuffer<'a> {
    pool: &'a AddressPool,
    buf: Vec<usize>,
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<usize>;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.buf));
    }
}

static SHARED_POOL: LazyLock<Arc<AddressPool>> = LazyLock::new(|| Arc::new(AddressPool::default()));

/// The process-wide pool used by the free capture functions.
#[must_use]
pub fn shared_pool() -> Arc<AddressPool> {
    Arc::clone(&SHARED_POOL)
}

/// [`AddressPool::caller_pc`] on the shared pool.
#[must_use]
pub fn caller_pc(filter: &dyn Fn(ProgramCounter) -> bool) -> ProgramCounter {
    SHARED_POOL.caller_pc(filter)
}

/// [`AddressPool::capture_stack_trace`] on the shared pool.
#[must_use]
pub fn capture_stack_trace(filter: &dyn Fn(ProgramCounter) -> bool) -> StackTrace {
    SHARED_POOL.capture_stack_trace(filter)
}

/// Stack trace of the caller using the default filter.
#[must_use]
pub fn capture_caller_stack() -> StackTrace {
    let filter = default_pc_filter();
    capture_stack_trace(&*filter)
}

// ============================================================================
// StackTrace
// ============================================================================

/// Captured call stack, innermost frame first.
///
/// Cloning shares the addresses and the resolved frames.
#[derive(Clone, Default)]
pub struct StackTrace {
    pcs: Arc<[ProgramCounter]>,
    frames: Arc<OnceLock<Vec<Frame>>>,
}

impl StackTrace {
    /// Wraps raw addresses; frames are resolved on first use.
    #[must_use]
    pub fn from_pcs(pcs: Vec<ProgramCounter>) -> Self {
        Self {
            pcs: pcs.into(),
            frames: Arc::new(OnceLock::new()),
        }
    }

    /// Wraps frames that are already resolved.
    #[must_use]
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        let pcs: Vec<_> = frames.iter().map(|f| f.pc).collect();
        Self {
            pcs: pcs.into(),
            frames: Arc::new(OnceLock::from(frames)),
        }
    }

    /// Raw addresses.
    #[must_use]
    pub fn program_counters(&self) -> &[ProgramCounter] {
        &self.pcs
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pcs.len()
    }

    /// Returns `true` if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pcs.is_empty()
    }

    /// Resolved frames, innermost first.
    #[must_use]
    pub fn resolved(&self) -> &[Frame] {
        self.frames
            .get_or_init(|| self.pcs.iter().map(|pc| pc.resolve()).collect())
    }

    /// Forward iterator over the frames.
    #[must_use]
    pub fn frames(&self) -> Frames<'_> {
        Frames {
            frames: self.resolved(),
            pos: 0,
        }
    }
}

impl fmt::Display for StackTrace {
    /// One line per frame: `N. file:line: function`, numbered from 1.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, frame) in self.resolved().iter().enumerate() {
            writeln!(f, "{}. {frame}", i + 1)?;
        }
        Ok(())
    }
}

impl fmt::Debug for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackTrace")
            .field("len", &self.len())
            .field("resolved", &self.frames.get().is_some())
            .finish()
    }
}

/// Forward frame iterator returned by [`StackTrace::frames`].
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    frames: &'a [Frame],
    pos: usize,
}

impl<'a> Frames<'a> {
    /// Returns the next frame and whether more frames remain after it.
    pub fn next_frame(&mut self) -> Option<(&'a Frame, bool)> {
        let frame = self.frames.get(self.pos)?;
        self.pos += 1;
        Some((frame, self.pos < self.frames.len()))
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = &'a Frame;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().map(|(frame, _)| frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.frames.len() - self.pos;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Frames<'_> {}
