//! Carrying a [`Belt`] along a call chain.
//!
//! Two carriers are provided:
//!
//! - [`CallContext`]: an explicit, request-scoped value with
//!   [`attach`](CallContext::attach) / [`retrieve`](CallContext::retrieve).
//!   It also carries the active span, which the error monitor uses when the
//!   belt has no tracer tool.
//! - A thread-local scope stack: [`Belt::enter`] pushes a belt for the
//!   current thread and the returned guard pops it; [`Belt::current`] reads
//!   the innermost one.

use crate::belt::Belt;
use crate::tracer::Span;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// CallContext
// ============================================================================

/// Request-scoped carrier for a belt and the active span.
#[derive(Clone, Default)]
pub struct CallContext {
    belt: Option<Belt>,
    span: Option<Arc<dyn Span>>,
}

impl CallContext {
    /// Creates an empty carrier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a carrier holding `belt`.
    #[must_use]
    pub fn attach(&self, belt: Belt) -> Self {
        Self {
            belt: Some(belt),
            span: self.span.clone(),
        }
    }

    /// Returns the attached belt, or an empty one.
    #[must_use]
    pub fn retrieve(&self) -> Belt {
        self.belt.clone().unwrap_or_default()
    }

    /// Returns `true` if a belt was attached.
    #[must_use]
    pub fn has_belt(&self) -> bool {
        self.belt.is_some()
    }

    /// Returns a carrier whose active span is `span`.
    #[must_use]
    pub fn with_span(&self, span: Arc<dyn Span>) -> Self {
        Self {
            belt: self.belt.clone(),
            span: Some(span),
        }
    }

    /// The active span.
    #[must_use]
    pub fn span(&self) -> Option<&Arc<dyn Span>> {
        self.span.as_ref()
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("belt", &self.belt)
            .field("span", &self.span.as_ref().map(|s| s.id()))
            .finish()
    }
}

// ============================================================================
// Thread-local scope
// ============================================================================

#[derive(Clone)]
struct ScopeEntry {
    id: u64,
    belt: Belt,
}

thread_local! {
    static SCOPE_STACK: RefCell<Vec<ScopeEntry>> = const { RefCell::new(Vec::new()) };
}

static NEXT_GUARD_ID: AtomicU64 = AtomicU64::new(1);

impl Belt {
    /// Makes this belt the current one for the calling thread.
    ///
    /// The returned guard restores the previous belt when dropped. Guards may
    /// be dropped out of order; only the entry owned by the guard is removed.
    #[must_use]
    pub fn enter(&self) -> BeltGuard {
        let id = NEXT_GUARD_ID.fetch_add(1, Ordering::Relaxed);
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().push(ScopeEntry {
                id,
                belt: self.clone(),
            });
        });
        BeltGuard {
            id,
            _not_send: PhantomData,
        }
    }

    /// Returns the innermost belt entered on this thread, or an empty belt.
    #[must_use]
    pub fn current() -> Self {
        SCOPE_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map_or_else(Self::new, |entry| entry.belt.clone())
        })
    }
}

/// Guard for a belt entered on the current thread.
pub struct BeltGuard {
    id: u64,
    _not_send: PhantomData<Rc<()>>,
}

impl Drop for BeltGuard {
    fn drop(&mut self) {
        // `try_with`: the guard may outlive the thread-local during thread exit.
        let _ = SCOPE_STACK.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|entry| entry.id == self.id) {
                stack.remove(pos);
            }
        });
    }
}

impl fmt::Debug for BeltGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeltGuard").field("id", &self.id).finish()
    }
}
