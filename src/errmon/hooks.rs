//! Pre-hooks and hooks.
//!
//! Pre-hooks see only the raw input and run before any capture, so they are
//! the place for cheap decisions such as sampling. Hooks see the assembled
//! event and may edit it or veto its emission.

use super::event::{Event, PanicValue};
use crate::field::{ErrorRef, Field};
use crate::trace_id::TraceIds;
use std::fmt;
use std::sync::Arc;

/// Outcome of a pre-hook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreHookResult {
    /// Drop the observe call before capture.
    pub skip: bool,
    /// Fields to add to the event.
    pub extra_fields: Vec<Field>,
}

impl PreHookResult {
    /// Continue with no extra fields.
    #[must_use]
    pub fn proceed() -> Self {
        Self::default()
    }

    /// Drop the observe call.
    #[must_use]
    pub fn skip() -> Self {
        Self {
            skip: true,
            extra_fields: Vec::new(),
        }
    }

    /// Adds an extra field.
    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        self.extra_fields.push(field);
        self
    }
}

/// Filter run before capture.
pub trait PreHook: Send + Sync {
    /// Inspects an error about to be observed.
    fn process_input_error(&self, trace_ids: &TraceIds, error: &ErrorRef) -> PreHookResult;

    /// Inspects a recovered panic about to be observed.
    fn process_input_panic(&self, trace_ids: &TraceIds, value: &PanicValue) -> PreHookResult;
}

/// Filter run on the assembled event. Returning `false` vetoes emission.
pub trait Hook: Send + Sync {
    /// Inspects or edits `event`.
    fn process_event(&self, event: &mut Event) -> bool;
}

impl<F> Hook for F
where
    F: Fn(&mut Event) -> bool + Send + Sync,
{
    fn process_event(&self, event: &mut Event) -> bool {
        self(event)
    }
}

/// Ordered, immutable list of pre-hooks.
#[derive(Clone, Default)]
pub struct PreHooks(Arc<[Arc<dyn PreHook>]>);

impl PreHooks {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a list with `hooks` appended after the existing ones.
    #[must_use]
    pub fn with<I: IntoIterator<Item = Arc<dyn PreHook>>>(&self, hooks: I) -> Self {
        Self(self.0.iter().cloned().chain(hooks).collect())
    }

    /// Number of hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no hooks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Runs the hooks for an error. `None` means skip.
    #[must_use]
    pub fn run_error(&self, trace_ids: &TraceIds, error: &ErrorRef) -> Option<Vec<Field>> {
        self.run(|hook| hook.process_input_error(trace_ids, error))
    }

    /// Runs the hooks for a panic. `None` means skip.
    #[must_use]
    pub fn run_panic(&self, trace_ids: &TraceIds, value: &PanicValue) -> Option<Vec<Field>> {
        self.run(|hook| hook.process_input_panic(trace_ids, value))
    }

    fn run(&self, mut call: impl FnMut(&dyn PreHook) -> PreHookResult) -> Option<Vec<Field>> {
        let mut extra = Vec::new();
        for hook in self.0.iter() {
            let result = call(hook.as_ref());
            if result.skip {
                return None;
            }
            extra.extend(result.extra_fields);
        }
        Some(extra)
    }
}

impl FromIterator<Arc<dyn PreHook>> for PreHooks {
    fn from_iter<I: IntoIterator<Item = Arc<dyn PreHook>>>(hooks: I) -> Self {
        Self(hooks.into_iter().collect())
    }
}

impl fmt::Debug for PreHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreHooks").field("len", &self.len()).finish()
    }
}

/// Ordered, immutable list of hooks.
#[derive(Clone, Default)]
pub struct Hooks(Arc<[Arc<dyn Hook>]>);

impl Hooks {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a list with `hooks` appended after the existing ones.
    #[must_use]
    pub fn with<I: IntoIterator<Item = Arc<dyn Hook>>>(&self, hooks: I) -> Self {
        Self(self.0.iter().cloned().chain(hooks).collect())
    }

    /// Number of hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no hooks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Runs the hooks in order; stops at and returns `false` on the first
    /// veto.
    pub fn run(&self, event: &mut Event) -> bool {
        self.0.iter().all(|hook| hook.process_event(event))
    }
}

impl FromIterator<Arc<dyn Hook>> for Hooks {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Hook>>>(hooks: I) -> Self {
        Self(hooks.into_iter().collect())
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io;

    struct Scripted {
        name: &'static str,
        skip: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Scripted {
        fn result(&self) -> PreHookResult {
            self.log.lock().push(self.name);
            if self.skip {
                PreHookResult::skip()
            } else {
                PreHookResult::proceed().with_field(Field::new(self.name, true))
            }
        }
    }

    impl PreHook for Scripted {
        fn process_input_error(&self, _: &TraceIds, _: &ErrorRef) -> PreHookResult {
            self.result()
        }

        fn process_input_panic(&self, _: &TraceIds, _: &PanicValue) -> PreHookResult {
            self.result()
        }
    }

    fn scripted(
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
        skip: bool,
    ) -> Arc<dyn PreHook> {
        Arc::new(Scripted {
            name,
            skip,
            log: Arc::clone(log),
        })
    }

    fn error() -> ErrorRef {
        Arc::new(io::Error::other("disk full"))
    }

    #[test]
    fn extras_accumulate_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = PreHooks::new().with([scripted(&log, "a", false), scripted(&log, "b", false)]);
        let extra = hooks
            .run_error(&TraceIds::new(), &error())
            .expect("no skip");
        let keys: Vec<_> = extra.iter().map(Field::key).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(*log.lock(), ["a", "b"]);
    }

    #[test]
    fn skip_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks: PreHooks = [
            scripted(&log, "a", false),
            scripted(&log, "stop", true),
            scripted(&log, "never", false),
        ]
        .into_iter()
        .collect();
        assert!(hooks.run_panic(&TraceIds::new(), &PanicValue::new("boom")).is_none());
        assert_eq!(*log.lock(), ["a", "stop"]);
    }

    #[test]
    fn with_leaves_receiver_untouched() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let base = PreHooks::new().with([scripted(&log, "a", false)]);
        let derived = base.with([scripted(&log, "b", false)]);
        assert_eq!(base.len(), 1);
        assert_eq!(derived.len(), 2);
    }

    #[test]
    fn empty_hook_lists_pass() {
        assert_eq!(
            PreHooks::new().run_error(&TraceIds::new(), &error()),
            Some(Vec::new())
        );
        assert!(Hooks::new().is_empty());
    }
}
