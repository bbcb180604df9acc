//! Sinks for finished events.

use super::event::Event;
use std::fmt;
use std::sync::Arc;

/// Receives finished events.
///
/// Implementations live outside this crate (log backends, crash reporters).
/// `emit` may record sink-assigned ids via [`Event::add_external_id`].
pub trait Emitter: Send + Sync {
    /// Delivers anything buffered.
    fn flush(&self);

    /// Accepts one event.
    fn emit(&self, event: &mut Event);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmitter;

impl Emitter for NoopEmitter {
    fn flush(&self) {}

    fn emit(&self, _event: &mut Event) {}
}

/// Fans one event out to several emitters, in order.
///
/// Each emitter sees the event as left by the previous one, so external ids
/// accumulate.
#[derive(Clone, Default)]
pub struct Emitters(Vec<Arc<dyn Emitter>>);

impl Emitters {
    /// Creates an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an emitter at the end.
    #[must_use]
    pub fn with(mut self, emitter: Arc<dyn Emitter>) -> Self {
        self.0.push(emitter);
        self
    }

    /// Number of emitters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no emitters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Emitter for Emitters {
    fn flush(&self) {
        for emitter in &self.0 {
            emitter.flush();
        }
    }

    fn emit(&self, event: &mut Event) {
        for emitter in &self.0 {
            emitter.emit(event);
        }
    }
}

impl FromIterator<Arc<dyn Emitter>> for Emitters {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Emitter>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Debug for Emitters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitters").field("len", &self.len()).finish()
    }
}
