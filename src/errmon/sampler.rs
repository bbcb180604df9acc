//! Trace-keyed sampling.
//!
//! A [`Sampler`] works both as a pre-hook (drop before capture) and as a hook
//! (drop after assembly). Kept events are stamped with `sampled = true`.

use super::event::{Event, PanicValue};
use super::hooks::{Hook, PreHook, PreHookResult};
use crate::field::{ErrorRef, Field, Fields};
use crate::trace_id::TraceIds;
use crate::tracing_compat::{debug, trace};
use crate::util::DetHasher;
use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

/// Field stamped on kept events.
pub const SAMPLED_FIELD: &str = "sampled";

/// Decides whether the events of a trace are kept.
pub trait SamplingStrategy: Send + Sync {
    /// Returns `true` to keep.
    fn keep(&self, trace_ids: &TraceIds) -> bool;
}

/// Keeps everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSample;

impl SamplingStrategy for AlwaysSample {
    fn keep(&self, _trace_ids: &TraceIds) -> bool {
        true
    }
}

/// Drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverSample;

impl SamplingStrategy for NeverSample {
    fn keep(&self, _trace_ids: &TraceIds) -> bool {
        false
    }
}

/// Maps a ratio in `[0, 1]` onto the `u64` range. `None` means keep all.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn threshold(ratio: f64) -> Option<u64> {
    if ratio.is_nan() || ratio <= 0.0 {
        return Some(0);
    }
    if ratio >= 1.0 {
        return None;
    }
    Some((ratio * u64::MAX as f64) as u64)
}

/// Keeps a fixed fraction of traces, decided by a stable hash of the trace
/// ID set.
///
/// The decision depends only on the set of IDs (order and duplicates are
/// ignored) and the seed, so every process sharing the configuration keeps
/// the same traces.
#[derive(Debug, Clone, Copy)]
pub struct TraceIdRatio {
    ratio: f64,
    seed: u64,
}

impl TraceIdRatio {
    /// Keeps roughly `ratio` of all trace ID sets.
    #[must_use]
    pub const fn new(ratio: f64) -> Self {
        Self { ratio, seed: 0 }
    }

    /// Uses a different hash seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The configured ratio.
    #[must_use]
    pub const fn ratio(&self) -> f64 {
        self.ratio
    }

    fn hash(&self, trace_ids: &TraceIds) -> u64 {
        let mut ids: Vec<&str> = trace_ids.iter().map(|id| id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        let mut hasher = DetHasher::with_seed(self.seed);
        for id in ids {
            hasher.write(id.as_bytes());
            hasher.write_u8(0xff);
        }
        hasher.finish()
    }
}

impl SamplingStrategy for TraceIdRatio {
    fn keep(&self, trace_ids: &TraceIds) -> bool {
        threshold(self.ratio).is_none_or(|limit| self.hash(trace_ids) < limit)
    }
}

/// Keeps a fixed fraction of events at random, using OS entropy.
#[derive(Debug, Clone, Copy)]
pub struct RandomRatio {
    ratio: f64,
}

impl RandomRatio {
    /// Keeps roughly `ratio` of all events.
    #[must_use]
    pub const fn new(ratio: f64) -> Self {
        Self { ratio }
    }
}

impl SamplingStrategy for RandomRatio {
    fn keep(&self, _trace_ids: &TraceIds) -> bool {
        let Some(limit) = threshold(self.ratio) else {
            return true;
        };
        if limit == 0 {
            return false;
        }
        match getrandom::u64() {
            Ok(draw) => draw < limit,
            Err(err) => {
                debug!(error = %err, "entropy unavailable, keeping event");
                true
            }
        }
    }
}

/// Pre-hook and hook driven by a [`SamplingStrategy`].
#[derive(Clone)]
pub struct Sampler {
    strategy: Arc<dyn SamplingStrategy>,
}

impl Sampler {
    /// Creates a sampler.
    #[must_use]
    pub fn new(strategy: impl SamplingStrategy + 'static) -> Self {
        Self {
            strategy: Arc::new(strategy),
        }
    }

    /// Creates a sampler sharing `strategy`.
    #[must_use]
    pub fn from_arc(strategy: Arc<dyn SamplingStrategy>) -> Self {
        Self { strategy }
    }

    /// Asks the strategy.
    #[must_use]
    pub fn should_sample(&self, trace_ids: &TraceIds) -> bool {
        self.strategy.keep(trace_ids)
    }

    fn pre_hook_result(&self, trace_ids: &TraceIds) -> PreHookResult {
        if self.should_sample(trace_ids) {
            PreHookResult::proceed().with_field(Field::new(SAMPLED_FIELD, true))
        } else {
            trace!(trace_ids = ?trace_ids, "sampler dropped event before capture");
            PreHookResult::skip()
        }
    }
}

impl PreHook for Sampler {
    fn process_input_error(&self, trace_ids: &TraceIds, _error: &ErrorRef) -> PreHookResult {
        self.pre_hook_result(trace_ids)
    }

    fn process_input_panic(&self, trace_ids: &TraceIds, _value: &PanicValue) -> PreHookResult {
        self.pre_hook_result(trace_ids)
    }
}

impl Hook for Sampler {
    fn process_event(&self, event: &mut Event) -> bool {
        if !self.should_sample(&event.entry.trace_ids) {
            trace!(event_id = %event.id, "sampler dropped event");
            return false;
        }
        if event.entry.fields.get(SAMPLED_FIELD).is_none() {
            event.add_field(Field::new(SAMPLED_FIELD, true));
        }
        true
    }
}

impl fmt::Debug for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sampler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> TraceIds {
        list.iter().copied().collect()
    }

    #[test]
    fn fixed_strategies() {
        assert!(AlwaysSample.keep(&TraceIds::new()));
        assert!(!NeverSample.keep(&ids(&["t"])));
        assert!(TraceIdRatio::new(1.0).keep(&ids(&["t"])));
        assert!(!TraceIdRatio::new(0.0).keep(&ids(&["t"])));
        assert!(RandomRatio::new(1.0).keep(&TraceIds::new()));
        assert!(!RandomRatio::new(0.0).keep(&TraceIds::new()));
    }

    #[test]
    fn ratio_decision_ignores_order_and_duplicates() {
        let strategy = TraceIdRatio::new(0.5);
        let a = strategy.keep(&ids(&["x", "y"]));
        assert_eq!(a, strategy.keep(&ids(&["y", "x"])));
        assert_eq!(a, strategy.keep(&ids(&["x", "y", "x"])));
    }

    #[test]
    fn ratio_is_roughly_respected() {
        let strategy = TraceIdRatio::new(0.25);
        let kept = (0..4000)
            .filter(|i| strategy.keep(&ids(&[format!("trace-{i}").as_str()])))
            .count();
        assert!((700..1300).contains(&kept), "kept {kept} of 4000");
    }

    #[test]
    fn pre_hook_stamps_or_skips() {
        let keep = Sampler::new(AlwaysSample);
        let result = keep.pre_hook_result(&TraceIds::new());
        assert!(!result.skip);
        assert_eq!(result.extra_fields, vec![Field::new(SAMPLED_FIELD, true)]);

        let drop = Sampler::new(NeverSample);
        assert!(drop.pre_hook_result(&TraceIds::new()).skip);
    }
}
