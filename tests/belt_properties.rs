//! Property tests for belt derivation.
//!
//! Deriving never changes the receiver, fields and trace IDs come back newest
//! first, and registering a tool twice under one id is the same as once.

#![allow(missing_docs)]

mod common;

use belt::{Belt, Field, FieldChain, Fields, Tool, ToolId, TraceIds};
use common::*;
use proptest::prelude::*;
use std::any::Any;
use std::sync::Arc;

struct Marker(u32);

impl Tool for Marker {
    fn with_context_fields(&self, _: &FieldChain) -> Arc<dyn Tool> {
        Arc::new(Self(self.0))
    }

    fn with_trace_ids(&self, _: &TraceIds) -> Arc<dyn Tool> {
        Arc::new(Self(self.0))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

const IDS: [ToolId; 4] = [
    ToolId::LOGGER,
    ToolId::METRICS,
    ToolId::TRACER,
    ToolId::ERROR_MONITOR,
];

fn keys(belt: &Belt) -> Vec<String> {
    belt.fields().iter().map(|f| f.key().to_string()).collect()
}

fn field_keys() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,6}", 0..24)
}

proptest! {
    #[test]
    fn fields_come_back_newest_first(steps in field_keys()) {
        init_test_logging();
        let mut belt = Belt::new();
        for (i, key) in steps.iter().enumerate() {
            belt = belt.with_field(key.as_str(), i);
        }
        let mut expected = steps.clone();
        expected.reverse();
        prop_assert_eq!(keys(&belt), expected);
        prop_assert_eq!(Fields::len(&belt), steps.len());
    }

    #[test]
    fn batch_equals_sequential(steps in field_keys()) {
        let batch = Belt::new().with_fields(steps.iter().map(|k| Field::new(k.as_str(), true)));
        let sequential = steps
            .iter()
            .fold(Belt::new(), |belt, k| belt.with_field(k.as_str(), true));
        prop_assert_eq!(keys(&batch), keys(&sequential));
    }

    #[test]
    fn lookup_returns_most_recent(values in prop::collection::vec(any::<i64>(), 1..16)) {
        let belt = values.iter().fold(Belt::new(), |belt, v| belt.with_field("k", *v));
        let latest = belt.fields().get("k").and_then(|v| v.as_i64());
        prop_assert_eq!(latest, values.last().copied());
    }

    #[test]
    fn derivation_leaves_parent_untouched(
        base in field_keys(),
        extra in "[a-z]{1,6}",
        trace in "[0-9a-f]{8}",
    ) {
        let parent = base
            .iter()
            .fold(Belt::new(), |belt, k| belt.with_field(k.as_str(), 1_i64));
        let before = keys(&parent);
        let before_traces = parent.trace_ids().len();

        let child = parent
            .with_field(extra.as_str(), 2_i64)
            .with_trace_id(trace.as_str())
            .with_tool(ToolId::LOGGER, Arc::new(Marker(0)));

        prop_assert_eq!(keys(&parent), before);
        prop_assert_eq!(parent.trace_ids().len(), before_traces);
        prop_assert!(parent.tool_by_id(ToolId::LOGGER).is_none());
        prop_assert_eq!(Fields::len(&child), base.len() + 1);
        prop_assert!(child.fields().len() == parent.fields().len() + 1);
    }

    #[test]
    fn trace_ids_come_back_newest_first(ids in prop::collection::vec("[0-9a-f]{4}", 0..12)) {
        let belt = ids.iter().fold(Belt::new(), |belt, id| belt.with_trace_id(id.as_str()));
        let got: Vec<String> = belt.trace_ids().iter().map(|t| t.as_str().to_string()).collect();
        let mut expected = ids.clone();
        expected.reverse();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn registering_twice_is_registering_once(
        picks in prop::collection::vec((0..IDS.len(), any::<u32>()), 1..10),
    ) {
        let mut once = Belt::new();
        let mut twice = Belt::new();
        for (idx, tag) in &picks {
            let tool: Arc<dyn Tool> = Arc::new(Marker(*tag));
            once = once.with_tool(IDS[*idx], Arc::clone(&tool));
            twice = twice
                .with_tool(IDS[*idx], Arc::clone(&tool))
                .with_tool(IDS[*idx], tool);
        }

        let once_ids: Vec<ToolId> = once.tools().ids().collect();
        let twice_ids: Vec<ToolId> = twice.tools().ids().collect();
        prop_assert_eq!(&once_ids, &twice_ids);
        for id in once_ids {
            let a = once.tool_by_id(id).expect("registered");
            let b = twice.tool_by_id(id).expect("registered");
            prop_assert!(Arc::ptr_eq(&a, &b));
        }
    }

    #[test]
    fn latest_registration_wins(first in any::<u32>(), second in any::<u32>()) {
        let belt = Belt::new()
            .with_tool(ToolId::METRICS, Arc::new(Marker(first)))
            .with_tool(ToolId::METRICS, Arc::new(Marker(second)));
        let tool = belt.tool_by_id(ToolId::METRICS).expect("registered");
        let marker = tool.as_any().downcast_ref::<Marker>().map(|m| m.0);
        prop_assert_eq!(marker, Some(second));
        prop_assert_eq!(belt.tools().len(), 1);
    }
}

#[test]
fn deep_chains_drop_without_overflow() {
    init_test_logging();
    test_phase!("deep_chains_drop_without_overflow");
    let mut belt = Belt::new();
    for i in 0..200_000_u64 {
        belt = belt.with_field("n", i).with_trace_id("t");
    }
    assert_with_log!(
        Fields::len(&belt) == 200_000,
        "all fields kept",
        200_000,
        Fields::len(&belt)
    );
    drop(belt);
    test_complete!("deep_chains_drop_without_overflow");
}
