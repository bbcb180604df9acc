//! Belt derivation and error-monitor benchmark suite.
//!
//! Benchmarks the hot paths of context propagation:
//! - Field and trace-ID derivation on chains of various depths
//! - Field lookup on deep chains
//! - Bound-tool derivation
//! - Full observe calls, with and without an early pre-hook skip
//!
//! Run:
//!   cargo bench --bench belt_derivation

#![allow(missing_docs)]
#![allow(clippy::semicolon_if_nothing_returned)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use belt::errmon::{ErrorMonitor, NeverSample, PreHook, Sampler};
use belt::{Belt, ErrorRef, Field, Fields, ToolId};
use std::sync::Arc;

// =============================================================================
// HELPERS
// =============================================================================

fn belt_with_depth(depth: usize) -> Belt {
    (0..depth).fold(Belt::new().with_trace_id("trace-root"), |belt, i| {
        belt.with_field(format!("key_{i}"), i)
    })
}

fn error() -> ErrorRef {
    Arc::new(std::io::Error::other("bench"))
}

// =============================================================================
// DERIVATION
// =============================================================================

fn bench_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("belt/derive");

    for &depth in &[0usize, 16, 256, 4096] {
        let belt = belt_with_depth(depth);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("with_field", depth), &belt, |b, belt| {
            b.iter(|| black_box(belt.with_field("request_id", "r-1")))
        });
        group.bench_with_input(BenchmarkId::new("with_trace_id", depth), &belt, |b, belt| {
            b.iter(|| black_box(belt.with_trace_id("trace-child")))
        });
    }

    let belt = belt_with_depth(16);
    let batch: Vec<Field> = (0..8).map(|i| Field::new(format!("batch_{i}"), i)).collect();
    group.throughput(Throughput::Elements(batch.len() as u64));
    group.bench_function("with_fields_batch_8", |b| {
        b.iter(|| black_box(belt.with_fields(batch.iter().cloned())))
    });

    group.finish();
}

// =============================================================================
// LOOKUP
// =============================================================================

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("belt/lookup");

    for &depth in &[16usize, 256, 4096] {
        let belt = belt_with_depth(depth);
        group.bench_with_input(BenchmarkId::new("oldest_field", depth), &belt, |b, belt| {
            b.iter(|| black_box(belt.fields().get("key_0")))
        });
        group.bench_with_input(BenchmarkId::new("to_vec", depth), &belt, |b, belt| {
            b.iter(|| black_box(belt.fields().to_vec()))
        });
    }

    let belt = belt_with_depth(16).with_error_monitor(ErrorMonitor::default());
    group.bench_function("bound_tool", |b| {
        b.iter(|| black_box(belt.bound_tool(ToolId::ERROR_MONITOR)))
    });

    group.finish();
}

// =============================================================================
// OBSERVE
// =============================================================================

fn bench_observe(c: &mut Criterion) {
    let mut group = c.benchmark_group("errmon/observe");
    let belt = belt_with_depth(16);

    let monitor = ErrorMonitor::default();
    group.bench_function("full_pipeline", |b| {
        b.iter(|| black_box(monitor.observe_error(&belt, Some(error()))))
    });

    let skipping =
        ErrorMonitor::default().with_pre_hooks([Arc::new(Sampler::new(NeverSample)) as Arc<dyn PreHook>]);
    group.bench_function("pre_hook_skip", |b| {
        b.iter(|| black_box(skipping.observe_error(&belt, Some(error()))))
    });

    group.finish();
}

criterion_group!(benches, bench_derivation, bench_lookup, bench_observe);
criterion_main!(benches);
