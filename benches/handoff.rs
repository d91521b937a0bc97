//! Hand-off and capture overhead benchmarks
//!
//! | Benchmark | What it measures |
//! |-----------|------------------|
//! | channel/push_recv | one push + one receive on an uncontended channel |
//! | channel/push_full | drop-newest rejection cost on a full channel |
//! | bus_send/untraced | LocalBus send + delivery with no interceptors |
//! | bus_send/traced | same, with the capture pair and a memory store attached |
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench handoff
//! cargo bench --bench handoff -- "bus_send"
//! ```

use bustrace::prelude::*;
use bustrace_engine::{Backpressure, HandoffChannel, Recv};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::time::Duration;

fn channel_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel");
    group.throughput(Throughput::Elements(1));

    let channel = HandoffChannel::new(1024, Backpressure::DropNewest);
    group.bench_function("push_recv", |b| {
        b.iter(|| {
            let _ = channel.push(black_box(42u64));
            match channel.recv_timeout(Duration::ZERO) {
                Recv::Item(v) => black_box(v),
                _ => 0,
            }
        })
    });

    let full = HandoffChannel::new(1, Backpressure::DropNewest);
    let _ = full.push(0u64);
    group.bench_function("push_full", |b| {
        b.iter(|| black_box(full.push(black_box(1u64)).is_err()))
    });

    group.finish();
}

fn bus_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_send");
    group.throughput(Throughput::Elements(1));

    let bus = LocalBus::new();
    bus.consumer("bench", |d: Delivery| {
        black_box(d.body());
    });
    group.bench_function("untraced", |b| b.iter(|| bus.send("bench", "payload")));

    let traced = LocalBus::new();
    traced.consumer("bench", |d: Delivery| {
        black_box(d.body());
    });
    let tracer = match BusTracer::builder()
        .store(MemoryStore::new())
        .channel_capacity(100_000)
        .try_attach(traced.clone())
    {
        Ok(t) => t,
        Err(e) => panic!("tracer failed to attach: {}", e),
    };
    group.bench_function("traced", |b| b.iter(|| traced.send("bench", "payload")));

    group.finish();
    let _ = tracer.shutdown();
}

criterion_group!(benches, channel_benchmarks, bus_benchmarks);
criterion_main!(benches);
