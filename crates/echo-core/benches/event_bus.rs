//! Event bus and relay benchmarks for echo-core.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use echo_core::{Backend, Channel, Connector, EventBus};
use echo_protocol::{Envelope, Options};
use echo_transport::MemoryClient;
use serde_json::{json, Value};
use std::sync::Arc;

/// Benchmark publishing to a bus with a growing number of registered events.
fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_publish");
    let data = json!({"id": 1});

    for events in [1usize, 16, 256] {
        let bus = EventBus::new();
        for i in 0..events {
            bus.subscribe(&format!("Event{i}"), |data: &Value| {
                black_box(data);
            })
            .unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(events), &events, |b, _| {
            b.iter(|| bus.publish(black_box("Event0"), black_box(&data)))
        });
    }

    group.finish();
}

/// Benchmark socket delivery through the channel relay into a listener.
fn bench_relay(c: &mut Criterion) {
    let client = Arc::new(MemoryClient::new());
    let connector = Connector::new(Options::new(), Backend::new(client.clone())).unwrap();
    connector
        .channel("orders")
        .unwrap()
        .listen("OrderShipped", |data: &Value| {
            black_box(data);
        })
        .unwrap();

    let socket = client.socket().unwrap();
    let envelope = Envelope::new("App\\Events\\OrderShipped", json!({"id": 1}));

    c.bench_function("relay_single_listener", |b| {
        b.iter(|| socket.deliver("orders", black_box(&envelope)))
    });
}

criterion_group!(benches, bench_publish, bench_relay);
criterion_main!(benches);
