use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use bulkq_core::{BatchTask, Params, Registry, json_model};
use bulkq_infra::config::BulkConfig;
use bulkq_infra::jobs::{Dispatcher, Producer};
use bulkq_queue::InMemoryJobQueue;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Order {
    sku: String,
    quantity: u32,
}

json_model!(Order, "bench.models.Order");

/// Registry with a target that fails whenever the batch contains sku "bad".
fn setup() -> (Arc<Registry>, BatchTask<Order>) {
    let mut registry = Registry::new();
    let task = registry
        .register("bench.tasks.ship", |orders: Vec<Order>| {
            let total: u32 = orders.iter().map(|o| o.quantity).sum();
            black_box(total);
            anyhow::ensure!(orders.iter().all(|o| o.sku != "bad"), "bad sku in batch");
            Ok(())
        })
        .expect("register bench target");
    (Arc::new(registry), task)
}

fn filled_queue(task: &BatchTask<Order>, count: usize, bad_at: Option<usize>) -> Arc<InMemoryJobQueue> {
    let queue = Arc::new(InMemoryJobQueue::new());
    let producer = Producer::new(queue.clone(), BulkConfig::default());
    for i in 0..count {
        let sku = if Some(i) == bad_at { "bad".to_string() } else { format!("sku-{i}") };
        producer
            .push(task, Params::new().kwarg("sku", sku).kwarg("quantity", 1))
            .expect("push");
    }
    queue
}

fn bench_consume_throughput(c: &mut Criterion) {
    let (registry, task) = setup();
    let mut group = c.benchmark_group("consume_throughput");

    for batch_size in [10, 100, 500, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), batch_size, |b, &n| {
            b.iter_batched(
                || filled_queue(&task, n, None),
                |queue| {
                    let dispatcher = Dispatcher::new(queue, registry.clone(), BulkConfig::default());
                    black_box(dispatcher.consume(n).expect("consume"))
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_bisection_cost(c: &mut Criterion) {
    let (registry, task) = setup();
    let mut group = c.benchmark_group("bisection_single_failure");

    for batch_size in [16, 256, 1024].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), batch_size, |b, &n| {
            b.iter_batched(
                || filled_queue(&task, n, Some(n / 3)),
                |queue| {
                    let dispatcher = Dispatcher::new(queue, registry.clone(), BulkConfig::default());
                    black_box(dispatcher.consume(n).expect("consume"))
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_consume_throughput, bench_bisection_cost);
criterion_main!(benches);
