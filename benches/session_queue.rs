//! Session queue benchmark suite.
//!
//! Benchmarks enqueue/dequeue throughput at different scales:
//! - Payload sizes: 8, 32, 64 bytes
//! - Producer counts: 1, 4
//!
//! Run with: cargo bench --bench session_queue
//! Results saved to: target/criterion/

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use wifi_rendezvous::{MessageQueue, SessionMessage};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PAYLOAD_SIZES: &[usize] = &[8, 32, 64];
const PRODUCER_COUNTS: &[usize] = &[1, 4];
const MESSAGES: usize = 1_000;

// ============================================================================
// Benchmark: Non-blocking Round Trip
// ============================================================================

fn bench_try_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("try_enqueue");
    group.throughput(Throughput::Elements(MESSAGES as u64));

    for &size in PAYLOAD_SIZES {
        group.bench_with_input(BenchmarkId::new("payload", size), &size, |b, &size| {
            let payload = vec![b'x'; size];
            b.iter(|| {
                let (queue, mut rx) = MessageQueue::new(64 * 1024, 64).unwrap();
                let producer = queue.non_blocking_producer();
                for _ in 0..MESSAGES {
                    producer.try_enqueue(SessionMessage::data(payload.clone())).unwrap();
                }
                while rx.try_dequeue().is_some() {}
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Blocking Producers Under Backpressure
// ============================================================================

fn bench_blocking_producers(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("blocking_producers");
    group.throughput(Throughput::Elements(MESSAGES as u64));

    for &producers in PRODUCER_COUNTS {
        group.bench_with_input(
            BenchmarkId::new("producers", producers),
            &producers,
            |b, &producers| {
                b.to_async(&rt).iter(|| drain_through_small_queue(producers));
            },
        );
    }

    group.finish();
}

/// Pushes `MESSAGES` through the default 1 KiB queue.
async fn drain_through_small_queue(producers: usize) {
    let (queue, mut rx) = MessageQueue::with_defaults().unwrap();
    let per_producer = MESSAGES / producers;

    let mut handles = Vec::with_capacity(producers);
    for _ in 0..producers {
        let producer = queue.blocking_producer();
        handles.push(tokio::spawn(async move {
            for _ in 0..per_producer {
                producer
                    .enqueue(SessionMessage::data("Hello World!! 5000"))
                    .await
                    .unwrap();
            }
        }));
    }
    drop(queue);

    let mut received = 0;
    while rx.dequeue().await.is_some() {
        received += 1;
    }
    assert_eq!(received, per_producer * producers);

    for handle in handles {
        handle.await.unwrap();
    }
}

criterion_group!(benches, bench_try_enqueue, bench_blocking_producers);
criterion_main!(benches);
