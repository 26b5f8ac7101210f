use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};
use removable_queue::RemovableQueue;
use std::fs::File;
use std::hint::black_box;
use std::io::{BufWriter, Write};
use std::time::{Duration, Instant};
use sysinfo::System;

const BATCH_SIZE: usize = 100;
const MAX_OPERATIONS: usize = 100_000;

/// Samples available memory around a batch of operations and appends a CSV row.
fn record(
    writer: &mut BufWriter<File>,
    sys: &mut System,
    operation: &str,
    run: impl FnOnce() -> Duration,
) -> Duration {
    sys.refresh_memory();
    let memory_before = sys.available_memory();
    let elapsed = run();
    sys.refresh_memory();
    let memory_after = sys.available_memory();
    let memory_change = memory_after as i64 - memory_before as i64;

    writeln!(
        writer,
        "{},removable_queue,{},{} KB,{} KB,{} KB",
        Utc::now().to_rfc3339(),
        operation,
        memory_before / 1024,
        memory_after / 1024,
        memory_change / 1024
    )
    .expect("Unable to write to file");
    elapsed
}

fn benchmark_removable_queue_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("Removable Queue Memory");
    let mut sys = System::new_all();

    let file = File::create("removable_queue_memory_usage.csv").expect("Unable to create file");
    let mut writer = BufWriter::new(file);

    writeln!(
        writer,
        "Timestamp,Benchmark,Operation,Memory Before (KB),Memory After (KB),Memory Free Change (KB)"
    )
    .expect("Unable to write to file");

    group.bench_function("Enqueue Memory", |b| {
        let queue = RemovableQueue::new();
        b.iter_custom(|iters| {
            let operations = (iters as usize).min(MAX_OPERATIONS);
            record(&mut writer, &mut sys, "enqueue", || {
                let start = Instant::now();
                for i in 0..operations {
                    queue.enqueue(black_box(i));
                }
                start.elapsed()
            })
        });
    });

    // Enqueue then dequeue in batches; the queue never grows, so available
    // memory should stay flat if dequeued nodes are reclaimed.
    group.bench_function("Enqueue/Dequeue Churn Memory", |b| {
        let queue = RemovableQueue::new();
        b.iter_custom(|iters| {
            let batches = (iters as usize).min(MAX_OPERATIONS) / BATCH_SIZE;
            record(&mut writer, &mut sys, "enqueue_dequeue", || {
                let start = Instant::now();
                for _ in 0..batches {
                    for i in 0..BATCH_SIZE {
                        queue.enqueue(i);
                    }
                    for _ in 0..BATCH_SIZE {
                        black_box(queue.dequeue());
                    }
                }
                start.elapsed()
            })
        });
    });

    // Same for removals from the middle of a standing queue.
    group.bench_function("Enqueue/Remove Churn Memory", |b| {
        let queue: RemovableQueue<usize> = (0..BATCH_SIZE).collect();
        b.iter_custom(|iters| {
            let batches = (iters as usize).min(MAX_OPERATIONS) / BATCH_SIZE;
            record(&mut writer, &mut sys, "enqueue_remove", || {
                let start = Instant::now();
                for _ in 0..batches {
                    for i in BATCH_SIZE..(2 * BATCH_SIZE) {
                        queue.enqueue(i);
                    }
                    for i in BATCH_SIZE..(2 * BATCH_SIZE) {
                        black_box(queue.remove(&i));
                    }
                }
                start.elapsed()
            })
        });
    });

    group.finish();
    writer.flush().expect("Failed to flush memory usage data");
}

criterion_group!(benches, benchmark_removable_queue_memory);
criterion_main!(benches);
