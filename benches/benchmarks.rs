
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tsrollup::{
    calculate_down_sampled, BucketDescriptor, HistoryStorage, InMemoryHistoryStorage, Resolution,
    RollupConfig, RollupCore,
};

use std::time::Duration;

const MS: u64 = 1_000_000;

fn idle_config() -> RollupConfig {
    RollupConfig {
        // Passes are triggered by the benchmark, never by the timer.
        rollup_interval: Duration::from_secs(60 * 60),
        ..RollupConfig::default()
    }
}

fn bench_calculate_down_sampled(c: &mut Criterion) {
    // One raw row per millisecond fills every raw child of FiveSeconds bucket 0.
    let chunk = datasets::generate_raw_chunk(datasets::DEFAULT_SEED, 5_000, MS, 4);
    let mut storage = InMemoryHistoryStorage::new();
    storage
        .store_chunk(&chunk, Resolution::HundredMillis)
        .expect("store raw chunk");

    let raw_target = BucketDescriptor::for_index(Resolution::FiveSeconds, 0);
    let raw_children = storage.get_many(&raw_target.children());
    assert_eq!(raw_children.len(), 50);

    // Aggregated children: twelve FiveSeconds buckets under OneMinute bucket 0.
    let wide = datasets::generate_raw_chunk(datasets::DEFAULT_SEED, 60_000, MS, 4);
    let mut wide_storage = InMemoryHistoryStorage::new();
    wide_storage
        .store_chunk(&wide, Resolution::HundredMillis)
        .expect("store raw chunk");
    let calculated_children: Vec<_> = BucketDescriptor::for_index(Resolution::OneMinute, 0)
        .children()
        .iter()
        .map(|d| {
            let children = wide_storage.get_many(&d.children());
            std::sync::Arc::new(calculate_down_sampled(d, &children).expect("calculate"))
        })
        .collect();
    let calculated_target = BucketDescriptor::for_index(Resolution::OneMinute, 0);

    let mut group = c.benchmark_group("calculate_down_sampled");
    group.throughput(Throughput::Elements(chunk.len() as u64));
    group.bench_function("raw_children_5k_rows", |b| {
        b.iter(|| calculate_down_sampled(black_box(&raw_target), black_box(&raw_children)).unwrap())
    });
    group.throughput(Throughput::Elements(
        calculated_children.iter().map(|b| b.chunk.len() as u64).sum(),
    ));
    group.bench_function("calculated_children_one_minute", |b| {
        b.iter(|| {
            calculate_down_sampled(black_box(&calculated_target), black_box(&calculated_children))
                .unwrap()
        })
    });
    group.finish();
}

fn bench_rollup_pass(c: &mut Criterion) {
    let chunk = datasets::generate_raw_chunk(datasets::DEFAULT_SEED, 20_000, 3 * MS, 4);

    let mut group = c.benchmark_group("rollup");
    group.throughput(Throughput::Elements(chunk.len() as u64));
    group.bench_function("ingest_then_rollup_now_20k", |b| {
        b.iter_batched(
            || {
                let core = RollupCore::with_config(idle_config()).expect("core init");
                core.ingest(&chunk).expect("ingest");
                core
            },
            |core| {
                let report = core.rollup_now().unwrap();
                black_box(report);
            },
            BatchSize::LargeInput,
        )
    });
    group.finish();
}

fn bench_query_levels(c: &mut Criterion) {
    let chunk = datasets::generate_raw_chunk(datasets::DEFAULT_SEED, 60_000, MS, 4);
    let core = RollupCore::with_config(idle_config()).expect("core init");
    core.ingest(&chunk).expect("ingest");
    core.rollup_now().expect("rollup");

    let range = 0..60_000 * MS;
    let mut group = c.benchmark_group("query");
    for resolution in [Resolution::HundredMillis, Resolution::FiveSeconds, Resolution::OneMinute] {
        group.bench_function(format!("one_minute_at_{}", resolution), |b| {
            b.iter(|| {
                let _ = core
                    .query_decimals(black_box(resolution), black_box(range.clone()), 2)
                    .unwrap();
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_calculate_down_sampled,
    bench_rollup_pass,
    bench_query_levels
);
criterion_main!(benches);
