#![cfg(feature = "prometheus")]

use std::sync::OnceLock;
use std::time::Duration;

use tempfile::TempDir;
use tsrollup::telemetry::rollup_metrics::InProcessPrometheus;
use tsrollup::types::MeasuredRow;
use tsrollup::{ChunkBuilder, Resolution, RollupConfig, RollupCore, Sample, SeriesCounts};

fn install_prometheus_once() -> &'static InProcessPrometheus {
    static PROM: OnceLock<InProcessPrometheus> = OnceLock::new();
    PROM.get_or_init(|| {
        InProcessPrometheus::install(Duration::from_millis(25))
            .expect("failed to install in-process prometheus recorder")
    })
}

fn parse_sample(rendered: &str, metric: &str) -> Option<f64> {
    for line in rendered.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let key = parts.next()?;
        let val = parts.next()?;
        // Support exact match and label form: `name{...} value`.
        if key == metric || key.starts_with(metric) && key.as_bytes().get(metric.len()).copied() == Some(b'{') {
            if let Ok(v) = val.parse::<f64>() {
                return Some(v);
            }
        }
    }
    None
}

/// Sum over every label combination of one counter.
fn parse_counter(rendered: &str, base_name: &str) -> f64 {
    let total = format!("{}_total", base_name);
    rendered
        .lines()
        .map(str::trim)
        .filter(|l| !l.starts_with('#'))
        .filter_map(|l| {
            let mut parts = l.split_whitespace();
            let key = parts.next()?;
            let val = parts.next()?.parse::<f64>().ok()?;
            let name = key.split('{').next()?;
            (name == total || name == base_name).then_some(val)
        })
        .sum()
}

fn extract_tsrollup_lines(rendered: &str) -> String {
    rendered
        .lines()
        .filter(|l| l.contains("tsrollup_"))
        .take(200)
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn emits_ingest_job_pass_and_snapshot_metrics() {
    let prom = install_prometheus_once();

    let before = prom.render();
    let before_ingest = parse_counter(&before, "tsrollup_ingest_rows");
    let before_jobs = parse_counter(&before, "tsrollup_jobs_executed");
    let before_written = parse_counter(&before, "tsrollup_buckets_written");
    let before_samples = parse_counter(&before, "tsrollup_samples_aggregated");
    let before_pass_count = parse_sample(&before, "tsrollup_pass_duration_seconds_count").unwrap_or(0.0);
    let before_snapshot_count =
        parse_sample(&before, "tsrollup_snapshot_duration_seconds_count").unwrap_or(0.0);

    let dir = TempDir::new().expect("tempdir");
    let core = RollupCore::with_config(RollupConfig {
        data_dir: dir.path().to_path_buf(),
        enable_snapshots: true,
        snapshot_interval: Duration::from_secs(60 * 60),
        rollup_interval: Duration::from_secs(60 * 60),
        ..RollupConfig::default()
    })
    .expect("core init");

    let rows = 10u64;
    let mut b = ChunkBuilder::measured(SeriesCounts::new(1, 0, 0));
    for i in 0..rows {
        b.push_measured(
            i * 1_000_000,
            MeasuredRow {
                decimals: &[Sample::Value(i as f64 * 1.25)],
                enums: &[],
                reference_ids: &[],
                reference_statuses: &[],
            },
        )
        .expect("push row");
    }
    core.ingest(&b.build()).expect("ingest");
    core.rollup_now().expect("rollup");
    core.snapshot().expect("snapshot");

    // Give the exporter time to run upkeep at least once.
    std::thread::sleep(Duration::from_millis(60));

    let after = prom.render();
    let levels = (Resolution::ALL.len() - 1) as f64;

    assert!(
        parse_counter(&after, "tsrollup_ingest_rows") >= before_ingest + rows as f64,
        "expected ingest counter to grow by {}\n\nRendered tsrollup_* metrics:\n{}",
        rows,
        extract_tsrollup_lines(&after)
    );
    assert!(
        parse_counter(&after, "tsrollup_jobs_executed") >= before_jobs + levels,
        "expected one job per coarser level\n\n{}",
        extract_tsrollup_lines(&after)
    );
    assert!(
        parse_counter(&after, "tsrollup_buckets_written") >= before_written + levels,
        "expected one written bucket per coarser level\n\n{}",
        extract_tsrollup_lines(&after)
    );
    assert!(
        parse_counter(&after, "tsrollup_samples_aggregated") >= before_samples + rows as f64,
        "expected the raw rows to be counted as aggregated samples\n\n{}",
        extract_tsrollup_lines(&after)
    );
    assert!(
        parse_sample(&after, "tsrollup_pass_duration_seconds_count").unwrap_or(0.0)
            >= before_pass_count + 1.0,
        "expected pass duration histogram count to increase"
    );
    assert!(
        parse_sample(&after, "tsrollup_snapshot_duration_seconds_count").unwrap_or(0.0)
            >= before_snapshot_count + 1.0,
        "expected snapshot duration histogram count to increase"
    );
    assert!(
        parse_sample(&after, "tsrollup_snapshot_size_bytes").unwrap_or(0.0) > 0.0,
        "expected snapshot size gauge to be set"
    );
}
