use crate::descriptor::{BucketDescriptor, Resolution};
use crate::types::Timestamp;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "prometheus")]
use std::sync::{mpsc, Mutex};
#[cfg(feature = "prometheus")]
use std::thread::JoinHandle;

/// Hook for structured scheduler and snapshot events.
///
/// The library never prints. Callers provide an implementation that forwards these events to
/// `tracing`, metrics, or custom sinks.
pub trait RollupEventListener: std::fmt::Debug + Send + Sync + 'static {
    fn on_event(&self, event: RollupEvent);
}

/// Structured events emitted by the scheduler and the rollup service.
#[derive(Debug, Clone)]
pub enum RollupEvent {
    SchedulerStarted,
    SchedulerStopping,
    SchedulerPanicked,

    PassCompleted {
        forced: bool,
        jobs: usize,
        written: usize,
        deleted: usize,
        duration: Duration,
    },
    PassFailed { error: String },

    DescriptorCapReached {
        resolution: Resolution,
        limit: usize,
        deferred_from: Timestamp,
    },
    BucketDeleted { descriptor: BucketDescriptor },

    SnapshotCreated { path: PathBuf, timestamp: u64, buckets: usize },
    SnapshotFailed { error: String },
}

#[derive(Debug)]
pub struct NoopEventListener;

impl RollupEventListener for NoopEventListener {
    #[inline]
    fn on_event(&self, _event: RollupEvent) {}
}

pub fn noop_event_listener() -> Arc<dyn RollupEventListener> {
    Arc::new(NoopEventListener)
}

/// Metrics instrumentation for rollup passes, with optional in-process Prometheus scraping.
///
/// Emitting metrics is a no-op until a recorder is installed.
pub mod rollup_metrics {
    use super::*;

    use ::metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

    #[cfg(feature = "prometheus")]
    use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

    // Counters are exposed as `<name>_total` by the Prometheus exporter.

    pub const INGEST_ROWS: &str = "tsrollup_ingest_rows";
    pub const JOBS_EXECUTED: &str = "tsrollup_jobs_executed";
    pub const BUCKETS_WRITTEN: &str = "tsrollup_buckets_written";
    pub const BUCKETS_DELETED: &str = "tsrollup_buckets_deleted";
    pub const SAMPLES_AGGREGATED: &str = "tsrollup_samples_aggregated";
    pub const DEFERRED_RANGES: &str = "tsrollup_deferred_ranges";
    pub const PASS_DURATION_SECONDS: &str = "tsrollup_pass_duration_seconds";
    pub const PENDING_DIRTY_SPAN_SECONDS: &str = "tsrollup_pending_dirty_span_seconds";

    pub const SNAPSHOT_DURATION_SECONDS: &str = "tsrollup_snapshot_duration_seconds";
    pub const SNAPSHOT_SIZE_BYTES: &str = "tsrollup_snapshot_size_bytes";

    /// Global Prometheus recorder plus the thread that keeps its histograms bounded.
    ///
    /// Rendering is pull-based; no HTTP listener is started here.
    #[cfg(feature = "prometheus")]
    #[derive(Debug)]
    pub struct InProcessPrometheus {
        handle: PrometheusHandle,
        upkeep: Mutex<Option<(mpsc::Sender<()>, JoinHandle<()>)>>,
    }

    #[cfg(feature = "prometheus")]
    impl InProcessPrometheus {
        /// Installs the process-wide recorder. Fails with
        /// [`MetricsInitError::AlreadyInstalled`] when any recorder is already set.
        pub fn install(upkeep_interval: Duration) -> Result<Self, MetricsInitError> {
            describe_all();

            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| match e {
                    BuildError::FailedToSetGlobalRecorder(_) => MetricsInitError::AlreadyInstalled,
                    other => MetricsInitError::Install(other.to_string()),
                })?;

            let (stop_tx, stop_rx) = mpsc::channel::<()>();
            let upkeep_handle = handle.clone();
            let thread = std::thread::Builder::new()
                .name("tsrollup-metrics-upkeep".to_string())
                .spawn(move || {
                    // Ticks until the sender is dropped or signals.
                    while let Err(mpsc::RecvTimeoutError::Timeout) = stop_rx.recv_timeout(upkeep_interval) {
                        upkeep_handle.run_upkeep();
                    }
                })
                .map_err(|e| MetricsInitError::ThreadSpawn(e.to_string()))?;

            Ok(Self {
                handle,
                upkeep: Mutex::new(Some((stop_tx, thread))),
            })
        }

        /// Prometheus text exposition of every metric recorded so far.
        pub fn render(&self) -> String {
            self.handle.render()
        }
    }

    #[cfg(feature = "prometheus")]
    impl Drop for InProcessPrometheus {
        fn drop(&mut self) {
            let upkeep = match self.upkeep.get_mut() {
                Ok(slot) => slot.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            if let Some((stop, thread)) = upkeep {
                let _ = stop.send(());
                let _ = thread.join();
            }
        }
    }

    #[cfg(feature = "prometheus")]
    #[derive(Debug, thiserror::Error)]
    pub enum MetricsInitError {
        #[error("a global metrics recorder is already set")]
        AlreadyInstalled,
        #[error("prometheus recorder install failed: {0}")]
        Install(String),
        #[error("metrics upkeep thread could not start: {0}")]
        ThreadSpawn(String),
    }

    #[inline]
    pub fn record_ingest_rows(rows: u64) {
        if rows > 0 {
            ::metrics::counter!(INGEST_ROWS).increment(rows);
        }
    }

    #[inline]
    pub fn record_job(resolution: Resolution, written: bool) {
        ::metrics::counter!(JOBS_EXECUTED, "resolution" => resolution.name()).increment(1);
        if written {
            ::metrics::counter!(BUCKETS_WRITTEN, "resolution" => resolution.name()).increment(1);
        } else {
            ::metrics::counter!(BUCKETS_DELETED, "resolution" => resolution.name()).increment(1);
        }
    }

    #[inline]
    pub fn record_samples_aggregated(samples: u64) {
        if samples > 0 {
            ::metrics::counter!(SAMPLES_AGGREGATED).increment(samples);
        }
    }

    #[inline]
    pub fn record_deferred(ranges: u64) {
        if ranges > 0 {
            ::metrics::counter!(DEFERRED_RANGES).increment(ranges);
        }
    }

    #[inline]
    pub fn record_pass(duration: Duration, pending_dirty_span_nanos: u64) {
        ::metrics::histogram!(PASS_DURATION_SECONDS).record(duration.as_secs_f64());
        ::metrics::gauge!(PENDING_DIRTY_SPAN_SECONDS).set(pending_dirty_span_nanos as f64 / 1e9);
    }

    #[inline]
    pub fn record_snapshot(duration: Duration, size_bytes: u64) {
        ::metrics::histogram!(SNAPSHOT_DURATION_SECONDS).record(duration.as_secs_f64());
        ::metrics::gauge!(SNAPSHOT_SIZE_BYTES).set(size_bytes as f64);
    }

    pub fn describe_all() {
        describe_counter!(INGEST_ROWS, Unit::Count, "Raw rows ingested via RollupCore::ingest.");
        describe_counter!(
            JOBS_EXECUTED,
            Unit::Count,
            "Downsampling jobs executed, labelled by target resolution."
        );
        describe_counter!(BUCKETS_WRITTEN, Unit::Count, "Aggregated buckets written back to storage.");
        describe_counter!(
            BUCKETS_DELETED,
            Unit::Count,
            "Target buckets deleted because no children remained."
        );
        describe_counter!(
            SAMPLES_AGGREGATED,
            Unit::Count,
            "Child rows consumed by downsampling jobs."
        );
        describe_counter!(
            DEFERRED_RANGES,
            Unit::Count,
            "Dirty ranges re-marked because a pass hit the descriptor cap."
        );

        describe_histogram!(
            PASS_DURATION_SECONDS,
            Unit::Seconds,
            "Wall time of one scheduler pass over all levels."
        );
        describe_histogram!(
            SNAPSHOT_DURATION_SECONDS,
            Unit::Seconds,
            "Wall time from serializing the store to the snapshot rename."
        );

        describe_gauge!(
            PENDING_DIRTY_SPAN_SECONDS,
            Unit::Seconds,
            "Total dirty span left in the registry after the last pass."
        );
        describe_gauge!(
            SNAPSHOT_SIZE_BYTES,
            Unit::Bytes,
            "Bytes written by the latest snapshot, header included."
        );
    }
}
