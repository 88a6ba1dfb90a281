//! Rollup core: public API, background scheduler thread, and orchestration of storage, the dirty
//! registry, the rollup service and snapshots.

use crate::descriptor::{BucketDescriptor, Resolution};
use crate::dirty::DirtyRangeRegistry;
use crate::error::RollupError;
use crate::persistence::{SnapshotState, Snapshotter};
use crate::query;
use crate::service::{DownSamplingService, LevelState, PassReport, DEFAULT_MAX_DESCRIPTORS_PER_PASS};
use crate::storage::{HistoryStorage, InMemoryHistoryStorage};
use crate::telemetry::{noop_event_listener, rollup_metrics, RollupEvent, RollupEventListener};
use crate::time_range::TimeRanges;
use crate::types::{HistoryBucket, HistoryChunk, Sample, Timestamp};

use std::ops::Range;
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Commands sent to the scheduler thread.
enum SchedulerCommand {
    RollupNow {
        ack: mpsc::Sender<Result<PassReport, RollupError>>,
    },
    Snapshot {
        ack: mpsc::Sender<Result<PathBuf, RollupError>>,
    },
    Shutdown,
}

/// Configuration options for the [`RollupCore`].
#[derive(Debug, Clone)]
pub struct RollupConfig {
    /// Interval between scheduler ticks.
    pub rollup_interval: Duration,
    /// Resolution raw chunks are ingested at.
    pub natural_resolution: Resolution,
    /// Descriptor cap per level and pass; the rest is deferred to later ticks.
    pub max_descriptors_per_pass: usize,
    /// Directory for snapshot files.
    pub data_dir: PathBuf,
    pub enable_snapshots: bool,
    /// Interval between automatic snapshots (if enabled).
    pub snapshot_interval: Duration,
    /// Number of snapshot files retained after each new snapshot.
    pub snapshots_to_keep: usize,
    /// Structured event hook for observability (no-op by default).
    pub event_listener: Arc<dyn RollupEventListener>,
}

impl Default for RollupConfig {
    fn default() -> Self {
        RollupConfig {
            rollup_interval: crate::DEFAULT_ROLLUP_INTERVAL,
            natural_resolution: Resolution::HundredMillis,
            max_descriptors_per_pass: DEFAULT_MAX_DESCRIPTORS_PER_PASS,
            data_dir: PathBuf::from("./data"),
            enable_snapshots: false,
            snapshot_interval: Duration::from_secs(60 * 15),
            snapshots_to_keep: 3,
            event_listener: noop_event_listener(),
        }
    }
}

/// State shared between the public handle and the scheduler thread.
#[derive(Debug)]
struct Scheduler {
    storage: Arc<RwLock<InMemoryHistoryStorage>>,
    registry: Arc<Mutex<DirtyRangeRegistry>>,
    service: DownSamplingService,
    snapshotter: Option<Arc<Snapshotter>>,
    snapshots_to_keep: usize,
    events: Arc<dyn RollupEventListener>,
}

impl Scheduler {
    fn run_pass(&self, forced: bool) -> Result<PassReport, RollupError> {
        let started = Instant::now();
        let result = {
            let mut storage = self.storage.write()?;
            if forced {
                self.service.calculate_all(&mut *storage, &self.registry)
            } else {
                self.service.calculate_if_required(&mut *storage, &self.registry)
            }
        };
        let duration = started.elapsed();

        match &result {
            Ok(report) => {
                let pending = self.registry.lock().map(|r| r.pending_span()).unwrap_or(0);
                rollup_metrics::record_pass(duration, pending);
                if forced || report.jobs > 0 {
                    self.events.on_event(RollupEvent::PassCompleted {
                        forced,
                        jobs: report.jobs,
                        written: report.written,
                        deleted: report.deleted,
                        duration,
                    });
                }
            }
            Err(e) => self.events.on_event(RollupEvent::PassFailed {
                error: e.to_string(),
            }),
        }
        result
    }

    fn snapshot(&self) -> Result<PathBuf, RollupError> {
        let Some(snapshotter) = &self.snapshotter else {
            return Err(RollupError::ConfigError("Snapshots are not enabled".to_string()));
        };

        let started = Instant::now();
        // Storage before registry, the same order storage observers use.
        let state = {
            let storage = self.storage.read()?;
            let registry = self.registry.lock()?;
            SnapshotState {
                buckets: storage.buckets().map(|b| HistoryBucket::clone(b)).collect(),
                dirty: registry.iter().map(|(r, ranges)| (r, ranges.clone())).collect(),
            }
        };

        let timestamp = now_ns();
        match snapshotter.create_snapshot(&state, timestamp) {
            Ok((path, size)) => {
                rollup_metrics::record_snapshot(started.elapsed(), size);
                self.events.on_event(RollupEvent::SnapshotCreated {
                    path: path.clone(),
                    timestamp,
                    buckets: state.buckets.len(),
                });
                snapshotter.prune(self.snapshots_to_keep)?;
                Ok(path)
            }
            Err(e) => {
                self.events.on_event(RollupEvent::SnapshotFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

/// Multi-resolution history store that keeps every coarser level up to date in the background.
#[derive(Debug)]
pub struct RollupCore {
    scheduler: Arc<Scheduler>,
    cmd_tx: mpsc::Sender<SchedulerCommand>,
    handle: Option<JoinHandle<()>>,
    config: RollupConfig,
}

impl RollupCore {
    /// Creates the storage, wires the dirty registry to it and spawns the scheduler thread.
    ///
    /// # Errors
    /// Returns an error if an interval or the descriptor cap is zero, the snapshot directory
    /// cannot be created or the thread cannot be spawned.
    pub fn with_config(config: RollupConfig) -> Result<Self, RollupError> {
        if config.rollup_interval.is_zero() {
            return Err(RollupError::ConfigError("rollup_interval must be positive".to_string()));
        }
        if config.enable_snapshots && config.snapshot_interval.is_zero() {
            return Err(RollupError::ConfigError("snapshot_interval must be positive".to_string()));
        }
        if config.max_descriptors_per_pass == 0 {
            return Err(RollupError::ConfigError(
                "max_descriptors_per_pass must be positive".to_string(),
            ));
        }
        let storage = Arc::new(RwLock::new(InMemoryHistoryStorage::new()));
        let registry = Arc::new(Mutex::new(DirtyRangeRegistry::new()));
        DirtyRangeRegistry::observe(&registry, &mut *storage.write()?);

        let snapshotter = if config.enable_snapshots {
            Some(Arc::new(Snapshotter::new(config.data_dir.join("snapshots"))?))
        } else {
            None
        };

        let events = config.event_listener.clone();
        let scheduler = Arc::new(Scheduler {
            storage,
            registry,
            service: DownSamplingService::new(config.max_descriptors_per_pass)
                .with_event_listener(events.clone()),
            snapshotter,
            snapshots_to_keep: config.snapshots_to_keep,
            events,
        });

        let (cmd_tx, cmd_rx) = mpsc::channel::<SchedulerCommand>();
        let thread_scheduler = Arc::clone(&scheduler);
        let rollup_interval = config.rollup_interval;
        let snapshot_interval = config.enable_snapshots.then_some(config.snapshot_interval);

        let handle = thread::Builder::new()
            .name("tsrollup-scheduler".to_string())
            .spawn(move || {
                let scheduler = thread_scheduler;
                scheduler.events.on_event(RollupEvent::SchedulerStarted);
                let mut last_snapshot = Instant::now();

                loop {
                    if let Some(interval) = snapshot_interval {
                        if last_snapshot.elapsed() >= interval {
                            // Failures are reported through the event hook.
                            let _ = scheduler.snapshot();
                            last_snapshot = Instant::now();
                        }
                    }

                    match cmd_rx.recv_timeout(rollup_interval) {
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            let _ = scheduler.run_pass(false);
                        }
                        Ok(SchedulerCommand::RollupNow { ack }) => {
                            let _ = ack.send(scheduler.run_pass(true));
                        }
                        Ok(SchedulerCommand::Snapshot { ack }) => {
                            let _ = ack.send(scheduler.snapshot());
                            last_snapshot = Instant::now();
                        }
                        Ok(SchedulerCommand::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                            scheduler.events.on_event(RollupEvent::SchedulerStopping);
                            break;
                        }
                    }
                }
            })
            .map_err(|e| {
                RollupError::BackgroundTaskError(format!("Failed to spawn scheduler thread: {}", e))
            })?;

        Ok(RollupCore {
            scheduler,
            cmd_tx,
            handle: Some(handle),
            config,
        })
    }

    /// Default configuration with a custom scheduler interval.
    pub fn new(rollup_interval: Duration) -> Result<Self, RollupError> {
        Self::with_config(RollupConfig {
            rollup_interval,
            ..RollupConfig::default()
        })
    }

    /// Restores buckets and pending dirty ranges from the latest snapshot.
    ///
    /// Returns the number of buckets restored; zero when snapshots are disabled or none exist.
    /// Restoring does not notify observers, so no rollups are triggered beyond the ranges that
    /// were dirty when the snapshot was taken.
    pub fn recover(&mut self) -> Result<usize, RollupError> {
        let Some(snapshotter) = &self.scheduler.snapshotter else {
            return Ok(0);
        };
        let Some(state) = snapshotter.load_latest_snapshot()? else {
            return Ok(0);
        };

        let restored = state.buckets.len();
        {
            let mut storage = self.scheduler.storage.write()?;
            storage.clear();
            storage.load(state.buckets);
        }
        let mut registry = self.scheduler.registry.lock()?;
        for (resolution, ranges) in &state.dirty {
            registry.mark_as_dirty(*resolution, ranges);
        }
        Ok(restored)
    }

    /// Stores raw rows at the natural resolution. Coarser levels are refreshed asynchronously.
    ///
    /// Returns the natural-resolution buckets the chunk touched.
    pub fn ingest(&self, chunk: &HistoryChunk) -> Result<Vec<BucketDescriptor>, RollupError> {
        let touched = self
            .scheduler
            .storage
            .write()?
            .store_chunk(chunk, self.config.natural_resolution)?;
        rollup_metrics::record_ingest_rows(chunk.len() as u64);
        Ok(touched)
    }

    /// Decimal samples of one series at `resolution` inside `time_range`.
    pub fn query_decimals(
        &self,
        resolution: Resolution,
        time_range: Range<Timestamp>,
        series: usize,
    ) -> Result<Vec<(Timestamp, Sample<f64>)>, RollupError> {
        let storage = self.scheduler.storage.read()?;
        query::query_decimals(&*storage, resolution, time_range, series)
    }

    /// Deletes `descriptor` and all earlier buckets at its resolution. Coarser levels are
    /// recomputed, or deleted once they have no children left.
    pub fn delete_and_before(&self, descriptor: &BucketDescriptor) -> Result<usize, RollupError> {
        self.scheduler.storage.write()?.delete_and_before(descriptor)
    }

    /// Runs a pass over every dirty level, ignoring the readiness threshold, and waits for it.
    ///
    /// The pass runs on the scheduler thread, so it never overlaps a timer tick.
    pub fn rollup_now(&self) -> Result<PassReport, RollupError> {
        let (tx, rx) = mpsc::channel();
        self.cmd_tx
            .send(SchedulerCommand::RollupNow { ack: tx })
            .map_err(|e| RollupError::BackgroundTaskError(format!("Failed to send rollup command: {}", e)))?;
        rx.recv()
            .map_err(|e| RollupError::BackgroundTaskError(format!("Failed to receive rollup ack: {}", e)))?
    }

    /// Writes a snapshot of all buckets and pending dirty ranges and waits for it.
    pub fn snapshot(&self) -> Result<PathBuf, RollupError> {
        if self.scheduler.snapshotter.is_none() {
            return Err(RollupError::ConfigError("Snapshots are not enabled".to_string()));
        }

        let (tx, rx) = mpsc::channel();
        self.cmd_tx
            .send(SchedulerCommand::Snapshot { ack: tx })
            .map_err(|e| RollupError::BackgroundTaskError(format!("Failed to send snapshot command: {}", e)))?;
        rx.recv()
            .map_err(|e| RollupError::BackgroundTaskError(format!("Failed to receive snapshot ack: {}", e)))?
    }

    /// Pending dirty ranges of one level.
    pub fn dirty_ranges(&self, resolution: Resolution) -> Result<Option<TimeRanges>, RollupError> {
        Ok(self.scheduler.registry.lock()?.get(resolution).cloned())
    }

    pub fn level_state(&self, resolution: Resolution) -> Result<LevelState, RollupError> {
        let registry = self.scheduler.registry.lock()?;
        Ok(DownSamplingService::level_state(&registry, resolution))
    }

    pub fn bucket(&self, descriptor: &BucketDescriptor) -> Result<Option<Arc<HistoryBucket>>, RollupError> {
        Ok(self.scheduler.storage.read()?.get(descriptor))
    }

    /// Shared handle to the underlying storage.
    ///
    /// Writers must not hold the dirty registry while writing; storage observers lock it.
    pub fn storage(&self) -> Arc<RwLock<InMemoryHistoryStorage>> {
        Arc::clone(&self.scheduler.storage)
    }

    pub fn get_config(&self) -> &RollupConfig {
        &self.config
    }
}

impl Drop for RollupCore {
    fn drop(&mut self) {
        // An in-flight pass completes before the thread sees the command.
        let _ = self.cmd_tx.send(SchedulerCommand::Shutdown);

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                self.config.event_listener.on_event(RollupEvent::SchedulerPanicked);
            }
        }
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkBuilder, MeasuredRow, SeriesCounts};

    const MS: u64 = 1_000_000;

    fn chunk(rows: &[(u64, f64)]) -> HistoryChunk {
        let mut b = ChunkBuilder::measured(SeriesCounts::new(1, 0, 0));
        for &(ts, v) in rows {
            b.push_measured(
                ts,
                MeasuredRow {
                    decimals: &[Sample::Value(v)],
                    enums: &[],
                    reference_ids: &[],
                    reference_statuses: &[],
                },
            )
            .unwrap();
        }
        b.build()
    }

    fn idle_core() -> RollupCore {
        RollupCore::new(Duration::from_secs(3600)).unwrap()
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let zero_tick = RollupConfig {
            rollup_interval: Duration::ZERO,
            ..RollupConfig::default()
        };
        assert!(matches!(RollupCore::with_config(zero_tick), Err(RollupError::ConfigError(_))));

        let dir = tempfile::tempdir().unwrap();
        let zero_snapshots = RollupConfig {
            data_dir: dir.path().to_path_buf(),
            enable_snapshots: true,
            snapshot_interval: Duration::ZERO,
            ..RollupConfig::default()
        };
        assert!(matches!(
            RollupCore::with_config(zero_snapshots.clone()),
            Err(RollupError::ConfigError(_))
        ));
        // Without snapshots the interval is never used.
        let disabled = RollupConfig {
            enable_snapshots: false,
            ..zero_snapshots
        };
        assert!(RollupCore::with_config(disabled).is_ok());
    }

    #[test]
    fn ingest_marks_next_level_dirty() {
        let core = idle_core();
        let touched = core.ingest(&chunk(&[(10 * MS, 1.0), (150 * MS, 2.0)])).unwrap();
        assert_eq!(touched.len(), 2);
        assert!(core.dirty_ranges(Resolution::FiveSeconds).unwrap().is_some());
        assert!(core.dirty_ranges(Resolution::HundredMillis).unwrap().is_none());
    }

    #[test]
    fn rollup_now_cascades_to_the_top() {
        let core = idle_core();
        core.ingest(&chunk(&[(10 * MS, 1.0), (11 * MS, 3.0)])).unwrap();
        let report = core.rollup_now().unwrap();
        assert_eq!(report.levels.len(), Resolution::ALL.len() - 1);
        assert_eq!(report.written, Resolution::ALL.len() - 1);

        for resolution in &Resolution::ALL[1..] {
            let d = BucketDescriptor::for_timestamp(10 * MS, *resolution);
            assert!(core.bucket(&d).unwrap().is_some(), "missing {}", resolution);
            assert_eq!(core.level_state(*resolution).unwrap(), LevelState::Idle);
        }

        let five_s = core.query_decimals(Resolution::FiveSeconds, 0..5_000 * MS, 0).unwrap();
        assert_eq!(five_s.len(), 500);
        assert_eq!(five_s[1], (15 * MS, Sample::Value(2.0)));
    }

    #[test]
    fn snapshot_requires_enabling() {
        let core = idle_core();
        assert!(matches!(core.snapshot(), Err(RollupError::ConfigError(_))));
    }

    #[test]
    fn timer_runs_ready_levels() {
        let core = RollupCore::new(Duration::from_millis(10)).unwrap();
        core.ingest(&chunk(&[(10 * MS, 1.0), (90 * MS, 3.0)])).unwrap();

        let target = BucketDescriptor::for_index(Resolution::FiveSeconds, 0);
        let deadline = Instant::now() + Duration::from_secs(5);
        while core.bucket(&target).unwrap().is_none() {
            assert!(Instant::now() < deadline, "scheduler never ran");
            thread::sleep(Duration::from_millis(5));
        }
    }
}
