//! Rollup service: turns dirty ranges into downsampling jobs and runs them.

use crate::descriptor::{BucketDescriptor, Resolution};
use crate::dirty::DirtyRangeRegistry;
use crate::error::RollupError;
use crate::merge::calculate_down_sampled;
use crate::storage::{HistoryStorage, UpdateInfo};
use crate::telemetry::{noop_event_listener, rollup_metrics, RollupEvent, RollupEventListener};
use crate::time_range::TimeRanges;
use std::sync::{Arc, Mutex};

/// Upper bound on descriptors planned for one level in one pass.
pub const DEFAULT_MAX_DESCRIPTORS_PER_PASS: usize = 10_000;

/// How much of a target descriptor a job refreshes.
///
/// Both variants recompute the whole bucket from all of its children; the distinction only
/// decides which range is reported to storage observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshRange {
    Completely,
    Partially(TimeRanges),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownSamplingJob {
    pub descriptor: BucketDescriptor,
    pub refresh: RefreshRange,
}

impl DownSamplingJob {
    /// The range reported with the job's write.
    pub fn update_info(&self) -> UpdateInfo {
        match &self.refresh {
            RefreshRange::Completely => UpdateInfo::for_descriptor(&self.descriptor),
            RefreshRange::Partially(ranges) => {
                UpdateInfo::new(self.descriptor.resolution(), ranges.clone())
            }
        }
    }
}

/// Jobs for one level plus the dirty ranges that did not fit under the cap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPlan {
    pub jobs: Vec<DownSamplingJob>,
    pub deferred: TimeRanges,
}

/// Scheduling state of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelState {
    Idle,
    /// Dirty, but the span is still below half a sample distance.
    Accumulating { span: u64 },
    Ready { span: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Written,
    Deleted,
}

/// Totals of one pass over the ladder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub levels: Vec<Resolution>,
    pub jobs: usize,
    pub written: usize,
    pub deleted: usize,
    pub deferred: usize,
}

#[derive(Debug, Clone)]
pub struct DownSamplingService {
    max_descriptors_per_pass: usize,
    events: Arc<dyn RollupEventListener>,
}

impl Default for DownSamplingService {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DESCRIPTORS_PER_PASS)
    }
}

impl DownSamplingService {
    pub fn new(max_descriptors_per_pass: usize) -> Self {
        DownSamplingService {
            max_descriptors_per_pass: max_descriptors_per_pass.max(1),
            events: noop_event_listener(),
        }
    }

    pub fn with_event_listener(mut self, events: Arc<dyn RollupEventListener>) -> Self {
        self.events = events;
        self
    }

    pub fn max_descriptors_per_pass(&self) -> usize {
        self.max_descriptors_per_pass
    }

    pub fn level_state(registry: &DirtyRangeRegistry, resolution: Resolution) -> LevelState {
        match registry.get(resolution) {
            None => LevelState::Idle,
            Some(ranges) if ranges.is_empty() => LevelState::Idle,
            Some(ranges) => {
                let span = ranges.span();
                if span >= resolution.distance() / 2 {
                    LevelState::Ready { span }
                } else {
                    LevelState::Accumulating { span }
                }
            }
        }
    }

    /// One job per descriptor touched by `dirty`, ascending by start.
    ///
    /// A descriptor fully covered by a dirty range is refreshed completely; otherwise the job
    /// carries the dirty sub-ranges inside it. Planning stops at the descriptor cap and the rest
    /// of `dirty` is returned as deferred.
    pub fn create_jobs(&self, dirty: &TimeRanges, resolution: Resolution) -> JobPlan {
        let mut plan = JobPlan::default();
        for range in dirty.iter() {
            let first = BucketDescriptor::for_timestamp(range.start(), resolution).index();
            let last = BucketDescriptor::for_timestamp(range.end(), resolution).index();
            for index in first..=last {
                let descriptor = BucketDescriptor::for_index(resolution, index);
                if plan.jobs.last().map(|j| j.descriptor) == Some(descriptor) {
                    continue;
                }
                let fitted = dirty.fit_within(descriptor.start(), descriptor.end());
                if fitted.is_empty() {
                    continue;
                }
                if plan.jobs.len() == self.max_descriptors_per_pass {
                    plan.deferred = dirty.starting_at(descriptor.start());
                    self.events.on_event(RollupEvent::DescriptorCapReached {
                        resolution,
                        limit: self.max_descriptors_per_pass,
                        deferred_from: descriptor.start(),
                    });
                    return plan;
                }
                let refresh = if dirty.covers(descriptor.start(), descriptor.end()) {
                    RefreshRange::Completely
                } else {
                    RefreshRange::Partially(fitted)
                };
                plan.jobs.push(DownSamplingJob {
                    descriptor,
                    refresh,
                });
            }
        }
        plan
    }

    /// Recomputes the job's bucket from all existing children, or deletes it when none exist.
    pub fn recalculate<S>(&self, storage: &mut S, job: &DownSamplingJob) -> Result<JobOutcome, RollupError>
    where
        S: HistoryStorage + ?Sized,
    {
        let resolution = job.descriptor.resolution();
        let children = storage.get_many(&job.descriptor.children());
        if children.is_empty() {
            storage.delete(&job.descriptor)?;
            rollup_metrics::record_job(resolution, false);
            self.events.on_event(RollupEvent::BucketDeleted {
                descriptor: job.descriptor,
            });
            return Ok(JobOutcome::Deleted);
        }

        let bucket = calculate_down_sampled(&job.descriptor, &children)?;
        rollup_metrics::record_samples_aggregated(
            children.iter().map(|c| c.chunk.len() as u64).sum(),
        );
        storage.store_without_cache(bucket, job.update_info())?;
        rollup_metrics::record_job(resolution, true);
        Ok(JobOutcome::Written)
    }

    /// Runs every level that is [`LevelState::Ready`].
    ///
    /// The registry lock is only held while popping or re-marking ranges, never while storage is
    /// written, so storage observers may mark the registry during the pass.
    pub fn calculate_if_required<S>(
        &self,
        storage: &mut S,
        registry: &Mutex<DirtyRangeRegistry>,
    ) -> Result<PassReport, RollupError>
    where
        S: HistoryStorage + ?Sized,
    {
        self.run_pass(storage, registry, false)
    }

    /// Runs every dirty level regardless of the readiness threshold.
    pub fn calculate_all<S>(
        &self,
        storage: &mut S,
        registry: &Mutex<DirtyRangeRegistry>,
    ) -> Result<PassReport, RollupError>
    where
        S: HistoryStorage + ?Sized,
    {
        self.run_pass(storage, registry, true)
    }

    fn run_pass<S>(
        &self,
        storage: &mut S,
        registry: &Mutex<DirtyRangeRegistry>,
        forced: bool,
    ) -> Result<PassReport, RollupError>
    where
        S: HistoryStorage + ?Sized,
    {
        let mut report = PassReport::default();
        // Finest first, so writes at one level can make the next level ready in the same pass.
        for resolution in Resolution::ALL {
            let dirty = {
                let mut guard = registry.lock()?;
                match Self::level_state(&guard, resolution) {
                    LevelState::Idle => continue,
                    LevelState::Accumulating { .. } if !forced => continue,
                    _ => {}
                }
                match guard.remove(resolution) {
                    Some(dirty) => dirty,
                    None => continue,
                }
            };
            // Nothing aggregates into the finest level.
            if resolution.finer().is_none() {
                continue;
            }

            let plan = self.create_jobs(&dirty, resolution);
            if !plan.deferred.is_empty() {
                registry.lock()?.mark_as_dirty(resolution, &plan.deferred);
                report.deferred += plan.deferred.len();
                rollup_metrics::record_deferred(plan.deferred.len() as u64);
            }

            report.levels.push(resolution);
            for job in &plan.jobs {
                match self.recalculate(storage, job)? {
                    JobOutcome::Written => report.written += 1,
                    JobOutcome::Deleted => report.deleted += 1,
                }
                report.jobs += 1;
            }
        }
        Ok(report)
    }
}
