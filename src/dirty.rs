use crate::descriptor::Resolution;
use crate::storage::{HistoryStorage, UpdateInfo};
use crate::time_range::TimeRanges;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Per-level set of time ranges whose aggregates are stale.
///
/// The registry itself is not synchronized. Writers other than the scheduler must serialize
/// access, which is what [`DirtyRangeRegistry::observe`] does through a mutex.
#[derive(Debug, Default, Clone)]
pub struct DirtyRangeRegistry {
    levels: BTreeMap<Resolution, TimeRanges>,
}

impl DirtyRangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `ranges` into the level's set, coalescing ranges closer than one sample apart.
    pub fn mark_as_dirty(&mut self, resolution: Resolution, ranges: &TimeRanges) {
        if ranges.is_empty() {
            return;
        }
        let tolerance = resolution.distance();
        let merged = match self.levels.get(&resolution) {
            Some(existing) => existing.merge_with(ranges, tolerance),
            None => TimeRanges::new().merge_with(ranges, tolerance),
        };
        self.levels.insert(resolution, merged);
    }

    pub fn get(&self, resolution: Resolution) -> Option<&TimeRanges> {
        self.levels.get(&resolution)
    }

    /// Pops the level's ranges.
    pub fn remove(&mut self, resolution: Resolution) -> Option<TimeRanges> {
        self.levels.remove(&resolution)
    }

    /// Levels with pending ranges, finest first.
    pub fn dirty_resolutions(&self) -> Vec<Resolution> {
        self.levels.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Total dirty span over all levels.
    pub fn pending_span(&self) -> u64 {
        self.levels
            .values()
            .fold(0u64, |acc, ranges| acc.saturating_add(ranges.span()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Resolution, &TimeRanges)> {
        self.levels.iter().map(|(r, ranges)| (*r, ranges))
    }

    /// A write at one level makes the next coarser level stale.
    pub fn on_update(&mut self, update: &UpdateInfo) {
        if let Some(parent) = update.resolution.coarser() {
            self.mark_as_dirty(parent, &update.time_ranges);
        }
    }

    /// Subscribes `registry` to every write of `storage`.
    ///
    /// Rollup output is itself a storage write, so a rollup at one level marks the level above
    /// it dirty through this same hook.
    pub fn observe<S>(registry: &Arc<Mutex<Self>>, storage: &mut S)
    where
        S: HistoryStorage + ?Sized,
    {
        let registry = Arc::clone(registry);
        storage.observe(Box::new(move |update: &UpdateInfo| {
            if let Ok(mut guard) = registry.lock() {
                guard.on_update(update);
            }
        }));
    }
}
