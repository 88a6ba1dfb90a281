use crate::descriptor::{BucketDescriptor, Resolution};
use crate::error::RollupError;
use crate::time_range::{TimeRange, TimeRanges};
use crate::types::{HistoryBucket, HistoryChunk};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What a write changed: the level it happened at and the time ranges it touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    pub resolution: Resolution,
    pub time_ranges: TimeRanges,
}

impl UpdateInfo {
    pub fn new(resolution: Resolution, time_ranges: TimeRanges) -> Self {
        UpdateInfo {
            resolution,
            time_ranges,
        }
    }

    /// Update covering the whole interval of `descriptor`.
    pub fn for_descriptor(descriptor: &BucketDescriptor) -> Self {
        UpdateInfo::new(
            descriptor.resolution(),
            TimeRanges::single(descriptor.time_range()),
        )
    }
}

/// Callback invoked after every write or delete.
pub type UpdateObserver = Box<dyn Fn(&UpdateInfo) + Send + Sync>;

/// Bucket storage the rollup reads children from and writes aggregates back to.
pub trait HistoryStorage {
    fn get(&self, descriptor: &BucketDescriptor) -> Option<Arc<HistoryBucket>>;

    /// The buckets among `descriptors` that exist, ascending by time.
    fn get_many(&self, descriptors: &[BucketDescriptor]) -> Vec<Arc<HistoryBucket>>;

    /// Replaces the bucket and notifies observers with `update`.
    fn store_without_cache(&mut self, bucket: HistoryBucket, update: UpdateInfo) -> Result<(), RollupError>;

    /// Removes the bucket, if present, and notifies observers.
    fn delete(&mut self, descriptor: &BucketDescriptor) -> Result<(), RollupError>;

    fn observe(&mut self, observer: UpdateObserver);
}

/// In-memory bucket store keyed by descriptor.
#[derive(Default)]
pub struct InMemoryHistoryStorage {
    buckets: BTreeMap<BucketDescriptor, Arc<HistoryBucket>>,
    observers: Vec<UpdateObserver>,
}

impl fmt::Debug for InMemoryHistoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryHistoryStorage")
            .field("buckets", &self.buckets.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl InMemoryHistoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(&self, update: &UpdateInfo) {
        for observer in &self.observers {
            observer(update);
        }
    }

    /// Ingests raw measurements at `resolution`.
    ///
    /// The chunk is split along bucket boundaries; each part is merged into the existing bucket,
    /// with incoming rows replacing stored rows of the same timestamp. Returns the touched
    /// descriptors.
    pub fn store_chunk(
        &mut self,
        chunk: &HistoryChunk,
        resolution: Resolution,
    ) -> Result<Vec<BucketDescriptor>, RollupError> {
        let descriptors = BucketDescriptor::from_chunk(chunk, resolution);
        let timestamps = chunk.timestamps();
        let mut row = 0;
        for descriptor in &descriptors {
            let end = row + timestamps[row..].partition_point(|&ts| ts < descriptor.end());
            let part = chunk.slice(row..end);
            let merged = match self.buckets.get(descriptor) {
                Some(existing) => existing.chunk.merge_newer(&part)?,
                None => part,
            };

            let first = timestamps[row];
            let last = timestamps[end - 1];
            let update = UpdateInfo::new(
                resolution,
                TimeRanges::single(TimeRange::new(first, last.saturating_add(1))?),
            );
            self.store_without_cache(HistoryBucket::new(*descriptor, merged), update)?;
            row = end;
        }
        Ok(descriptors)
    }

    /// Deletes `descriptor` and every earlier bucket at the same resolution.
    pub fn delete_and_before(&mut self, descriptor: &BucketDescriptor) -> Result<usize, RollupError> {
        let first = BucketDescriptor::for_index(descriptor.resolution(), 0);
        let doomed: Vec<BucketDescriptor> = self
            .buckets
            .range(first..=*descriptor)
            .map(|(d, _)| *d)
            .collect();
        for d in &doomed {
            self.delete(d)?;
        }
        Ok(doomed.len())
    }

    /// Earliest stored bucket at `resolution`.
    pub fn earliest(&self, resolution: Resolution) -> Option<BucketDescriptor> {
        self.level(resolution).next().map(|(d, _)| *d)
    }

    /// Latest stored bucket at `resolution`.
    pub fn latest(&self, resolution: Resolution) -> Option<BucketDescriptor> {
        self.level(resolution).next_back().map(|(d, _)| *d)
    }

    /// All buckets at `resolution` in ascending order.
    pub fn level(
        &self,
        resolution: Resolution,
    ) -> impl DoubleEndedIterator<Item = (&BucketDescriptor, &Arc<HistoryBucket>)> {
        let first = BucketDescriptor::for_index(resolution, 0);
        let last = BucketDescriptor::for_index(resolution, u64::MAX);
        self.buckets.range(first..=last)
    }

    /// Every stored bucket, finest level first.
    pub fn buckets(&self) -> impl Iterator<Item = &Arc<HistoryBucket>> {
        self.buckets.values()
    }

    /// Installs buckets without notifying observers. Used when restoring a snapshot.
    pub fn load<I>(&mut self, buckets: I)
    where
        I: IntoIterator<Item = HistoryBucket>,
    {
        for bucket in buckets {
            self.buckets.insert(bucket.descriptor, Arc::new(bucket));
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

impl HistoryStorage for InMemoryHistoryStorage {
    fn get(&self, descriptor: &BucketDescriptor) -> Option<Arc<HistoryBucket>> {
        self.buckets.get(descriptor).cloned()
    }

    fn get_many(&self, descriptors: &[BucketDescriptor]) -> Vec<Arc<HistoryBucket>> {
        let mut found: Vec<Arc<HistoryBucket>> = descriptors
            .iter()
            .filter_map(|d| self.buckets.get(d).cloned())
            .collect();
        found.sort_by_key(|b| b.descriptor);
        found
    }

    fn store_without_cache(&mut self, bucket: HistoryBucket, update: UpdateInfo) -> Result<(), RollupError> {
        if update.resolution != bucket.descriptor.resolution() {
            return Err(RollupError::Corruption {
                details: format!(
                    "update at {} for bucket {}",
                    update.resolution, bucket.descriptor
                ),
                timestamp: Some(bucket.descriptor.start()),
            });
        }
        self.buckets.insert(bucket.descriptor, Arc::new(bucket));
        self.notify(&update);
        Ok(())
    }

    fn delete(&mut self, descriptor: &BucketDescriptor) -> Result<(), RollupError> {
        if self.buckets.remove(descriptor).is_some() {
            self.notify(&UpdateInfo::for_descriptor(descriptor));
        }
        Ok(())
    }

    fn observe(&mut self, observer: UpdateObserver) {
        self.observers.push(observer);
    }
}
