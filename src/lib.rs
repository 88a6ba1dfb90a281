#![doc = include_str!("../README.md")]
// Declare modules
pub mod calculator;
pub mod core;
pub mod descriptor;
pub mod dirty;
pub mod error;
pub mod merge;
pub mod ordinal_counter;
pub mod persistence;
pub mod query;
pub mod reference_counter;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod time_range;
pub mod types;
pub mod walker;

/// Configuration options for the rollup core.
pub use crate::core::RollupConfig;
/// Main entry point: ingest raw chunks, query any level, trigger rollups and snapshots.
pub use crate::core::RollupCore;
/// Resolution ladder and bucket identity.
pub use crate::descriptor::{BucketDescriptor, Resolution};
/// Per-level registry of stale time ranges.
pub use crate::dirty::DirtyRangeRegistry;
/// Error type for rollup operations.
pub use crate::error::RollupError;
/// Bucket merge pipeline.
pub use crate::merge::{calculate_down_sampled, merge_chunks};
/// Snapshot manager for restart recovery.
pub use crate::persistence::{SnapshotState, Snapshotter};
/// Job planning and execution.
pub use crate::service::{DownSamplingJob, DownSamplingService, LevelState, PassReport, RefreshRange};
/// Storage collaborator and its in-memory implementation.
pub use crate::storage::{HistoryStorage, InMemoryHistoryStorage, UpdateInfo};
/// Structured event hook for observability.
pub use crate::telemetry::{RollupEvent, RollupEventListener};
/// Half-open time ranges.
pub use crate::time_range::{TimeRange, TimeRanges};
/// Sample, chunk and bucket types.
pub use crate::types::{
    ChunkBuilder, EnumOrdinal, EnumSet, HistoryBucket, HistoryChunk, ReferenceEntryId, Sample,
    SeriesCounts, Timestamp,
};

use std::time::Duration;
/// The default interval between scheduler ticks (500 milliseconds).
pub const DEFAULT_ROLLUP_INTERVAL: Duration = Duration::from_millis(500);
