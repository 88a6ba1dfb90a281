use crate::types::Timestamp;
use thiserror::Error;

/// Error type for rollup operations.
///
/// Most variants describe invariant violations upstream of the merge pipeline (parallel
/// arrays of unequal length, unsorted children, a walker driven past its last slot). They are
/// raised immediately and never retried.
#[derive(Error, Debug)]
pub enum RollupError {
    #[error("Size mismatch in {context}: expected {expected}, got {actual}")]
    SizeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Children not sorted: child ending at {previous_end} is followed by child starting at {next_start}")]
    UnsortedChildren {
        previous_end: Timestamp,
        next_start: Timestamp,
    },

    #[error("Child [{child_start}, {child_end}) lies outside target [{target_start}, {target_end})")]
    ChildOutOfRange {
        child_start: Timestamp,
        child_end: Timestamp,
        target_start: Timestamp,
        target_end: Timestamp,
    },

    #[error("Child {child} is not a child of target {target}")]
    ParentMismatch { child: String, target: String },

    #[error("Timestamps not ascending at index {index}: {previous} then {current}")]
    UnsortedTimestamps {
        index: usize,
        previous: Timestamp,
        current: Timestamp,
    },

    #[error("Timestamp walker exhausted after {slots} slots")]
    WalkerExhausted { slots: usize },

    #[error("No children to merge for {0}")]
    NoChildren(String),

    #[error("Invalid time range: start={start}, end={end}")]
    InvalidTimeRange { start: u64, end: u64 },

    #[error("Too many descriptors for range: limit={limit}")]
    TooManyDescriptors { limit: usize },

    #[error("Timestamp {timestamp} is not a bucket start at resolution {resolution}")]
    UnalignedDescriptor {
        timestamp: Timestamp,
        resolution: String,
    },

    #[error("{context} value at {timestamp} collides with an absence marker")]
    ReservedValue {
        context: &'static str,
        timestamp: Timestamp,
    },

    #[error("Timestamp {0} is out of range for the resolution ladder")]
    TimestampOutOfRange(Timestamp),

    #[error("Enum ordinal {0} is out of range (max {max})", max = crate::types::EnumSet::MAX_ORDINALS - 1)]
    InvalidOrdinal(u32),

    #[error("Series layout mismatch: expected {expected:?}, got {actual:?}")]
    SeriesLayoutMismatch {
        expected: crate::types::SeriesCounts,
        actual: crate::types::SeriesCounts,
    },

    #[error("Inconsistent distinct count hint: {0}")]
    InconsistentHint(String),

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Background task error: {0}")]
    BackgroundTaskError(String),

    #[error("Corruption detected: {details}")]
    Corruption {
        details: String,
        timestamp: Option<u64>,
    },
}

// Implement conversion from lock poison errors for convenience
impl<T> From<std::sync::PoisonError<T>> for RollupError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        RollupError::LockError(format!("Mutex/RwLock poisoned: {}", err))
    }
}

impl From<bincode::Error> for RollupError {
    fn from(err: bincode::Error) -> Self {
        RollupError::Serialization(err.to_string())
    }
}

/// Fails with [`RollupError::SizeMismatch`] unless `actual == expected`.
#[inline]
pub(crate) fn ensure_size(
    context: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), RollupError> {
    if expected != actual {
        return Err(RollupError::SizeMismatch {
            context,
            expected,
            actual,
        });
    }
    Ok(())
}
