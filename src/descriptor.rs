//! Resolution ladder and bucket descriptors.
//!
//! Buckets are aligned to the Unix epoch: bucket `i` at a resolution covers
//! `[i * duration, (i + 1) * duration)`. Every level's duration is a whole multiple of the next
//! finer level's, so a parent's children tile it exactly.

use crate::error::RollupError;
use crate::time_range::TimeRange;
use crate::types::{HistoryChunk, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MILLI: u64 = 1_000_000;
const SECOND: u64 = 1_000 * MILLI;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Last timestamp whose coarsest bucket, and so every slot center at every level, fits in a `u64`.
pub const MAX_TIMESTAMP: Timestamp =
    (u64::MAX / Resolution::NinetyYears.duration()) * Resolution::NinetyYears.duration() - 1;

/// One level of the ladder, ordered finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    HundredMillis,
    FiveSeconds,
    OneMinute,
    TenMinutes,
    OneHour,
    SixHours,
    OneDay,
    ThirtyDays,
    OneQuarter,
    OneYear,
    FiveYears,
    ThirtyYears,
    NinetyYears,
}

impl Resolution {
    pub const ALL: [Resolution; 13] = [
        Resolution::HundredMillis,
        Resolution::FiveSeconds,
        Resolution::OneMinute,
        Resolution::TenMinutes,
        Resolution::OneHour,
        Resolution::SixHours,
        Resolution::OneDay,
        Resolution::ThirtyDays,
        Resolution::OneQuarter,
        Resolution::OneYear,
        Resolution::FiveYears,
        Resolution::ThirtyYears,
        Resolution::NinetyYears,
    ];

    /// Spacing between two sample slots, in nanoseconds.
    pub const fn distance(self) -> u64 {
        match self {
            Resolution::HundredMillis => MILLI,
            Resolution::FiveSeconds => 10 * MILLI,
            Resolution::OneMinute => 100 * MILLI,
            Resolution::TenMinutes => SECOND,
            Resolution::OneHour => 10 * SECOND,
            Resolution::SixHours => MINUTE,
            Resolution::OneDay => 10 * MINUTE,
            Resolution::ThirtyDays => HOUR,
            Resolution::OneQuarter => 6 * HOUR,
            Resolution::OneYear => DAY,
            Resolution::FiveYears => 5 * DAY,
            Resolution::ThirtyYears => 30 * DAY,
            Resolution::NinetyYears => 90 * DAY,
        }
    }

    /// Number of sample slots per bucket.
    pub const fn entries_count(self) -> usize {
        match self {
            Resolution::HundredMillis => 100,
            Resolution::FiveSeconds => 500,
            Resolution::OneMinute => 600,
            Resolution::TenMinutes => 600,
            Resolution::OneHour => 360,
            Resolution::SixHours => 360,
            Resolution::OneDay => 144,
            Resolution::ThirtyDays => 720,
            Resolution::OneQuarter => 360,
            Resolution::OneYear => 360,
            Resolution::FiveYears => 360,
            Resolution::ThirtyYears => 360,
            Resolution::NinetyYears => 360,
        }
    }

    /// Length of one bucket, in nanoseconds.
    pub const fn duration(self) -> u64 {
        self.distance() * self.entries_count() as u64
    }

    pub fn finer(self) -> Option<Resolution> {
        let i = self as usize;
        if i == 0 {
            None
        } else {
            Some(Self::ALL[i - 1])
        }
    }

    pub fn coarser(self) -> Option<Resolution> {
        Self::ALL.get(self as usize + 1).copied()
    }

    /// How many slots of the finer level fold into one slot of this level.
    pub fn downsampling_factor(self) -> Option<u64> {
        self.finer().map(|f| self.distance() / f.distance())
    }

    /// Finest level whose sample count over `span` stays within `max_points`.
    pub fn for_point_budget(span: u64, max_points: u64) -> Resolution {
        let budget = max_points.max(1);
        Self::ALL
            .iter()
            .copied()
            .find(|r| span / r.distance() <= budget)
            .unwrap_or(Resolution::NinetyYears)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Resolution::HundredMillis => "hundred_millis",
            Resolution::FiveSeconds => "five_seconds",
            Resolution::OneMinute => "one_minute",
            Resolution::TenMinutes => "ten_minutes",
            Resolution::OneHour => "one_hour",
            Resolution::SixHours => "six_hours",
            Resolution::OneDay => "one_day",
            Resolution::ThirtyDays => "thirty_days",
            Resolution::OneQuarter => "one_quarter",
            Resolution::OneYear => "one_year",
            Resolution::FiveYears => "five_years",
            Resolution::ThirtyYears => "thirty_years",
            Resolution::NinetyYears => "ninety_years",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Resolution {
    type Err = RollupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.name() == normalized)
            .ok_or_else(|| RollupError::ConfigError(format!("unknown resolution {:?}", s)))
    }
}

/// Identifies the bucket `[start, end)` at one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketDescriptor {
    resolution: Resolution,
    index: u64,
}

impl BucketDescriptor {
    pub fn for_index(resolution: Resolution, index: u64) -> Self {
        BucketDescriptor { resolution, index }
    }

    /// The bucket containing `timestamp`.
    pub fn for_timestamp(timestamp: Timestamp, resolution: Resolution) -> Self {
        Self::for_index(resolution, timestamp / resolution.duration())
    }

    /// The bucket starting exactly at `start`.
    pub fn for_start(start: Timestamp, resolution: Resolution) -> Result<Self, RollupError> {
        if start % resolution.duration() != 0 {
            return Err(RollupError::UnalignedDescriptor {
                timestamp: start,
                resolution: resolution.to_string(),
            });
        }
        Ok(Self::for_timestamp(start, resolution))
    }

    /// All buckets overlapping `[start, end)`, in ascending order. With `include_end` the bucket
    /// containing `end` itself is included too.
    ///
    /// # Errors
    /// Returns [`RollupError::TooManyDescriptors`] if more than `max_count` buckets would be
    /// produced and [`RollupError::InvalidTimeRange`] if `end < start`.
    pub fn for_range(
        start: Timestamp,
        end: Timestamp,
        resolution: Resolution,
        include_end: bool,
        max_count: usize,
    ) -> Result<Vec<Self>, RollupError> {
        if end < start {
            return Err(RollupError::InvalidTimeRange { start, end });
        }
        let first = Self::for_timestamp(start, resolution);
        let last = if include_end || end == start {
            Self::for_timestamp(end, resolution)
        } else {
            Self::for_timestamp(end - 1, resolution)
        };
        let count = last.index - first.index + 1;
        if count > max_count as u64 {
            return Err(RollupError::TooManyDescriptors { limit: max_count });
        }
        Ok((first.index..=last.index)
            .map(|i| Self::for_index(resolution, i))
            .collect())
    }

    /// Distinct buckets holding the chunk's timestamps, in ascending order.
    pub fn from_chunk(chunk: &HistoryChunk, resolution: Resolution) -> Vec<Self> {
        let mut out: Vec<Self> = Vec::new();
        for &ts in chunk.timestamps() {
            let d = Self::for_timestamp(ts, resolution);
            if out.last() != Some(&d) {
                out.push(d);
            }
        }
        out
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    #[inline]
    pub fn index(&self) -> u64 {
        self.index
    }

    #[inline]
    pub fn start(&self) -> Timestamp {
        self.index * self.resolution.duration()
    }

    /// Exclusive end. Saturates for the last representable bucket.
    #[inline]
    pub fn end(&self) -> Timestamp {
        self.start().saturating_add(self.resolution.duration())
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange::between(self.start(), self.end())
    }

    #[inline]
    pub fn center(&self) -> Timestamp {
        self.start() + self.resolution.duration() / 2
    }

    #[inline]
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        self.start() <= timestamp && timestamp < self.end()
    }

    pub fn next(&self) -> Self {
        Self::for_index(self.resolution, self.index + 1)
    }

    pub fn previous(&self) -> Option<Self> {
        self.index
            .checked_sub(1)
            .map(|i| Self::for_index(self.resolution, i))
    }

    /// Signed number of buckets from `self` to `other`. Both must share a resolution.
    pub fn distance_to(&self, other: &Self) -> Result<i64, RollupError> {
        if self.resolution != other.resolution {
            return Err(RollupError::ParentMismatch {
                child: other.to_string(),
                target: self.to_string(),
            });
        }
        Ok(other.index as i64 - self.index as i64)
    }

    /// The unique bucket at the next coarser level that contains this one.
    pub fn parent(&self) -> Option<Self> {
        self.resolution
            .coarser()
            .map(|r| Self::for_timestamp(self.start(), r))
    }

    /// Buckets at the next finer level tiling this one, in ascending order.
    pub fn children(&self) -> Vec<Self> {
        let Some(finer) = self.resolution.finer() else {
            return Vec::new();
        };
        let per_parent = self.resolution.duration() / finer.duration();
        let first = self.start() / finer.duration();
        (first..first + per_parent)
            .map(|i| Self::for_index(finer, i))
            .collect()
    }

    /// Ideal slot centers `start + (i + 0.5) * distance`.
    pub fn slot_timestamps(&self) -> Vec<Timestamp> {
        let distance = self.resolution.distance();
        let start = self.start();
        (0..self.resolution.entries_count() as u64)
            .map(|i| start + i * distance + distance / 2)
            .collect()
    }
}

impl fmt::Display for BucketDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}, {})", self.resolution, self.start(), self.end())
    }
}
