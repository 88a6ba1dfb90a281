//! Half-open time ranges and normalized range sets.

use crate::error::RollupError;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// `[start, end)`. Zero-length ranges are allowed and mark a single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    start: Timestamp,
    end: Timestamp,
}

impl TimeRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, RollupError> {
        if end < start {
            return Err(RollupError::InvalidTimeRange { start, end });
        }
        Ok(TimeRange { start, end })
    }

    /// Range between two instants given in either order.
    pub fn between(a: Timestamp, b: Timestamp) -> Self {
        TimeRange {
            start: a.min(b),
            end: a.max(b),
        }
    }

    /// Range of a single instant.
    pub fn instant(at: Timestamp) -> Self {
        TimeRange { start: at, end: at }
    }

    #[inline]
    pub fn start(&self) -> Timestamp {
        self.start
    }

    #[inline]
    pub fn end(&self) -> Timestamp {
        self.end
    }

    #[inline]
    pub fn span(&self) -> u64 {
        self.end - self.start
    }

    /// True if `[start, end)` lies entirely inside this range.
    pub fn covers(&self, start: Timestamp, end: Timestamp) -> bool {
        self.start <= start && end <= self.end
    }

    /// Intersection with `[start, end)`, if the two touch at all.
    pub fn clip(&self, start: Timestamp, end: Timestamp) -> Option<TimeRange> {
        let s = self.start.max(start);
        let e = self.end.min(end);
        if s > e {
            return None;
        }
        if s == e && !(self.start == self.end && start <= s && s < end) {
            return None;
        }
        Some(TimeRange { start: s, end: e })
    }
}

/// Sorted, non-overlapping set of [`TimeRange`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRanges {
    ranges: Vec<TimeRange>,
}

impl TimeRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(range: TimeRange) -> Self {
        TimeRanges {
            ranges: vec![range],
        }
    }

    /// Normalizes arbitrary ranges, coalescing neighbours at most `tolerance` apart.
    pub fn from_ranges<I>(ranges: I, tolerance: u64) -> Self
    where
        I: IntoIterator<Item = TimeRange>,
    {
        let mut all: Vec<TimeRange> = ranges.into_iter().collect();
        all.sort_unstable();
        let mut out: Vec<TimeRange> = Vec::with_capacity(all.len());
        for r in all {
            match out.last_mut() {
                Some(last) if r.start <= last.end.saturating_add(tolerance) => {
                    last.end = last.end.max(r.end);
                }
                _ => out.push(r),
            }
        }
        TimeRanges { ranges: out }
    }

    /// Union with `other`, coalescing neighbours at most `tolerance` apart.
    pub fn merge_with(&self, other: &TimeRanges, tolerance: u64) -> TimeRanges {
        Self::from_ranges(
            self.ranges.iter().chain(other.ranges.iter()).copied(),
            tolerance,
        )
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeRange> {
        self.ranges.iter()
    }

    pub fn as_slice(&self) -> &[TimeRange] {
        &self.ranges
    }

    /// Sum of the lengths of all ranges.
    pub fn span(&self) -> u64 {
        self.ranges.iter().map(TimeRange::span).sum()
    }

    pub fn first_start(&self) -> Option<Timestamp> {
        self.ranges.first().map(|r| r.start)
    }

    pub fn last_end(&self) -> Option<Timestamp> {
        self.ranges.last().map(|r| r.end)
    }

    /// The parts of these ranges that fall inside `[start, end)`.
    pub fn fit_within(&self, start: Timestamp, end: Timestamp) -> TimeRanges {
        TimeRanges {
            ranges: self
                .ranges
                .iter()
                .filter_map(|r| r.clip(start, end))
                .collect(),
        }
    }

    /// The parts of these ranges at or after `from`.
    pub fn starting_at(&self, from: Timestamp) -> TimeRanges {
        TimeRanges {
            ranges: self
                .ranges
                .iter()
                .filter(|r| r.end > from || r.start >= from)
                .map(|r| TimeRange {
                    start: r.start.max(from),
                    end: r.end,
                })
                .collect(),
        }
    }

    /// True if some range covers all of `[start, end)`.
    pub fn covers(&self, start: Timestamp, end: Timestamp) -> bool {
        self.ranges.iter().any(|r| r.covers(start, end))
    }
}
