//! Sample, bitset and chunk types shared by the aggregation pipeline.

use crate::descriptor::BucketDescriptor;
use crate::error::{ensure_size, RollupError};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Timestamp type (nanoseconds since epoch).
pub type Timestamp = u64;

/// Value of one series position at one timestamp.
///
/// `Pending` means nothing has been measured yet; `NoValue` means a measurement happened and
/// explicitly produced no data. The two are distinct from each other and from any real value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sample<T> {
    Pending,
    NoValue,
    Value(T),
}

impl<T> Sample<T> {
    /// Applies the aggregation precedence: any real contribution wins, then `NoValue`, then
    /// `Pending`. `value` is only evaluated when `has_value` is true.
    #[inline]
    pub fn from_state(has_value: bool, saw_no_value: bool, value: impl FnOnce() -> T) -> Self {
        if has_value {
            Sample::Value(value())
        } else if saw_no_value {
            Sample::NoValue
        } else {
            Sample::Pending
        }
    }

    #[inline]
    pub fn is_value(&self) -> bool {
        matches!(self, Sample::Value(_))
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Sample::Pending)
    }

    #[inline]
    pub fn is_no_value(&self) -> bool {
        matches!(self, Sample::NoValue)
    }

    /// Returns the contained value, discarding the absence kind.
    #[inline]
    pub fn value(self) -> Option<T> {
        match self {
            Sample::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sample<U> {
        match self {
            Sample::Pending => Sample::Pending,
            Sample::NoValue => Sample::NoValue,
            Sample::Value(v) => Sample::Value(f(v)),
        }
    }
}

/// Raw sentinel encoding used by sentinel-based chunk storages.
///
/// Every sample type maps `Pending` and `NoValue` onto reserved raw values so columns can be
/// exchanged with storages that keep plain numbers.
pub trait SentinelEncoding: Copy + Sized {
    type Raw: Copy;

    fn encode(sample: Sample<Self>) -> Self::Raw;

    fn decode(raw: Self::Raw) -> Result<Sample<Self>, RollupError>;
}

impl<T: SentinelEncoding> Sample<T> {
    #[inline]
    pub fn to_raw(self) -> T::Raw {
        T::encode(self)
    }

    #[inline]
    pub fn from_raw(raw: T::Raw) -> Result<Self, RollupError> {
        T::decode(raw)
    }
}

/// Decimal raw encoding of `NoValue`.
pub const DECIMAL_NO_VALUE: f64 = f64::NAN;
/// Decimal raw encoding of `Pending`.
pub const DECIMAL_PENDING: f64 = f64::MAX;

impl SentinelEncoding for f64 {
    type Raw = f64;

    fn encode(sample: Sample<Self>) -> f64 {
        match sample {
            Sample::Pending => DECIMAL_PENDING,
            Sample::NoValue => DECIMAL_NO_VALUE,
            Sample::Value(v) => v,
        }
    }

    fn decode(raw: f64) -> Result<Sample<Self>, RollupError> {
        Ok(if raw.is_nan() {
            Sample::NoValue
        } else if raw == DECIMAL_PENDING {
            Sample::Pending
        } else {
            Sample::Value(raw)
        })
    }
}

/// Raw encoding of `Pending` for ordinals, reference IDs and distinct counts.
pub const U32_PENDING: u32 = u32::MAX;
/// Raw encoding of `NoValue` for ordinals, reference IDs and distinct counts.
pub const U32_NO_VALUE: u32 = u32::MAX - 1;

impl SentinelEncoding for u32 {
    type Raw = u32;

    fn encode(sample: Sample<Self>) -> u32 {
        match sample {
            Sample::Pending => U32_PENDING,
            Sample::NoValue => U32_NO_VALUE,
            Sample::Value(v) => v,
        }
    }

    fn decode(raw: u32) -> Result<Sample<Self>, RollupError> {
        Ok(match raw {
            U32_PENDING => Sample::Pending,
            U32_NO_VALUE => Sample::NoValue,
            v => Sample::Value(v),
        })
    }
}

/// Bitset over at most [`EnumSet::MAX_ORDINALS`] simultaneously active ordinals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EnumSet(u32);

impl EnumSet {
    pub const MAX_ORDINALS: u8 = 29;
    const MASK: u32 = (1 << Self::MAX_ORDINALS) - 1;
    /// Raw encoding of `Pending`.
    pub const RAW_PENDING: u32 = 1 << 29;
    /// Raw encoding of `NoValue`.
    pub const RAW_NO_VALUE: u32 = 1 << 30;

    pub const fn empty() -> Self {
        EnumSet(0)
    }

    pub fn from_bits(bits: u32) -> Result<Self, RollupError> {
        if bits & !Self::MASK != 0 {
            return Err(RollupError::Corruption {
                details: format!("enum set 0x{:08x} has bits beyond ordinal 28", bits),
                timestamp: None,
            });
        }
        Ok(EnumSet(bits))
    }

    pub fn from_ordinals<I>(ordinals: I) -> Result<Self, RollupError>
    where
        I: IntoIterator<Item = u8>,
    {
        let mut set = EnumSet::empty();
        for ordinal in ordinals {
            set = set.with(EnumOrdinal::new(ordinal)?);
        }
        Ok(set)
    }

    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn contains(self, ordinal: EnumOrdinal) -> bool {
        self.0 & (1 << ordinal.0) != 0
    }

    #[inline]
    pub fn with(self, ordinal: EnumOrdinal) -> Self {
        EnumSet(self.0 | (1 << ordinal.0))
    }

    #[inline]
    pub fn union(self, other: EnumSet) -> Self {
        EnumSet(self.0 | other.0)
    }

    /// Set ordinals in ascending order.
    pub fn ordinals(self) -> impl Iterator<Item = EnumOrdinal> {
        (0..Self::MAX_ORDINALS)
            .filter(move |&o| self.0 & (1 << o) != 0)
            .map(EnumOrdinal)
    }
}

impl SentinelEncoding for EnumSet {
    type Raw = u32;

    fn encode(sample: Sample<Self>) -> u32 {
        match sample {
            Sample::Pending => EnumSet::RAW_PENDING,
            Sample::NoValue => EnumSet::RAW_NO_VALUE,
            Sample::Value(set) => set.0,
        }
    }

    fn decode(raw: u32) -> Result<Sample<Self>, RollupError> {
        match raw {
            EnumSet::RAW_PENDING => Ok(Sample::Pending),
            EnumSet::RAW_NO_VALUE => Ok(Sample::NoValue),
            bits => EnumSet::from_bits(bits).map(Sample::Value),
        }
    }
}

/// Position of one flag inside an [`EnumSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnumOrdinal(u8);

impl EnumOrdinal {
    pub fn new(ordinal: u8) -> Result<Self, RollupError> {
        if ordinal >= EnumSet::MAX_ORDINALS {
            return Err(RollupError::InvalidOrdinal(ordinal as u32));
        }
        Ok(EnumOrdinal(ordinal))
    }

    #[inline]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl SentinelEncoding for EnumOrdinal {
    type Raw = u32;

    fn encode(sample: Sample<Self>) -> u32 {
        u32::encode(sample.map(|o| o.0 as u32))
    }

    fn decode(raw: u32) -> Result<Sample<Self>, RollupError> {
        match u32::decode(raw)? {
            Sample::Value(v) if v < EnumSet::MAX_ORDINALS as u32 => Ok(Sample::Value(EnumOrdinal(v as u8))),
            Sample::Value(v) => Err(RollupError::InvalidOrdinal(v)),
            Sample::Pending => Ok(Sample::Pending),
            Sample::NoValue => Ok(Sample::NoValue),
        }
    }
}

/// Identifier of an externally defined reference entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReferenceEntryId(pub u32);

impl SentinelEncoding for ReferenceEntryId {
    type Raw = u32;

    fn encode(sample: Sample<Self>) -> u32 {
        u32::encode(sample.map(|id| id.0))
    }

    fn decode(raw: u32) -> Result<Sample<Self>, RollupError> {
        Ok(u32::decode(raw)?.map(ReferenceEntryId))
    }
}

/// Status flags attached to a reference entry sample.
pub type ReferenceEntryStatus = EnumSet;

/// Smaller of two decimal samples; absence markers never win over a real value.
pub fn min_history_aware(a: Sample<f64>, b: Sample<f64>) -> Sample<f64> {
    combine_history_aware(a, b, f64::min)
}

/// Larger of two decimal samples; absence markers never win over a real value.
pub fn max_history_aware(a: Sample<f64>, b: Sample<f64>) -> Sample<f64> {
    combine_history_aware(a, b, f64::max)
}

fn combine_history_aware(a: Sample<f64>, b: Sample<f64>, pick: fn(f64, f64) -> f64) -> Sample<f64> {
    match (a, b) {
        (Sample::Value(x), Sample::Value(y)) => Sample::Value(pick(x, y)),
        (Sample::Value(x), _) | (_, Sample::Value(x)) => Sample::Value(x),
        (Sample::NoValue, _) | (_, Sample::NoValue) => Sample::NoValue,
        _ => Sample::Pending,
    }
}

/// Whether a chunk holds raw measurements or aggregates produced by the merge pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordingType {
    Measured,
    Calculated,
}

/// Number of series per kind. Every row of a chunk carries this many values per column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SeriesCounts {
    pub decimals: usize,
    pub enums: usize,
    pub references: usize,
}

impl SeriesCounts {
    pub fn new(decimals: usize, enums: usize, references: usize) -> Self {
        SeriesCounts {
            decimals,
            enums,
            references,
        }
    }
}

/// One row of aggregated values, as pushed into a calculated chunk.
#[derive(Debug, Clone, Copy)]
pub struct CalculatedRow<'a> {
    pub decimals: &'a [Sample<f64>],
    pub decimal_mins: &'a [Sample<f64>],
    pub decimal_maxs: &'a [Sample<f64>],
    pub enums: &'a [Sample<EnumSet>],
    pub enum_most_time: &'a [Sample<EnumOrdinal>],
    pub reference_ids: &'a [Sample<ReferenceEntryId>],
    pub reference_counts: &'a [Sample<u32>],
    pub reference_statuses: &'a [Sample<ReferenceEntryStatus>],
}

/// One row of raw measurements.
#[derive(Debug, Clone, Copy)]
pub struct MeasuredRow<'a> {
    pub decimals: &'a [Sample<f64>],
    pub enums: &'a [Sample<EnumSet>],
    pub reference_ids: &'a [Sample<ReferenceEntryId>],
    pub reference_statuses: &'a [Sample<ReferenceEntryStatus>],
}

/// Immutable columnar storage of samples.
///
/// Columns are row-major: row `i` of a column with `k` series occupies `[i * k, (i + 1) * k)`.
/// The optional columns are present exactly when the chunk is [`RecordingType::Calculated`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryChunk {
    recording_type: RecordingType,
    counts: SeriesCounts,
    timestamps: Vec<Timestamp>,
    decimals: Vec<Sample<f64>>,
    decimal_mins: Option<Vec<Sample<f64>>>,
    decimal_maxs: Option<Vec<Sample<f64>>>,
    enums: Vec<Sample<EnumSet>>,
    enum_most_time: Option<Vec<Sample<EnumOrdinal>>>,
    reference_ids: Vec<Sample<ReferenceEntryId>>,
    reference_counts: Option<Vec<Sample<u32>>>,
    reference_statuses: Vec<Sample<ReferenceEntryStatus>>,
}

#[inline]
fn row_of<T>(column: &[T], width: usize, row: usize) -> &[T] {
    &column[row * width..(row + 1) * width]
}

impl HistoryChunk {
    #[inline]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    #[inline]
    pub fn recording_type(&self) -> RecordingType {
        self.recording_type
    }

    #[inline]
    pub fn series_counts(&self) -> SeriesCounts {
        self.counts
    }

    #[inline]
    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.last().copied()
    }

    pub fn decimals_at(&self, row: usize) -> &[Sample<f64>] {
        row_of(&self.decimals, self.counts.decimals, row)
    }

    pub fn decimal_mins_at(&self, row: usize) -> Option<&[Sample<f64>]> {
        self.decimal_mins
            .as_deref()
            .map(|c| row_of(c, self.counts.decimals, row))
    }

    pub fn decimal_maxs_at(&self, row: usize) -> Option<&[Sample<f64>]> {
        self.decimal_maxs
            .as_deref()
            .map(|c| row_of(c, self.counts.decimals, row))
    }

    pub fn enums_at(&self, row: usize) -> &[Sample<EnumSet>] {
        row_of(&self.enums, self.counts.enums, row)
    }

    pub fn enum_most_time_at(&self, row: usize) -> Option<&[Sample<EnumOrdinal>]> {
        self.enum_most_time
            .as_deref()
            .map(|c| row_of(c, self.counts.enums, row))
    }

    pub fn reference_ids_at(&self, row: usize) -> &[Sample<ReferenceEntryId>] {
        row_of(&self.reference_ids, self.counts.references, row)
    }

    pub fn reference_counts_at(&self, row: usize) -> Option<&[Sample<u32>]> {
        self.reference_counts
            .as_deref()
            .map(|c| row_of(c, self.counts.references, row))
    }

    pub fn reference_statuses_at(&self, row: usize) -> &[Sample<ReferenceEntryStatus>] {
        row_of(&self.reference_statuses, self.counts.references, row)
    }

    /// Decimal series `series` across all rows, in raw sentinel encoding.
    pub fn decimal_series_raw(&self, series: usize) -> Vec<f64> {
        (0..self.len())
            .map(|row| self.decimals_at(row)[series].to_raw())
            .collect()
    }

    /// Copies the rows in `rows` into a new chunk of the same shape.
    pub fn slice(&self, rows: Range<usize>) -> HistoryChunk {
        let d = self.counts.decimals;
        let e = self.counts.enums;
        let r = self.counts.references;
        let cut = |width: usize| rows.start * width..rows.end * width;
        HistoryChunk {
            recording_type: self.recording_type,
            counts: self.counts,
            timestamps: self.timestamps[rows.clone()].to_vec(),
            decimals: self.decimals[cut(d)].to_vec(),
            decimal_mins: self.decimal_mins.as_ref().map(|c| c[cut(d)].to_vec()),
            decimal_maxs: self.decimal_maxs.as_ref().map(|c| c[cut(d)].to_vec()),
            enums: self.enums[cut(e)].to_vec(),
            enum_most_time: self.enum_most_time.as_ref().map(|c| c[cut(e)].to_vec()),
            reference_ids: self.reference_ids[cut(r)].to_vec(),
            reference_counts: self.reference_counts.as_ref().map(|c| c[cut(r)].to_vec()),
            reference_statuses: self.reference_statuses[cut(r)].to_vec(),
        }
    }

    /// Sorted union of `self` and `newer`. Rows of `newer` replace rows of `self` with the
    /// same timestamp.
    pub fn merge_newer(&self, newer: &HistoryChunk) -> Result<HistoryChunk, RollupError> {
        if self.counts != newer.counts {
            return Err(RollupError::SeriesLayoutMismatch {
                expected: self.counts,
                actual: newer.counts,
            });
        }
        if self.recording_type != newer.recording_type {
            return Err(RollupError::Corruption {
                details: format!(
                    "cannot merge {:?} rows into a {:?} chunk",
                    newer.recording_type, self.recording_type
                ),
                timestamp: newer.first_timestamp(),
            });
        }

        let mut out = ChunkBuilder::new(self.recording_type, self.counts);
        let (mut i, mut j) = (0, 0);
        while i < self.len() || j < newer.len() {
            let take_newer = match (self.timestamps.get(i), newer.timestamps.get(j)) {
                (Some(a), Some(b)) if a == b => {
                    i += 1;
                    true
                }
                (Some(a), Some(b)) => b < a,
                (None, Some(_)) => true,
                _ => false,
            };
            if take_newer {
                out.push_row_from(newer, j)?;
                j += 1;
            } else {
                out.push_row_from(self, i)?;
                i += 1;
            }
        }
        Ok(out.build())
    }
}

/// Accumulates rows for a [`HistoryChunk`], rejecting rows of the wrong shape.
#[derive(Debug)]
pub struct ChunkBuilder {
    chunk: HistoryChunk,
}

impl ChunkBuilder {
    pub fn new(recording_type: RecordingType, counts: SeriesCounts) -> Self {
        let calculated = recording_type == RecordingType::Calculated;
        ChunkBuilder {
            chunk: HistoryChunk {
                recording_type,
                counts,
                timestamps: Vec::new(),
                decimals: Vec::new(),
                decimal_mins: calculated.then(Vec::new),
                decimal_maxs: calculated.then(Vec::new),
                enums: Vec::new(),
                enum_most_time: calculated.then(Vec::new),
                reference_ids: Vec::new(),
                reference_counts: calculated.then(Vec::new),
                reference_statuses: Vec::new(),
            },
        }
    }

    pub fn measured(counts: SeriesCounts) -> Self {
        Self::new(RecordingType::Measured, counts)
    }

    pub fn calculated(counts: SeriesCounts) -> Self {
        Self::new(RecordingType::Calculated, counts)
    }

    pub fn len(&self) -> usize {
        self.chunk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }

    fn push_timestamp(&mut self, timestamp: Timestamp) -> Result<(), RollupError> {
        if timestamp > crate::descriptor::MAX_TIMESTAMP {
            return Err(RollupError::TimestampOutOfRange(timestamp));
        }
        if let Some(&previous) = self.chunk.timestamps.last() {
            if timestamp <= previous {
                return Err(RollupError::UnsortedTimestamps {
                    index: self.chunk.timestamps.len(),
                    previous,
                    current: timestamp,
                });
            }
        }
        self.chunk.timestamps.push(timestamp);
        Ok(())
    }

    pub fn push_measured(&mut self, timestamp: Timestamp, row: MeasuredRow<'_>) -> Result<(), RollupError> {
        if self.chunk.recording_type != RecordingType::Measured {
            return Err(RollupError::Corruption {
                details: "measured row pushed into a calculated chunk".to_string(),
                timestamp: Some(timestamp),
            });
        }
        let c = self.chunk.counts;
        ensure_size("decimals", c.decimals, row.decimals.len())?;
        ensure_size("enums", c.enums, row.enums.len())?;
        ensure_size("reference ids", c.references, row.reference_ids.len())?;
        ensure_size("reference statuses", c.references, row.reference_statuses.len())?;
        ensure_encodable("decimal", timestamp, row.decimals)?;
        ensure_encodable("reference id", timestamp, row.reference_ids)?;
        self.push_timestamp(timestamp)?;

        self.chunk.decimals.extend_from_slice(row.decimals);
        self.chunk.enums.extend_from_slice(row.enums);
        self.chunk.reference_ids.extend_from_slice(row.reference_ids);
        self.chunk.reference_statuses.extend_from_slice(row.reference_statuses);
        Ok(())
    }

    pub fn push_calculated(&mut self, timestamp: Timestamp, row: CalculatedRow<'_>) -> Result<(), RollupError> {
        let c = self.chunk.counts;
        ensure_size("decimals", c.decimals, row.decimals.len())?;
        ensure_size("decimal mins", c.decimals, row.decimal_mins.len())?;
        ensure_size("decimal maxs", c.decimals, row.decimal_maxs.len())?;
        ensure_size("enums", c.enums, row.enums.len())?;
        ensure_size("enum most-time ordinals", c.enums, row.enum_most_time.len())?;
        ensure_size("reference ids", c.references, row.reference_ids.len())?;
        ensure_size("reference counts", c.references, row.reference_counts.len())?;
        ensure_size("reference statuses", c.references, row.reference_statuses.len())?;

        if self.chunk.recording_type != RecordingType::Calculated {
            return Err(RollupError::Corruption {
                details: "calculated row pushed into a measured chunk".to_string(),
                timestamp: Some(timestamp),
            });
        }
        ensure_encodable("decimal", timestamp, row.decimals)?;
        ensure_encodable("decimal min", timestamp, row.decimal_mins)?;
        ensure_encodable("decimal max", timestamp, row.decimal_maxs)?;
        ensure_encodable("reference id", timestamp, row.reference_ids)?;
        ensure_encodable("reference count", timestamp, row.reference_counts)?;
        self.push_timestamp(timestamp)?;

        let chunk = &mut self.chunk;
        let optional = (
            chunk.decimal_mins.as_mut(),
            chunk.decimal_maxs.as_mut(),
            chunk.enum_most_time.as_mut(),
            chunk.reference_counts.as_mut(),
        );
        if let (Some(mins), Some(maxs), Some(ordinals), Some(counts)) = optional {
            mins.extend_from_slice(row.decimal_mins);
            maxs.extend_from_slice(row.decimal_maxs);
            ordinals.extend_from_slice(row.enum_most_time);
            counts.extend_from_slice(row.reference_counts);
        }
        chunk.decimals.extend_from_slice(row.decimals);
        chunk.enums.extend_from_slice(row.enums);
        chunk.reference_ids.extend_from_slice(row.reference_ids);
        chunk.reference_statuses.extend_from_slice(row.reference_statuses);
        Ok(())
    }

    /// Copies row `row` of `source`, which must have this builder's shape.
    fn push_row_from(&mut self, source: &HistoryChunk, row: usize) -> Result<(), RollupError> {
        let timestamp = source.timestamps[row];
        match source.recording_type {
            RecordingType::Measured => self.push_measured(
                timestamp,
                MeasuredRow {
                    decimals: source.decimals_at(row),
                    enums: source.enums_at(row),
                    reference_ids: source.reference_ids_at(row),
                    reference_statuses: source.reference_statuses_at(row),
                },
            ),
            RecordingType::Calculated => {
                let missing = || RollupError::Corruption {
                    details: "calculated chunk without aggregate columns".to_string(),
                    timestamp: Some(timestamp),
                };
                self.push_calculated(
                    timestamp,
                    CalculatedRow {
                        decimals: source.decimals_at(row),
                        decimal_mins: source.decimal_mins_at(row).ok_or_else(missing)?,
                        decimal_maxs: source.decimal_maxs_at(row).ok_or_else(missing)?,
                        enums: source.enums_at(row),
                        enum_most_time: source.enum_most_time_at(row).ok_or_else(missing)?,
                        reference_ids: source.reference_ids_at(row),
                        reference_counts: source.reference_counts_at(row).ok_or_else(missing)?,
                        reference_statuses: source.reference_statuses_at(row),
                    },
                )
            }
        }
    }

    pub fn build(self) -> HistoryChunk {
        self.chunk
    }
}

/// Rejects values that would read back as `Pending` or `NoValue` once sentinel-encoded, such as a
/// NaN decimal.
fn ensure_encodable<T: SentinelEncoding>(
    context: &'static str,
    timestamp: Timestamp,
    samples: &[Sample<T>],
) -> Result<(), RollupError> {
    let collides = samples
        .iter()
        .any(|&s| s.is_value() && !matches!(Sample::<T>::from_raw(s.to_raw()), Ok(Sample::Value(_))));
    if collides {
        return Err(RollupError::ReservedValue { context, timestamp });
    }
    Ok(())
}

/// A chunk paired with the descriptor of the interval it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryBucket {
    pub descriptor: BucketDescriptor,
    pub chunk: HistoryChunk,
}

impl HistoryBucket {
    pub fn new(descriptor: BucketDescriptor, chunk: HistoryChunk) -> Self {
        HistoryBucket { descriptor, chunk }
    }
}
