use crate::descriptor::{BucketDescriptor, Resolution};
use crate::error::RollupError;
use crate::storage::HistoryStorage;
use crate::types::{HistoryBucket, Sample, Timestamp};
use rayon::prelude::*;
use std::ops::Range;
use std::sync::Arc;

/// Upper bound on buckets a single query may touch.
pub const MAX_QUERY_DESCRIPTORS: usize = 100_000;

/// Decimal samples of one series at `resolution` with timestamps in `[start, end)`.
///
/// Buckets overlapping the range are scanned in parallel and the results concatenated in time
/// order. Missing buckets contribute nothing.
///
/// # Errors
/// [`RollupError::InvalidTimeRange`] if `end < start`, [`RollupError::TooManyDescriptors`] if the
/// range spans more than [`MAX_QUERY_DESCRIPTORS`] buckets and [`RollupError::SizeMismatch`] if a
/// bucket has no decimal series at `series`.
pub fn query_decimals<S>(
    storage: &S,
    resolution: Resolution,
    time_range: Range<Timestamp>,
    series: usize,
) -> Result<Vec<(Timestamp, Sample<f64>)>, RollupError>
where
    S: HistoryStorage + ?Sized,
{
    if time_range.end < time_range.start {
        return Err(RollupError::InvalidTimeRange {
            start: time_range.start,
            end: time_range.end,
        });
    }
    if time_range.start == time_range.end {
        return Ok(Vec::new());
    }

    let descriptors = BucketDescriptor::for_range(
        time_range.start,
        time_range.end,
        resolution,
        false,
        MAX_QUERY_DESCRIPTORS,
    )?;
    let buckets = storage.get_many(&descriptors);

    let parts: Vec<Vec<(Timestamp, Sample<f64>)>> = buckets
        .par_iter()
        .map(|bucket| scan_bucket(bucket, &time_range, series))
        .collect::<Result<_, _>>()?;
    Ok(parts.into_iter().flatten().collect())
}

/// Like [`query_decimals`], but picks the finest resolution that yields at most `max_points`
/// samples over the range.
pub fn query_decimals_with_budget<S>(
    storage: &S,
    time_range: Range<Timestamp>,
    series: usize,
    max_points: u64,
) -> Result<(Resolution, Vec<(Timestamp, Sample<f64>)>), RollupError>
where
    S: HistoryStorage + ?Sized,
{
    let span = time_range.end.saturating_sub(time_range.start);
    let resolution = Resolution::for_point_budget(span, max_points);
    let samples = query_decimals(storage, resolution, time_range, series)?;
    Ok((resolution, samples))
}

fn scan_bucket(
    bucket: &Arc<HistoryBucket>,
    time_range: &Range<Timestamp>,
    series: usize,
) -> Result<Vec<(Timestamp, Sample<f64>)>, RollupError> {
    let chunk = &bucket.chunk;
    let decimals = chunk.series_counts().decimals;
    if series >= decimals && !chunk.is_empty() {
        return Err(RollupError::SizeMismatch {
            context: "decimal series index",
            expected: decimals,
            actual: series,
        });
    }

    let timestamps = chunk.timestamps();
    let start_idx = timestamps.partition_point(|&ts| ts < time_range.start);
    let end_idx = timestamps.partition_point(|&ts| ts < time_range.end);
    Ok((start_idx..end_idx)
        .map(|row| (timestamps[row], chunk.decimals_at(row)[series]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryHistoryStorage;
    use crate::types::{ChunkBuilder, HistoryChunk, MeasuredRow, SeriesCounts};

    const MS: u64 = 1_000_000;

    fn chunk(rows: &[(u64, Sample<f64>)]) -> HistoryChunk {
        let mut b = ChunkBuilder::measured(SeriesCounts::new(2, 0, 0));
        for &(ts, v) in rows {
            b.push_measured(
                ts,
                MeasuredRow {
                    decimals: &[v, Sample::Value(-1.0)],
                    enums: &[],
                    reference_ids: &[],
                    reference_statuses: &[],
                },
            )
            .unwrap();
        }
        b.build()
    }

    fn storage() -> InMemoryHistoryStorage {
        let mut storage = InMemoryHistoryStorage::new();
        storage
            .store_chunk(
                &chunk(&[
                    (10 * MS, Sample::Value(1.0)),
                    (90 * MS, Sample::NoValue),
                    (120 * MS, Sample::Value(3.0)),
                    (450 * MS, Sample::Value(4.0)),
                ]),
                Resolution::HundredMillis,
            )
            .unwrap();
        storage
    }

    #[test]
    fn query_spans_buckets_in_order() {
        let storage = storage();
        let result = query_decimals(&storage, Resolution::HundredMillis, 50 * MS..450 * MS, 0).unwrap();
        assert_eq!(
            result,
            vec![(90 * MS, Sample::NoValue), (120 * MS, Sample::Value(3.0))]
        );

        let second = query_decimals(&storage, Resolution::HundredMillis, 0..MS * 1_000, 1).unwrap();
        assert_eq!(second.len(), 4);
        assert!(second.iter().all(|(_, v)| *v == Sample::Value(-1.0)));
    }

    #[test]
    fn empty_and_inverted_ranges() {
        let storage = storage();
        assert!(query_decimals(&storage, Resolution::HundredMillis, 5..5, 0).unwrap().is_empty());
        assert!(matches!(
            query_decimals(&storage, Resolution::HundredMillis, 10..5, 0),
            Err(RollupError::InvalidTimeRange { start: 10, end: 5 })
        ));
        assert!(query_decimals(&storage, Resolution::OneDay, 0..MS, 0).unwrap().is_empty());
    }

    #[test]
    fn unknown_series_is_rejected() {
        let storage = storage();
        assert!(matches!(
            query_decimals(&storage, Resolution::HundredMillis, 0..200 * MS, 2),
            Err(RollupError::SizeMismatch { actual: 2, .. })
        ));
    }

    #[test]
    fn budget_selects_resolution() {
        let storage = storage();
        let (resolution, samples) =
            query_decimals_with_budget(&storage, 0..500 * MS, 0, 1_000).unwrap();
        assert_eq!(resolution, Resolution::HundredMillis);
        assert_eq!(samples.len(), 4);
    }
}
