//! Bucket merge pipeline: folds sorted child chunks into one aggregated target chunk.

use crate::calculator::DownSamplingCalculator;
use crate::descriptor::BucketDescriptor;
use crate::error::RollupError;
use crate::types::{
    CalculatedRow, ChunkBuilder, HistoryBucket, HistoryChunk, RecordingType, SeriesCounts,
};
use crate::walker::TargetTimestampsWalker;
use std::sync::Arc;

/// Computes the bucket for `target` from its existing children.
///
/// Children must be ordered by time, must not overlap, and must all be children of `target`.
/// The output holds one row per slot of `target`; slots that received no sample are `Pending`.
///
/// # Errors
/// Fails fast on empty input, misordered or foreign children, rows outside the target, and
/// children with differing series layouts.
pub fn calculate_down_sampled(
    target: &BucketDescriptor,
    children: &[Arc<HistoryBucket>],
) -> Result<HistoryBucket, RollupError> {
    if children.is_empty() {
        return Err(RollupError::NoChildren(target.to_string()));
    }

    let mut previous: Option<&BucketDescriptor> = None;
    for child in children {
        let d = &child.descriptor;
        if d.parent().as_ref() != Some(target) {
            return Err(RollupError::ParentMismatch {
                child: d.to_string(),
                target: target.to_string(),
            });
        }
        if d.start() < target.start() || d.end() > target.end() {
            return Err(RollupError::ChildOutOfRange {
                child_start: d.start(),
                child_end: d.end(),
                target_start: target.start(),
                target_end: target.end(),
            });
        }
        if let (Some(first), Some(last)) = (child.chunk.first_timestamp(), child.chunk.last_timestamp()) {
            if first < d.start() || last >= d.end() {
                return Err(RollupError::ChildOutOfRange {
                    child_start: first,
                    child_end: last,
                    target_start: d.start(),
                    target_end: d.end(),
                });
            }
        }
        if let Some(prev) = previous {
            if prev.end() > d.start() {
                return Err(RollupError::UnsortedChildren {
                    previous_end: prev.end(),
                    next_start: d.start(),
                });
            }
        }
        previous = Some(d);
    }

    let chunks: Vec<&HistoryChunk> = children.iter().map(|c| &c.chunk).collect();
    let chunk = merge_chunks(target, &chunks)?;
    Ok(HistoryBucket::new(*target, chunk))
}

/// Chunk-level merge used by [`calculate_down_sampled`].
///
/// The series layout is taken from the first chunk. Samples are consumed strictly in chunk order
/// then row order, which keeps the floating-point mean bit-identical across runs.
pub fn merge_chunks(
    target: &BucketDescriptor,
    chunks: &[&HistoryChunk],
) -> Result<HistoryChunk, RollupError> {
    let first = chunks
        .first()
        .ok_or_else(|| RollupError::NoChildren(target.to_string()))?;
    let counts = first.series_counts();
    validate_rows(target, chunks, counts)?;

    let mut walker = TargetTimestampsWalker::new(target);
    let mut calculator = DownSamplingCalculator::new(counts);
    let mut out = ChunkBuilder::calculated(counts);

    for chunk in chunks {
        for (row, &timestamp) in chunk.timestamps().iter().enumerate() {
            while timestamp >= walker.slot_end() {
                flush(&mut out, &walker, &mut calculator)?;
                walker.next()?;
            }
            feed(&mut calculator, chunk, row)?;
        }
    }
    flush(&mut out, &walker, &mut calculator)?;

    // Slots after the last sample never saw data.
    while !walker.is_last() {
        walker.next()?;
        flush(&mut out, &walker, &mut calculator)?;
    }
    Ok(out.build())
}

fn validate_rows(
    target: &BucketDescriptor,
    chunks: &[&HistoryChunk],
    counts: SeriesCounts,
) -> Result<(), RollupError> {
    let mut last: Option<u64> = None;
    for chunk in chunks {
        if chunk.series_counts() != counts {
            return Err(RollupError::SeriesLayoutMismatch {
                expected: counts,
                actual: chunk.series_counts(),
            });
        }
        let (Some(first_ts), Some(last_ts)) = (chunk.first_timestamp(), chunk.last_timestamp()) else {
            continue;
        };
        if first_ts < target.start() || last_ts >= target.end() {
            return Err(RollupError::ChildOutOfRange {
                child_start: first_ts,
                child_end: last_ts,
                target_start: target.start(),
                target_end: target.end(),
            });
        }
        if let Some(previous) = last {
            if first_ts <= previous {
                return Err(RollupError::UnsortedChildren {
                    previous_end: previous,
                    next_start: first_ts,
                });
            }
        }
        last = Some(last_ts);
    }
    Ok(())
}

fn feed(
    calculator: &mut DownSamplingCalculator,
    chunk: &HistoryChunk,
    row: usize,
) -> Result<(), RollupError> {
    match chunk.recording_type() {
        RecordingType::Measured => {
            calculator.add_decimals_sample(chunk.decimals_at(row), None, None)?;
            calculator.add_enum_sample(chunk.enums_at(row))?;
            calculator.add_reference_entry_sample(
                chunk.reference_ids_at(row),
                None,
                chunk.reference_statuses_at(row),
            )?;
        }
        RecordingType::Calculated => {
            calculator.add_decimals_sample(
                chunk.decimals_at(row),
                chunk.decimal_mins_at(row),
                chunk.decimal_maxs_at(row),
            )?;
            calculator.add_enum_sample(chunk.enums_at(row))?;
            calculator.add_reference_entry_sample(
                chunk.reference_ids_at(row),
                chunk.reference_counts_at(row),
                chunk.reference_statuses_at(row),
            )?;
        }
    }
    Ok(())
}

/// Writes the current slot's aggregate and resets the calculator.
fn flush(
    out: &mut ChunkBuilder,
    walker: &TargetTimestampsWalker,
    calculator: &mut DownSamplingCalculator,
) -> Result<(), RollupError> {
    let decimals = calculator.average_values();
    let decimal_mins = calculator.min_values();
    let decimal_maxs = calculator.max_values();
    let enums = calculator.enum_union_values();
    let enum_most_time = calculator.enum_most_time_ordinal_values();
    let reference_ids = calculator.reference_entry_ids();
    let reference_counts = calculator.reference_entry_different_ids_count();
    let reference_statuses = calculator.reference_entry_statuses();
    out.push_calculated(
        walker.slot_center(),
        CalculatedRow {
            decimals: &decimals,
            decimal_mins: &decimal_mins,
            decimal_maxs: &decimal_maxs,
            enums: &enums,
            enum_most_time: &enum_most_time,
            reference_ids: &reference_ids,
            reference_counts: &reference_counts,
            reference_statuses: &reference_statuses,
        },
    )?;
    calculator.reset();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Resolution;
    use crate::types::{EnumOrdinal, EnumSet, MeasuredRow, ReferenceEntryId, Sample};

    const MS: u64 = 1_000_000;

    fn measured_bucket(descriptor: BucketDescriptor, rows: &[(u64, f64)]) -> Arc<HistoryBucket> {
        let mut b = ChunkBuilder::measured(SeriesCounts::new(1, 1, 1));
        for &(ts, v) in rows {
            b.push_measured(
                ts,
                MeasuredRow {
                    decimals: &[Sample::Value(v)],
                    enums: &[Sample::Value(EnumSet::from_ordinals([(v as u8) % 3]).unwrap())],
                    reference_ids: &[Sample::Value(ReferenceEntryId(v as u32))],
                    reference_statuses: &[Sample::Pending],
                },
            )
            .unwrap();
        }
        Arc::new(HistoryBucket::new(descriptor, b.build()))
    }

    fn target() -> BucketDescriptor {
        BucketDescriptor::for_index(Resolution::FiveSeconds, 0)
    }

    fn child(i: u64) -> BucketDescriptor {
        BucketDescriptor::for_index(Resolution::HundredMillis, i)
    }

    #[test]
    fn averages_samples_into_slots() {
        // Target slots are 10ms wide; 2ms, 4ms and 6ms all land in slot 0.
        let children = vec![measured_bucket(child(0), &[(2 * MS, 2.0), (4 * MS, 4.0), (6 * MS, 6.0)])];
        let bucket = calculate_down_sampled(&target(), &children).unwrap();
        let chunk = &bucket.chunk;

        assert_eq!(chunk.len(), Resolution::FiveSeconds.entries_count());
        assert_eq!(chunk.recording_type(), RecordingType::Calculated);
        assert_eq!(chunk.timestamps()[0], 5 * MS);
        assert_eq!(chunk.decimals_at(0), &[Sample::Value(4.0)]);
        assert_eq!(chunk.decimal_mins_at(0).unwrap(), &[Sample::Value(2.0)]);
        assert_eq!(chunk.decimal_maxs_at(0).unwrap(), &[Sample::Value(6.0)]);
        assert_eq!(chunk.decimals_at(1), &[Sample::Pending]);
        assert_eq!(chunk.reference_counts_at(0).unwrap(), &[Sample::Value(3)]);
    }

    #[test]
    fn skipped_slots_flush_as_pending() {
        let children = vec![measured_bucket(child(0), &[(5 * MS, 1.0), (35 * MS, 3.0)])];
        let chunk = calculate_down_sampled(&target(), &children).unwrap().chunk;
        assert_eq!(chunk.decimals_at(0), &[Sample::Value(1.0)]);
        assert_eq!(chunk.decimals_at(1), &[Sample::Pending]);
        assert_eq!(chunk.decimals_at(2), &[Sample::Pending]);
        assert_eq!(chunk.decimals_at(3), &[Sample::Value(3.0)]);
        assert_eq!(chunk.enums_at(1), &[Sample::Pending]);
        assert_eq!(chunk.enum_most_time_at(2).unwrap(), &[Sample::Pending]);
    }

    #[test]
    fn concatenates_children_in_order() {
        let children = vec![
            measured_bucket(child(0), &[(95 * MS, 1.0)]),
            measured_bucket(child(1), &[(100 * MS, 3.0), (105 * MS, 5.0)]),
        ];
        let chunk = calculate_down_sampled(&target(), &children).unwrap().chunk;
        assert_eq!(chunk.decimals_at(9), &[Sample::Value(1.0)]);
        assert_eq!(chunk.decimals_at(10), &[Sample::Value(4.0)]);
    }

    #[test]
    fn merging_twice_is_byte_identical() {
        let rows: Vec<(u64, f64)> = (0..90).map(|i| (i * MS + 1, (i as f64) * 0.1 + 0.3)).collect();
        let children = vec![measured_bucket(child(0), &rows), measured_bucket(child(3), &rows.iter().map(|&(t, v)| (t + 300 * MS, v * 7.0)).collect::<Vec<_>>())];
        let a = bincode::serialize(&calculate_down_sampled(&target(), &children).unwrap()).unwrap();
        let b = bincode::serialize(&calculate_down_sampled(&target(), &children).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_bad_children() {
        assert!(matches!(
            calculate_down_sampled(&target(), &[]),
            Err(RollupError::NoChildren(_))
        ));

        let unsorted = vec![
            measured_bucket(child(2), &[(210 * MS, 1.0)]),
            measured_bucket(child(1), &[(110 * MS, 1.0)]),
        ];
        assert!(matches!(
            calculate_down_sampled(&target(), &unsorted),
            Err(RollupError::UnsortedChildren { .. })
        ));

        let foreign = vec![measured_bucket(child(50), &[(5_000 * MS, 1.0)])];
        assert!(matches!(
            calculate_down_sampled(&target(), &foreign),
            Err(RollupError::ParentMismatch { .. })
        ));

        let stray_row = vec![measured_bucket(child(0), &[(150 * MS, 1.0)])];
        assert!(matches!(
            calculate_down_sampled(&target(), &stray_row),
            Err(RollupError::ChildOutOfRange { .. })
        ));
    }

    #[test]
    fn calculated_children_feed_hints_and_extremes() {
        // Two aggregated rows in the same 100ms target slot with the same winning id.
        let counts = SeriesCounts::new(1, 1, 1);
        let mut b = ChunkBuilder::calculated(counts);
        let ordinal = Sample::Value(EnumOrdinal::new(2).unwrap());
        for (ts, avg, lo, hi, hint) in [(5 * MS, 5.0, 1.0, 9.0, 3u32), (15 * MS, 7.0, 6.0, 8.0, 2u32)] {
            b.push_calculated(
                ts,
                CalculatedRow {
                    decimals: &[Sample::Value(avg)],
                    decimal_mins: &[Sample::Value(lo)],
                    decimal_maxs: &[Sample::Value(hi)],
                    enums: &[Sample::Value(EnumSet::from_ordinals([2]).unwrap())],
                    enum_most_time: &[ordinal],
                    reference_ids: &[Sample::Value(ReferenceEntryId(11))],
                    reference_counts: &[Sample::Value(hint)],
                    reference_statuses: &[Sample::NoValue],
                },
            )
            .unwrap();
        }
        let five_seconds = BucketDescriptor::for_index(Resolution::FiveSeconds, 0);
        let one_minute = BucketDescriptor::for_index(Resolution::OneMinute, 0);
        let children = vec![Arc::new(HistoryBucket::new(five_seconds, b.build()))];

        let chunk = calculate_down_sampled(&one_minute, &children).unwrap().chunk;
        assert_eq!(chunk.decimals_at(0), &[Sample::Value(6.0)]);
        assert_eq!(chunk.decimal_mins_at(0).unwrap(), &[Sample::Value(1.0)]);
        assert_eq!(chunk.decimal_maxs_at(0).unwrap(), &[Sample::Value(9.0)]);
        assert_eq!(chunk.enum_most_time_at(0).unwrap(), &[ordinal]);
        assert_eq!(chunk.reference_ids_at(0), &[Sample::Value(ReferenceEntryId(11))]);
        assert_eq!(chunk.reference_counts_at(0).unwrap(), &[Sample::Value(4)]);
        assert_eq!(chunk.reference_statuses_at(0), &[Sample::NoValue]);
    }
}
