//! Slot aggregator: accumulates every sample destined for one target slot.

use crate::error::{ensure_size, RollupError};
use crate::ordinal_counter::OrdinalCounter;
use crate::reference_counter::ReferenceEntryCounter;
use crate::types::{
    max_history_aware, min_history_aware, EnumOrdinal, EnumSet, ReferenceEntryId,
    ReferenceEntryStatus, Sample, SeriesCounts,
};

#[derive(Debug, Clone, Copy)]
struct DecimalState {
    count: u32,
    mean: f64,
    min: Sample<f64>,
    max: Sample<f64>,
    saw_no_value: bool,
}

impl Default for DecimalState {
    fn default() -> Self {
        DecimalState {
            count: 0,
            mean: 0.0,
            min: Sample::Pending,
            max: Sample::Pending,
            saw_no_value: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct UnionState {
    union: EnumSet,
    count: u32,
    saw_no_value: bool,
}

impl UnionState {
    fn add(&mut self, set: Sample<EnumSet>) {
        match set {
            Sample::Value(set) => {
                self.union = self.union.union(set);
                self.count += 1;
            }
            Sample::NoValue => self.saw_no_value = true,
            Sample::Pending => {}
        }
    }

    fn result(&self) -> Sample<EnumSet> {
        Sample::from_state(self.count > 0, self.saw_no_value, || self.union)
    }
}

/// Accumulates samples for one target slot across all series.
///
/// One instance is owned by each merge call and reused for every slot of the target via
/// [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct DownSamplingCalculator {
    counts: SeriesCounts,
    decimals: Vec<DecimalState>,
    enum_unions: Vec<UnionState>,
    ordinals: Vec<OrdinalCounter>,
    references: Vec<ReferenceEntryCounter>,
    statuses: Vec<UnionState>,
}

impl DownSamplingCalculator {
    pub fn new(counts: SeriesCounts) -> Self {
        DownSamplingCalculator {
            counts,
            decimals: vec![DecimalState::default(); counts.decimals],
            enum_unions: vec![UnionState::default(); counts.enums],
            ordinals: vec![OrdinalCounter::new(); counts.enums],
            references: vec![ReferenceEntryCounter::new(); counts.references],
            statuses: vec![UnionState::default(); counts.references],
        }
    }

    pub fn series_counts(&self) -> SeriesCounts {
        self.counts
    }

    /// Adds one row of decimal samples. Aggregated children pass their own min and max so the
    /// extremes survive repeated downsampling.
    pub fn add_decimals_sample(
        &mut self,
        values: &[Sample<f64>],
        mins: Option<&[Sample<f64>]>,
        maxs: Option<&[Sample<f64>]>,
    ) -> Result<(), RollupError> {
        ensure_size("decimal sample", self.decimals.len(), values.len())?;
        if let Some(mins) = mins {
            ensure_size("decimal min sample", self.decimals.len(), mins.len())?;
        }
        if let Some(maxs) = maxs {
            ensure_size("decimal max sample", self.decimals.len(), maxs.len())?;
        }

        for (i, (state, &value)) in self.decimals.iter_mut().zip(values).enumerate() {
            match value {
                Sample::NoValue => state.saw_no_value = true,
                Sample::Pending => {}
                Sample::Value(v) => {
                    state.count += 1;
                    state.mean += (v - state.mean) / state.count as f64;
                    let low = mins.map_or(value, |m| m[i]);
                    let high = maxs.map_or(value, |m| m[i]);
                    state.min = min_history_aware(state.min, low);
                    state.max = max_history_aware(state.max, high);
                }
            }
        }
        Ok(())
    }

    /// Adds one row of enum samples. Every set ordinal gets one vote, for raw and aggregated rows
    /// alike.
    pub fn add_enum_sample(&mut self, sets: &[Sample<EnumSet>]) -> Result<(), RollupError> {
        ensure_size("enum sample", self.enum_unions.len(), sets.len())?;
        for (i, &set) in sets.iter().enumerate() {
            self.enum_unions[i].add(set);
            self.ordinals[i].add_all(set);
        }
        Ok(())
    }

    /// Adds one row of reference-entry samples with optional distinct-count hints.
    pub fn add_reference_entry_sample(
        &mut self,
        ids: &[Sample<ReferenceEntryId>],
        hints: Option<&[Sample<u32>]>,
        statuses: &[Sample<ReferenceEntryStatus>],
    ) -> Result<(), RollupError> {
        ensure_size("reference id sample", self.references.len(), ids.len())?;
        ensure_size("reference status sample", self.references.len(), statuses.len())?;
        if let Some(hints) = hints {
            ensure_size("reference count sample", self.references.len(), hints.len())?;
        }

        for (i, &id) in ids.iter().enumerate() {
            self.references[i].add(id, hints.map(|h| h[i]))?;
            self.statuses[i].add(statuses[i]);
        }
        Ok(())
    }

    pub fn average_values(&self) -> Vec<Sample<f64>> {
        self.decimals
            .iter()
            .map(|s| Sample::from_state(s.count > 0, s.saw_no_value, || s.mean))
            .collect()
    }

    pub fn min_values(&self) -> Vec<Sample<f64>> {
        self.decimals
            .iter()
            .map(|s| Self::extreme(s, s.min))
            .collect()
    }

    pub fn max_values(&self) -> Vec<Sample<f64>> {
        self.decimals
            .iter()
            .map(|s| Self::extreme(s, s.max))
            .collect()
    }

    // Extremes follow the same count-based precedence as the mean.
    fn extreme(state: &DecimalState, extreme: Sample<f64>) -> Sample<f64> {
        match extreme {
            Sample::Value(v) if state.count > 0 => Sample::Value(v),
            _ => Sample::from_state(false, state.saw_no_value, || 0.0),
        }
    }

    pub fn enum_union_values(&self) -> Vec<Sample<EnumSet>> {
        self.enum_unions.iter().map(UnionState::result).collect()
    }

    pub fn enum_most_time_ordinal_values(&self) -> Vec<Sample<EnumOrdinal>> {
        self.ordinals.iter().map(OrdinalCounter::winner).collect()
    }

    pub fn reference_entry_ids(&self) -> Vec<Sample<ReferenceEntryId>> {
        self.references
            .iter()
            .map(ReferenceEntryCounter::winner_most_of_the_time)
            .collect()
    }

    pub fn reference_entry_different_ids_count(&self) -> Vec<Sample<u32>> {
        self.references
            .iter()
            .map(ReferenceEntryCounter::different_ids_count)
            .collect()
    }

    pub fn reference_entry_statuses(&self) -> Vec<Sample<ReferenceEntryStatus>> {
        self.statuses.iter().map(UnionState::result).collect()
    }

    /// Clears every counter and flag for the next slot.
    pub fn reset(&mut self) {
        self.decimals.fill(DecimalState::default());
        self.enum_unions.fill(UnionState::default());
        self.statuses.fill(UnionState::default());
        self.ordinals.iter_mut().for_each(OrdinalCounter::reset);
        self.references
            .iter_mut()
            .for_each(ReferenceEntryCounter::reset);
    }
}
