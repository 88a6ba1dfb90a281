use crate::error::RollupError;
use crate::types::{ReferenceEntryId, Sample};
use std::collections::BTreeMap;

/// Per-ID occurrence counter for one reference-entry series within one target slot.
///
/// The distinct-ID count is derived one of two ways. Raw samples carry no hint and the count is
/// the number of distinct IDs seen. Samples from already aggregated chunks carry their own
/// distinct count as a hint, and the counts are summed: while the sum is still zero a hint is
/// taken as is, and every later hint is reduced by one when its ID equals the previous sample's ID, assuming that entry
/// spans the boundary between the two. The sum is an estimate, not an exact count.
#[derive(Debug, Clone, Default)]
pub struct ReferenceEntryCounter {
    occurrences: BTreeMap<ReferenceEntryId, u32>,
    hinted_count: Option<u32>,
    last_id: Option<ReferenceEntryId>,
    saw_no_value: bool,
}

impl ReferenceEntryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one sample with an optional distinct-count hint.
    ///
    /// # Errors
    /// [`RollupError::InconsistentHint`] when the hint's absence kind does not match the ID's.
    pub fn add(
        &mut self,
        id: Sample<ReferenceEntryId>,
        hint: Option<Sample<u32>>,
    ) -> Result<(), RollupError> {
        match (id, hint) {
            (Sample::Pending, None | Some(Sample::Pending)) => Ok(()),
            (Sample::NoValue, None | Some(Sample::NoValue)) => {
                self.saw_no_value = true;
                Ok(())
            }
            (Sample::Value(id), None) => {
                *self.occurrences.entry(id).or_insert(0) += 1;
                Ok(())
            }
            (Sample::Value(id), Some(Sample::Value(hint))) => {
                *self.occurrences.entry(id).or_insert(0) += 1;
                // Nothing counted yet means this hint starts the sum.
                let contribution = match (self.hinted_count, self.last_id) {
                    (Some(total), Some(last)) if total > 0 && last == id => hint.saturating_sub(1),
                    _ => hint,
                };
                self.hinted_count = Some(self.hinted_count.unwrap_or(0).saturating_add(contribution));
                self.last_id = Some(id);
                Ok(())
            }
            (id, Some(hint)) => Err(RollupError::InconsistentHint(format!(
                "id {:?} paired with distinct count {:?}",
                id, hint
            ))),
        }
    }

    /// The ID seen most often; ties go to the lowest ID.
    pub fn winner_most_of_the_time(&self) -> Sample<ReferenceEntryId> {
        let mut best: Option<(ReferenceEntryId, u32)> = None;
        for (&id, &count) in &self.occurrences {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((id, count));
            }
        }
        Sample::from_state(best.is_some(), self.saw_no_value, || {
            best.map_or(ReferenceEntryId(0), |(id, _)| id)
        })
    }

    pub fn different_ids_count(&self) -> Sample<u32> {
        Sample::from_state(!self.occurrences.is_empty(), self.saw_no_value, || {
            self.hinted_count
                .unwrap_or(self.occurrences.len() as u32)
        })
    }

    pub fn reset(&mut self) {
        self.occurrences.clear();
        self.hinted_count = None;
        self.last_id = None;
        self.saw_no_value = false;
    }
}
