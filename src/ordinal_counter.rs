use crate::types::{EnumOrdinal, EnumSet, Sample};

/// Per-ordinal occurrence counter for one enum series within one target slot.
#[derive(Debug, Clone, Default)]
pub struct OrdinalCounter {
    counts: [u32; EnumSet::MAX_ORDINALS as usize],
    saw_no_value: bool,
}

impl OrdinalCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, ordinal: Sample<EnumOrdinal>) {
        match ordinal {
            Sample::Value(o) => self.counts[o.get() as usize] += 1,
            Sample::NoValue => self.saw_no_value = true,
            Sample::Pending => {}
        }
    }

    /// Counts every ordinal set in `set`.
    pub fn add_all(&mut self, set: Sample<EnumSet>) {
        match set {
            Sample::Value(set) => {
                for o in set.ordinals() {
                    self.counts[o.get() as usize] += 1;
                }
            }
            Sample::NoValue => self.saw_no_value = true,
            Sample::Pending => {}
        }
    }

    /// Most frequently counted ordinal; ties go to the lowest ordinal.
    pub fn winner(&self) -> Sample<EnumOrdinal> {
        let mut best: Option<(usize, u32)> = None;
        for (ordinal, &count) in self.counts.iter().enumerate() {
            if count > best.map_or(0, |(_, c)| c) {
                best = Some((ordinal, count));
            }
        }
        match best {
            Some((ordinal, _)) => EnumOrdinal::new(ordinal as u8).map_or(Sample::Pending, Sample::Value),
            None if self.saw_no_value => Sample::NoValue,
            None => Sample::Pending,
        }
    }

    pub fn reset(&mut self) {
        self.counts = [0; EnumSet::MAX_ORDINALS as usize];
        self.saw_no_value = false;
    }
}
