use crate::descriptor::BucketDescriptor;
use crate::error::RollupError;
use crate::types::Timestamp;

/// Cursor over the slot centers of a target bucket.
#[derive(Debug, Clone)]
pub struct TargetTimestampsWalker {
    timestamps: Vec<Timestamp>,
    half_distance: u64,
    index: usize,
}

impl TargetTimestampsWalker {
    pub fn new(descriptor: &BucketDescriptor) -> Self {
        TargetTimestampsWalker {
            timestamps: descriptor.slot_timestamps(),
            half_distance: descriptor.resolution().distance() / 2,
            index: 0,
        }
    }

    /// All slot centers, in ascending order.
    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn slot_center(&self) -> Timestamp {
        self.timestamps[self.index]
    }

    #[inline]
    pub fn slot_start(&self) -> Timestamp {
        self.slot_center() - self.half_distance
    }

    #[inline]
    pub fn slot_end(&self) -> Timestamp {
        self.slot_center() + self.half_distance
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.timestamps.len()
    }

    /// Moves to the next slot.
    ///
    /// # Errors
    /// [`RollupError::WalkerExhausted`] when already at the last slot.
    pub fn next(&mut self) -> Result<(), RollupError> {
        if self.is_last() {
            return Err(RollupError::WalkerExhausted {
                slots: self.timestamps.len(),
            });
        }
        self.index += 1;
        Ok(())
    }
}
