//! [`RaggedScalarSeries`]: `TimeFrameIndex -> [f32]`, variable length per
//! time.

use super::{Notify, SeriesBase};
use crate::element::RaggedScalar;
use crate::entity::EntityId;
use crate::error::Result;
use crate::storage::{OwningStorage, RaggedStorage};
use crate::time::{TimeFrame, TimeFrameIndex};
use std::cell::Cell;
use std::sync::Arc;

/// A variable-length-per-time scalar series, such as the per-mask areas at
/// each frame in S1/S2 of the spec's end-to-end scenarios.
pub struct RaggedScalarSeries {
    base: SeriesBase<f32>,
    next_id: Cell<u64>,
}

impl RaggedScalarSeries {
    pub fn new(frame: Arc<TimeFrame>) -> Self {
        let storage = RaggedStorage::owning(OwningStorage::with_frame(&frame));
        Self {
            base: SeriesBase::new(frame, storage),
            next_id: Cell::new(0),
        }
    }

    pub fn from_storage(frame: Arc<TimeFrame>, storage: RaggedStorage<f32>) -> Self {
        Self {
            base: SeriesBase::new(frame, storage),
            next_id: Cell::new(0),
        }
    }

    fn fresh_id(&self) -> EntityId {
        let id = EntityId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        id
    }

    pub fn base(&self) -> &SeriesBase<f32> {
        &self.base
    }

    pub fn size(&self) -> usize {
        self.base.size()
    }

    pub fn times_with_data(&self) -> Vec<TimeFrameIndex> {
        self.base.times_with_data()
    }

    pub fn at_time(&self, t: TimeFrameIndex) -> Vec<f32> {
        self.base.at_time(t)
    }

    pub fn elements(&self) -> Vec<RaggedScalar> {
        self.base
            .elements()
            .into_iter()
            .map(|(time, value)| RaggedScalar { time, value })
            .collect()
    }

    /// Appends one more value at `t` without disturbing existing values at
    /// that time.
    pub fn append_value(&self, t: TimeFrameIndex, value: f32, notify: Notify) -> Result<()> {
        let id = self.fresh_id();
        self.base.append_at_time(t, value, id, notify)
    }

    /// Replaces the entire group of values at `t`.
    pub fn set_values(&self, t: TimeFrameIndex, values: Vec<f32>, notify: Notify) -> Result<()> {
        let pairs = values.into_iter().map(|v| (v, self.fresh_id())).collect();
        self.base.set_at_time(t, pairs, notify)
    }

    pub fn clear_at_time(&self, t: TimeFrameIndex, notify: Notify) -> Result<usize> {
        self.base.clear_at_time(t, notify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_grouping_by_time() {
        let frame = Arc::new(TimeFrame::constant_step("f", 30, 0.0, 1.0));
        let series = RaggedScalarSeries::new(frame);
        series.append_value(TimeFrameIndex(10), 4.0, Notify::No).unwrap();
        series.append_value(TimeFrameIndex(10), 2.0, Notify::No).unwrap();
        series.append_value(TimeFrameIndex(20), 5.0, Notify::No).unwrap();
        assert_eq!(series.at_time(TimeFrameIndex(10)), vec![4.0, 2.0]);
        assert_eq!(series.at_time(TimeFrameIndex(20)), vec![5.0]);
        assert_eq!(series.size(), 3);
    }
}
