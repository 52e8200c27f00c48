//! [`ScalarSeries`]: ordered `(TimeFrameIndex, f32)`, one value per time.

use super::{Notify, SeriesBase};
use crate::element::ScalarSample;
use crate::entity::EntityId;
use crate::error::Result;
use crate::storage::{OwningStorage, RaggedStorage};
use crate::time::{TimeFrame, TimeFrameIndex};
use std::cell::Cell;
use std::sync::Arc;

/// One value per time. `ScalarSample` carries no entity id, so this
/// container assigns itself a private, container-local counter for the
/// storage layer's bookkeeping; it is never exposed to callers.
pub struct ScalarSeries {
    base: SeriesBase<f32>,
    next_id: Cell<u64>,
}

impl ScalarSeries {
    pub fn new(frame: Arc<TimeFrame>) -> Self {
        let storage = RaggedStorage::owning(OwningStorage::with_frame(&frame));
        Self {
            base: SeriesBase::new(frame, storage),
            next_id: Cell::new(0),
        }
    }

    pub fn from_view(frame: Arc<TimeFrame>, storage: RaggedStorage<f32>) -> Self {
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

    pub fn num_times(&self) -> usize {
        self.base.num_times()
    }

    pub fn times_with_data(&self) -> Vec<TimeFrameIndex> {
        self.base.times_with_data()
    }

    pub fn value_at_time(&self, t: TimeFrameIndex) -> Option<f32> {
        self.base.at_time(t).into_iter().next()
    }

    pub fn elements(&self) -> Vec<ScalarSample> {
        self.base
            .elements()
            .into_iter()
            .map(|(time, value)| ScalarSample { time, value })
            .collect()
    }

    /// Sets (or inserts) the single value at `t`, replacing any prior value.
    pub fn set_value(&self, t: TimeFrameIndex, value: f32, notify: Notify) -> Result<()> {
        let id = self.fresh_id();
        self.base.set_at_time(t, vec![(value, id)], notify)
    }

    pub fn append_value(&self, t: TimeFrameIndex, value: f32, notify: Notify) -> Result<()> {
        let id = self.fresh_id();
        self.base.append_at_time(t, value, id, notify)
    }

    pub fn clear_at_time(&self, t: TimeFrameIndex, notify: Notify) -> Result<usize> {
        self.base.clear_at_time(t, notify)
    }

    pub fn clear_all(&self, notify: Notify) -> Result<()> {
        self.base.clear_all(notify)
    }

    /// Returns `(time, value)` pairs for storage indices in `[lo, hi)`, the
    /// efficient slice plotting code needs without walking the whole
    /// series (spec §4.2: `time_value_range_in_index_range`).
    pub fn time_value_range_in_index_range(&self, lo: usize, hi: usize) -> Vec<(TimeFrameIndex, f32)> {
        let hi = hi.min(self.base.size());
        if lo >= hi {
            return Vec::new();
        }
        if let Some(fast) = self.base.storage().fast_path() {
            fast.times()[lo..hi]
                .iter()
                .zip(&fast.payloads()[lo..hi])
                .map(|(&t, &v)| (t, v))
                .collect()
        } else {
            (lo..hi)
                .map(|i| (self.base.storage().get_time(i), self.base.storage().get_payload(i)))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_value_per_time() {
        let frame = Arc::new(TimeFrame::constant_step("f", 5, 0.0, 1.0));
        let series = ScalarSeries::new(frame);
        series.append_value(TimeFrameIndex(0), 1.0, Notify::No).unwrap();
        series.set_value(TimeFrameIndex(0), 5.0, Notify::No).unwrap();
        assert_eq!(series.value_at_time(TimeFrameIndex(0)), Some(5.0));
        assert_eq!(series.size(), 1);
    }

    #[test]
    fn index_range_slice_matches_full_scan() {
        let frame = Arc::new(TimeFrame::constant_step("f", 5, 0.0, 1.0));
        let series = ScalarSeries::new(frame);
        for i in 0..5 {
            series
                .append_value(TimeFrameIndex(i), i as f32, Notify::No)
                .unwrap();
        }
        assert_eq!(
            series.time_value_range_in_index_range(1, 4),
            vec![
                (TimeFrameIndex(1), 1.0),
                (TimeFrameIndex(2), 2.0),
                (TimeFrameIndex(3), 3.0)
            ]
        );
    }
}
