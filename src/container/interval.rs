//! [`IntervalSeries`]: sorted, non-overlapping [`Interval`]s, each carrying
//! an [`EntityId`].

use super::{Notify, SeriesBase};
use crate::element::{Interval, IntervalElement};
use crate::entity::{EntityId, EntityKind, EntityRegistry};
use crate::error::Result;
use crate::storage::{OwningStorage, RaggedStorage};
use crate::time::{TimeFrame, TimeFrameIndex};
use std::sync::Arc;

pub struct IntervalSeries {
    base: SeriesBase<Interval>,
    data_key: String,
}

impl IntervalSeries {
    pub fn new(data_key: impl Into<String>, frame: Arc<TimeFrame>) -> Self {
        let storage = RaggedStorage::owning(OwningStorage::with_frame(&frame));
        Self {
            base: SeriesBase::new(frame, storage),
            data_key: data_key.into(),
        }
    }

    pub fn base(&self) -> &SeriesBase<Interval> {
        &self.base
    }

    pub fn size(&self) -> usize {
        self.base.size()
    }

    pub fn elements(&self) -> Vec<IntervalElement> {
        self.base
            .flattened_data()
            .into_iter()
            .map(|(_, id, interval)| IntervalElement { id, interval })
            .collect()
    }

    fn overlaps_existing(&self, candidate: &Interval) -> bool {
        self.base
            .elements()
            .iter()
            .any(|(_, existing)| existing.overlaps(candidate))
    }

    /// Inserts `interval`, assigning it an id from `registry`. Returns
    /// `Ok(false)` without mutating anything if `start > end` or the
    /// interval overlaps an already-present one (spec §3.4).
    pub fn insert(
        &self,
        registry: &mut EntityRegistry,
        interval: Interval,
        notify: Notify,
    ) -> Result<bool> {
        if interval.start > interval.end || self.overlaps_existing(&interval) {
            return Ok(false);
        }
        let local_index = self.size();
        let id = registry.assign(
            &self.data_key,
            EntityKind::Interval,
            TimeFrameIndex(interval.start),
            local_index,
        );
        self.base
            .append_at_time(TimeFrameIndex(interval.start), interval, id, notify)?;
        Ok(true)
    }

    pub fn erase_by_entity_id(&self, id: EntityId, notify: Notify) -> Result<bool> {
        self.base.clear_by_entity_id(id, notify)
    }

    /// Every interval whose `[start, end]` intersects `[start, stop]`.
    pub fn view_overlapping(&self, start: i64, stop: i64) -> Vec<IntervalElement> {
        let query = Interval::new(start, stop);
        self.elements()
            .into_iter()
            .filter(|el| el.interval.overlaps(&query))
            .collect()
    }
}
