//! [`EventSeries`]: sorted, unique `TimeFrameIndex` events, each carrying an
//! [`EntityId`].

use super::{Notify, SeriesBase};
use crate::element::Event;
use crate::entity::{EntityId, EntityRegistry};
use crate::error::Result;
use crate::storage::{LazyStorage, OwningStorage, RaggedStorage};
use crate::time::{TimeFrame, TimeFrameIndex};
use std::sync::Arc;

/// A payload-less occurrence series. Duplicate times are rejected at the
/// API boundary (insertion at an existing time is a no-op, per spec §3.4).
pub struct EventSeries {
    base: SeriesBase<()>,
    data_key: String,
}

impl EventSeries {
    pub fn new(data_key: impl Into<String>, frame: Arc<TimeFrame>) -> Self {
        let storage = RaggedStorage::owning(OwningStorage::with_frame(&frame));
        Self {
            base: SeriesBase::new(frame, storage),
            data_key: data_key.into(),
        }
    }

    pub fn base(&self) -> &SeriesBase<()> {
        &self.base
    }

    pub fn size(&self) -> usize {
        self.base.size()
    }

    pub fn times(&self) -> Vec<TimeFrameIndex> {
        self.base.times_with_data()
    }

    pub fn elements(&self) -> Vec<Event> {
        self.base
            .flattened_data()
            .into_iter()
            .map(|(time, id, ())| Event { time, id })
            .collect()
    }

    /// Inserts an event at `t`, assigning it an id from `registry`. A
    /// second insertion at an already-present time is a no-op and returns
    /// `Ok(false)`.
    pub fn insert(
        &self,
        registry: &mut EntityRegistry,
        t: TimeFrameIndex,
        notify: Notify,
    ) -> Result<bool> {
        if !self.base.entity_ids_at_time(t).is_empty() {
            return Ok(false);
        }
        let local_index = self.size();
        let id = registry.assign(
            &self.data_key,
            crate::entity::EntityKind::Event,
            t,
            local_index,
        );
        self.base.append_at_time(t, (), id, notify)?;
        Ok(true)
    }

    pub fn erase(&self, t: TimeFrameIndex, notify: Notify) -> Result<usize> {
        self.base.clear_at_time(t, notify)
    }

    /// Converts `[start, stop]` from `src_frame` into this container's
    /// frame (a no-op if they're the same frame) and returns a lazy view
    /// over the events whose time falls in the converted range, found by
    /// binary search over the sorted time index.
    pub fn view_in_range(
        &self,
        start: TimeFrameIndex,
        stop: TimeFrameIndex,
        src_frame: &TimeFrame,
    ) -> RaggedStorage<()> {
        let converted = crate::time::TimeFrameInterval::new(start, stop).convert(src_frame, self.base.frame());

        let times = self.base.times_with_data();
        let lo = times.partition_point(|&t| t < converted.start);
        let hi = times.partition_point(|&t| t <= converted.end);
        let matching: Vec<TimeFrameIndex> = times[lo..hi].to_vec();

        let base_storage = &self.base;
        let snapshot: Vec<(TimeFrameIndex, EntityId)> = matching
            .into_iter()
            .flat_map(|t| {
                base_storage
                    .entity_ids_at_time(t)
                    .into_iter()
                    .map(move |id| (t, id))
            })
            .collect();

        let len = snapshot.len();
        RaggedStorage::Lazy(LazyStorage::new(len, move |i| {
            let (t, id) = snapshot[i];
            (t, (), id)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_insert_is_noop() {
        let frame = Arc::new(TimeFrame::constant_step("f", 100, 0.0, 1.0));
        let series = EventSeries::new("events", frame);
        let mut registry = EntityRegistry::new();
        assert!(series.insert(&mut registry, TimeFrameIndex(5), Notify::No).unwrap());
        assert!(!series.insert(&mut registry, TimeFrameIndex(5), Notify::No).unwrap());
        assert_eq!(series.size(), 1);
    }

    #[test]
    fn view_in_range_binary_search() {
        let frame = Arc::new(TimeFrame::constant_step("f", 200, 0.0, 1.0));
        let series = EventSeries::new("events", Arc::clone(&frame));
        let mut registry = EntityRegistry::new();
        for t in [5, 25, 55, 65, 120] {
            series
                .insert(&mut registry, TimeFrameIndex(t), Notify::No)
                .unwrap();
        }
        let view = series.view_in_range(TimeFrameIndex(0), TimeFrameIndex(50), &frame);
        assert_eq!(view.size(), 2);
        assert_eq!(view.get_time(0), TimeFrameIndex(5));
        assert_eq!(view.get_time(1), TimeFrameIndex(25));
    }
}
