//! The canonical, owning storage backend: parallel SoA arrays plus a
//! `time -> [start, end)` range index.

use crate::entity::EntityId;
use crate::error::{EngineError, Result};
use crate::time::{TimeFrame, TimeFrameIndex};
use ahash::AHashMap;
use std::collections::BTreeMap;
use std::ops::Range;

/// Owns the parallel `times`/`payloads`/`ids` arrays for one ragged,
/// time-indexed container. Entries at the same time are always contiguous
/// (callers only ever append in non-decreasing time order, and removal
/// compacts the arrays to preserve the invariant).
#[derive(Clone, Debug)]
pub struct OwningStorage<P> {
    times: Vec<TimeFrameIndex>,
    payloads: Vec<P>,
    ids: Vec<EntityId>,
    time_ranges: BTreeMap<TimeFrameIndex, Range<usize>>,
    id_index: AHashMap<EntityId, usize>,
    frame_len: usize,
}

impl<P> Default for OwningStorage<P> {
    fn default() -> Self {
        Self {
            times: Vec::new(),
            payloads: Vec::new(),
            ids: Vec::new(),
            time_ranges: BTreeMap::new(),
            id_index: AHashMap::new(),
            frame_len: usize::MAX,
        }
    }
}

impl<P> OwningStorage<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds this storage to a frame's length, so future `append` calls can
    /// check bounds. Containers call this once at construction time.
    pub fn with_frame(frame: &TimeFrame) -> Self {
        Self {
            frame_len: frame.len(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.times.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn get_time(&self, i: usize) -> TimeFrameIndex {
        self.times[i]
    }

    pub fn get_payload(&self, i: usize) -> &P {
        &self.payloads[i]
    }

    pub fn get_entity_id(&self, i: usize) -> EntityId {
        self.ids[i]
    }

    pub fn times_slice(&self) -> &[TimeFrameIndex] {
        &self.times
    }

    pub fn payloads_slice(&self) -> &[P] {
        &self.payloads
    }

    pub fn payloads_mut(&mut self) -> &mut [P] {
        &mut self.payloads
    }

    pub fn ids_slice(&self) -> &[EntityId] {
        &self.ids
    }

    /// The `[start, end)` range of storage indices carrying time `t`, or
    /// `0..0` if `t` has no entries.
    pub fn time_range(&self, t: TimeFrameIndex) -> Range<usize> {
        self.time_ranges.get(&t).cloned().unwrap_or(0..0)
    }

    pub fn times_with_data(&self) -> impl Iterator<Item = TimeFrameIndex> + '_ {
        self.time_ranges.keys().copied()
    }

    pub fn find_by_entity_id(&self, id: EntityId) -> Option<usize> {
        self.id_index.get(&id).copied()
    }

    /// Appends one `(time, payload, id)` triple.
    ///
    /// Times must be appended in non-decreasing order (the only way the
    /// contiguous-range invariant is maintained without a full re-sort);
    /// callers building up a container from sorted source data satisfy this
    /// naturally. Fails with `TimeOutOfRange` if `t` falls outside the bound
    /// frame, or `DuplicateEntityId` if `id` is already present.
    pub fn append(&mut self, t: TimeFrameIndex, payload: P, id: EntityId) -> Result<()> {
        if self.frame_len != usize::MAX && !(t.get() >= 0 && (t.get() as usize) < self.frame_len) {
            return Err(EngineError::TimeOutOfRange {
                time: t,
                frame_len: self.frame_len,
            });
        }
        if self.id_index.contains_key(&id) {
            return Err(EngineError::DuplicateEntityId(id));
        }
        debug_assert!(
            self.times.last().map_or(true, |&last| last <= t),
            "OwningStorage::append requires non-decreasing times"
        );

        let idx = self.times.len();
        self.times.push(t);
        self.payloads.push(payload);
        self.ids.push(id);
        self.id_index.insert(id, idx);

        self.time_ranges
            .entry(t)
            .and_modify(|r| r.end = idx + 1)
            .or_insert(idx..idx + 1);

        Ok(())
    }

    /// Removes every entry at time `t`, returning how many were removed.
    /// Compacts the backing arrays and reindexes the ids and ranges of
    /// every entry that shifted.
    pub fn remove_at_time(&mut self, t: TimeFrameIndex) -> usize {
        let Some(range) = self.time_ranges.remove(&t) else {
            return 0;
        };
        let removed = range.len();
        self.remove_index_range(range);
        removed
    }

    /// Removes the single entry carrying `id`, returning whether it existed.
    pub fn remove_by_entity_id(&mut self, id: EntityId) -> bool {
        let Some(idx) = self.id_index.get(&id).copied() else {
            return false;
        };
        self.remove_index_range(idx..idx + 1);
        true
    }

    fn remove_index_range(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        self.times.drain(range.clone());
        self.payloads.drain(range.clone());
        let removed_ids: Vec<EntityId> = self.ids.drain(range.clone()).collect();
        for id in removed_ids {
            self.id_index.remove(&id);
        }
        self.rebuild_indices();
    }

    /// Recomputes `time_ranges` and `id_index` from scratch. Called after any
    /// structural mutation; cheap relative to the arena compaction it follows.
    fn rebuild_indices(&mut self) {
        self.time_ranges.clear();
        self.id_index.clear();
        for (i, &t) in self.times.iter().enumerate() {
            self.time_ranges
                .entry(t)
                .and_modify(|r| r.end = i + 1)
                .or_insert(i..i + 1);
        }
        for (i, &id) in self.ids.iter().enumerate() {
            self.id_index.insert(id, i);
        }
    }

    pub fn clear(&mut self) {
        self.times.clear();
        self.payloads.clear();
        self.ids.clear();
        self.time_ranges.clear();
        self.id_index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_contiguity() {
        let mut s = OwningStorage::<f32>::new();
        s.append(TimeFrameIndex(10), 1.0, EntityId(0)).unwrap();
        s.append(TimeFrameIndex(10), 2.0, EntityId(1)).unwrap();
        s.append(TimeFrameIndex(20), 3.0, EntityId(2)).unwrap();
        assert_eq!(s.time_range(TimeFrameIndex(10)), 0..2);
        assert_eq!(s.time_range(TimeFrameIndex(20)), 2..3);
        assert_eq!(s.time_range(TimeFrameIndex(99)), 0..0);
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut s = OwningStorage::<f32>::new();
        s.append(TimeFrameIndex(0), 1.0, EntityId(5)).unwrap();
        let err = s.append(TimeFrameIndex(1), 2.0, EntityId(5)).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateEntityId(EntityId(5))));
    }

    #[test]
    fn remove_at_time_drops_the_time_from_the_index() {
        let mut s = OwningStorage::<f32>::new();
        s.append(TimeFrameIndex(0), 1.0, EntityId(0)).unwrap();
        assert_eq!(s.remove_at_time(TimeFrameIndex(0)), 1);
        assert_eq!(s.time_range(TimeFrameIndex(0)), 0..0);
        assert!(s.times_with_data().next().is_none());
    }

    #[test]
    fn remove_by_entity_id_compacts_and_reindexes() {
        let mut s = OwningStorage::<f32>::new();
        s.append(TimeFrameIndex(0), 1.0, EntityId(0)).unwrap();
        s.append(TimeFrameIndex(0), 2.0, EntityId(1)).unwrap();
        s.append(TimeFrameIndex(1), 3.0, EntityId(2)).unwrap();
        assert!(s.remove_by_entity_id(EntityId(0)));
        assert_eq!(s.size(), 2);
        assert_eq!(s.find_by_entity_id(EntityId(1)), Some(0));
        assert_eq!(s.find_by_entity_id(EntityId(2)), Some(1));
        assert!(!s.remove_by_entity_id(EntityId(0)));
    }

    #[test]
    fn time_out_of_range_rejected() {
        let frame = TimeFrame::constant_step("f", 5, 0.0, 1.0);
        let mut s = OwningStorage::<f32>::with_frame(&frame);
        let err = s.append(TimeFrameIndex(10), 1.0, EntityId(0)).unwrap_err();
        assert!(matches!(err, EngineError::TimeOutOfRange { .. }));
    }
}
