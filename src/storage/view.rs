//! The zero-copy filtering backend: a sorted list of indices into another
//! storage.

use super::owning::OwningStorage;
use crate::entity::EntityId;
use crate::time::TimeFrameIndex;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// A read-only filter over a shared [`OwningStorage`]. Holds a strong
/// reference to its source (via [`Arc`]), so the source cannot be dropped
/// while a view of it is outstanding.
pub struct ViewStorage<P> {
    pub(super) source: Arc<RwLock<OwningStorage<P>>>,
    pub(super) indices: Vec<usize>,
}

impl<P> ViewStorage<P> {
    pub fn new(source: Arc<RwLock<OwningStorage<P>>>, indices: Vec<usize>) -> Self {
        debug_assert!(
            indices.windows(2).all(|w| w[0] <= w[1]),
            "view indices must be sorted"
        );
        Self { source, indices }
    }

    pub fn size(&self) -> usize {
        self.indices.len()
    }

    pub fn get_time(&self, i: usize) -> TimeFrameIndex {
        self.source.read().get_time(self.indices[i])
    }

    pub fn get_entity_id(&self, i: usize) -> EntityId {
        self.source.read().get_entity_id(self.indices[i])
    }

    /// `true` iff `indices` form one contiguous run into the source, i.e.
    /// `indices[i] == indices[0] + i` for every `i`. Contiguous views are
    /// eligible for the fast-path bulk accessor (see [`super::RaggedStorage`]).
    pub fn is_contiguous(&self) -> bool {
        match self.indices.first() {
            None => true,
            Some(&first) => self
                .indices
                .iter()
                .enumerate()
                .all(|(i, &idx)| idx == first + i),
        }
    }

    /// Replaces `indices` with every source index whose time falls in
    /// `[start, end]`.
    pub fn filter_by_time_range(&mut self, start: TimeFrameIndex, end: TimeFrameIndex) {
        let source = self.source.read();
        self.indices = self
            .indices
            .iter()
            .copied()
            .filter(|&i| {
                let t = source.get_time(i);
                t >= start && t <= end
            })
            .collect();
    }

    /// Replaces `indices` with every source index whose entity id is in
    /// `ids`.
    pub fn filter_by_entity_ids(&mut self, ids: &HashSet<EntityId>) {
        let source = self.source.read();
        self.indices = self
            .indices
            .iter()
            .copied()
            .filter(|&i| ids.contains(&source.get_entity_id(i)))
            .collect();
    }
}

impl<P> Clone for ViewStorage<P> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            indices: self.indices.clone(),
        }
    }
}
