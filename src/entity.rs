//! Entity identity: [`EntityId`], [`EntityKind`], and the [`EntityRegistry`]
//! that assigns stable ids keyed by `(data_key, kind, time, local_index)`.

use crate::time::TimeFrameIndex;
use ahash::AHashMap;

/// An opaque, process-wide unique identifier for one element inside one
/// named container instance. Stable for the lifetime of that container.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(transparent)]
pub struct EntityId(pub u64);

impl nohash_hasher::IsEnabled for EntityId {}

/// The closed tag of entity-bearing element kinds.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum EntityKind {
    Point,
    Line,
    Mask,
    Event,
    Interval,
}

/// The key an [`EntityRegistry`] assigns ids against. Once a key has been
/// assigned an id, looking it up again returns the same id - assignment is
/// idempotent.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
struct AssignmentKey {
    data_key: String,
    kind: EntityKind,
    time: TimeFrameIndex,
    local_index: usize,
}

/// Assigns and remembers [`EntityId`]s for `(data_key, kind, time,
/// local_index)` triples. One registry is normally shared by every
/// container an embedding host manages, so that ids never collide across
/// containers.
#[derive(Default)]
pub struct EntityRegistry {
    next_id: u64,
    assigned: AHashMap<AssignmentKey, EntityId>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `key`, assigning a fresh one on first sight.
    pub fn assign(
        &mut self,
        data_key: &str,
        kind: EntityKind,
        time: TimeFrameIndex,
        local_index: usize,
    ) -> EntityId {
        let key = AssignmentKey {
            data_key: data_key.to_string(),
            kind,
            time,
            local_index,
        };
        if let Some(id) = self.assigned.get(&key) {
            return *id;
        }
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.assigned.insert(key, id);
        id
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_is_idempotent() {
        let mut reg = EntityRegistry::new();
        let a = reg.assign("masks", EntityKind::Mask, TimeFrameIndex(10), 0);
        let b = reg.assign("masks", EntityKind::Mask, TimeFrameIndex(10), 0);
        assert_eq!(a, b);
        let c = reg.assign("masks", EntityKind::Mask, TimeFrameIndex(10), 1);
        assert_ne!(a, c);
    }
}
