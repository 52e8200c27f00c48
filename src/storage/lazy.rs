//! The compute-closure backend: a random-access lazy sequence that produces
//! `(time, payload, id)` on demand.

use super::owning::OwningStorage;
use crate::entity::EntityId;
use crate::time::TimeFrameIndex;
use std::sync::Arc;

type LazyFn<P> = Arc<dyn Fn(usize) -> (TimeFrameIndex, P, EntityId) + Send + Sync>;

/// A random-access lazy sequence of `(time, payload, id)` triples. Never
/// caches anything internally; repeated reads of the same index re-invoke
/// the closure, which is expected to be pure.
#[derive(Clone)]
pub struct LazyStorage<P> {
    len: usize,
    f: LazyFn<P>,
}

impl<P> LazyStorage<P> {
    pub fn new(
        len: usize,
        f: impl Fn(usize) -> (TimeFrameIndex, P, EntityId) + Send + Sync + 'static,
    ) -> Self {
        Self {
            len,
            f: Arc::new(f),
        }
    }

    pub fn size(&self) -> usize {
        self.len
    }

    pub fn get_time(&self, i: usize) -> TimeFrameIndex {
        (self.f)(i).0
    }

    pub fn get_payload(&self, i: usize) -> P {
        (self.f)(i).1
    }

    pub fn get_entity_id(&self, i: usize) -> EntityId {
        (self.f)(i).2
    }

    /// Copies every element into a fresh [`OwningStorage`], in order.
    pub fn materialize(&self) -> OwningStorage<P> {
        let mut out = OwningStorage::new();
        for i in 0..self.len {
            let (t, p, id) = (self.f)(i);
            // A lazy sequence is allowed to reuse ids across independent
            // materializations of the *same* logical container, but a
            // single materialize() pass must not produce duplicates;
            // propagating that failure here would violate this method's
            // infallible contract, so duplicate ids are a caller bug.
            out.append(t, p, id)
                .expect("lazy storage produced an invalid element during materialization");
        }
        out
    }
}
