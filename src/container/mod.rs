//! Container types: five time-series categories sharing a common surface
//! over [`RaggedStorage`], plus the mutation/observer plumbing the spec
//! calls for (§4.2, §5).

mod event;
mod geometry;
mod interval;
mod ragged_scalar;
mod scalar;

pub use event::EventSeries;
pub use geometry::GeometrySeries;
pub use interval::IntervalSeries;
pub use ragged_scalar::RaggedScalarSeries;
pub use scalar::ScalarSeries;

use crate::entity::EntityId;
use crate::error::Result;
use crate::storage::{FastPathCache, RaggedStorage};
use crate::time::{TimeFrame, TimeFrameIndex, TimeFrameInterval, TimeIndexAndFrame};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Whether a mutation should notify registered observers. Mirrors the
/// spec's `NotifyObservers` flag on every mutating container method.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Notify {
    Yes,
    No,
}

/// A minimal observer callback, invoked after a mutation when [`Notify::Yes`]
/// is passed.
pub type ObserverFn = Arc<dyn Fn() + Send + Sync>;

/// Shared plumbing every container type is built on: a [`RaggedStorage`]
/// bound to a [`TimeFrame`], a fast-path validity flag, and an observer
/// list. Container types compose this rather than inherit from it (there's
/// no inheritance in Rust, and a sum-type-first design doesn't need any).
pub struct SeriesBase<P: Clone> {
    frame: Arc<TimeFrame>,
    storage: RaggedStorage<P>,
    cache: parking_lot::Mutex<FastPathCache>,
    observers: parking_lot::Mutex<Vec<ObserverFn>>,
}

impl<P: Clone> SeriesBase<P> {
    pub fn new(frame: Arc<TimeFrame>, storage: RaggedStorage<P>) -> Self {
        let mut cache = FastPathCache::default();
        cache.rebuild(&storage);
        Self {
            frame,
            storage,
            cache: parking_lot::Mutex::new(cache),
            observers: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn frame(&self) -> &TimeFrame {
        &self.frame
    }

    pub fn frame_arc(&self) -> Arc<TimeFrame> {
        Arc::clone(&self.frame)
    }

    pub fn storage(&self) -> &RaggedStorage<P> {
        &self.storage
    }

    pub fn size(&self) -> usize {
        self.storage.size()
    }

    pub fn num_times(&self) -> usize {
        self.storage.times_with_data().len()
    }

    pub fn times_with_data(&self) -> Vec<TimeFrameIndex> {
        self.storage.times_with_data()
    }

    pub fn is_view(&self) -> bool {
        self.storage.is_view()
    }

    pub fn is_lazy(&self) -> bool {
        self.storage.is_lazy()
    }

    pub fn cache_valid(&self) -> bool {
        self.cache.lock().is_valid()
    }

    pub fn add_observer(&self, f: ObserverFn) {
        self.observers.lock().push(f);
    }

    fn notify(&self, notify: Notify) {
        if notify == Notify::Yes {
            for obs in self.observers.lock().iter() {
                obs();
            }
        }
    }

    /// Every mutating method funnels through here: invalidate, run the
    /// mutation, rebuild, optionally notify. Matches spec §4.1's
    /// "invalidated before every write operation and refreshed after".
    fn mutate<R>(&self, notify: Notify, f: impl FnOnce(&RaggedStorage<P>) -> Result<R>) -> Result<R> {
        self.cache.lock().invalidate();
        let result = f(&self.storage)?;
        self.cache.lock().rebuild(&self.storage);
        self.notify(notify);
        Ok(result)
    }

    pub fn at_time(&self, t: TimeFrameIndex) -> Vec<P> {
        let range = self.storage.time_range(t);
        range.map(|i| self.storage.get_payload(i)).collect()
    }

    pub fn entity_ids_at_time(&self, t: TimeFrameIndex) -> Vec<EntityId> {
        let range = self.storage.time_range(t);
        range.map(|i| self.storage.get_entity_id(i)).collect()
    }

    pub fn data_by_entity_id(&self, id: EntityId) -> Option<P> {
        self.storage
            .find_by_entity_id(id)
            .map(|i| self.storage.get_payload(i))
    }

    pub fn time_by_entity_id(&self, id: EntityId) -> Option<TimeFrameIndex> {
        self.storage
            .find_by_entity_id(id)
            .map(|i| self.storage.get_time(i))
    }

    pub fn elements(&self) -> Vec<(TimeFrameIndex, P)> {
        self.storage.iter().collect()
    }

    pub fn flattened_data(&self) -> Vec<(TimeFrameIndex, EntityId, P)> {
        (0..self.storage.size())
            .map(|i| {
                (
                    self.storage.get_time(i),
                    self.storage.get_entity_id(i),
                    self.storage.get_payload(i),
                )
            })
            .collect()
    }

    pub fn elements_in_range(&self, interval: TimeFrameInterval) -> Vec<(TimeFrameIndex, P)> {
        self.elements()
            .into_iter()
            .filter(|(t, _)| interval.contains(*t))
            .collect()
    }

    /// Converts `interval` from `src_frame` into this container's frame
    /// before filtering, the only sanctioned way to query across frames.
    pub fn elements_in_range_cross_frame(
        &self,
        interval: TimeFrameInterval,
        src_frame: &TimeFrame,
    ) -> Vec<(TimeFrameIndex, P)> {
        let converted = interval.convert(src_frame, &self.frame);
        self.elements_in_range(converted)
    }

    pub fn set_at_time(&self, t: TimeFrameIndex, values: Vec<(P, EntityId)>, notify: Notify) -> Result<()> {
        self.mutate(notify, |storage| {
            storage.remove_at_time(t)?;
            for (payload, id) in values {
                storage.append(t, payload, id)?;
            }
            Ok(())
        })
    }

    pub fn append_at_time(&self, t: TimeFrameIndex, payload: P, id: EntityId, notify: Notify) -> Result<()> {
        self.mutate(notify, |storage| storage.append(t, payload, id))
    }

    pub fn clear_at_time(&self, t: TimeFrameIndex, notify: Notify) -> Result<usize> {
        self.mutate(notify, |storage| storage.remove_at_time(t))
    }

    pub fn clear_all(&self, notify: Notify) -> Result<()> {
        self.mutate(notify, |storage| storage.clear())
    }

    pub fn clear_by_entity_id(&self, id: EntityId, notify: Notify) -> Result<bool> {
        self.mutate(notify, |storage| storage.remove_by_entity_id(id))
    }

    /// A scoped handle for mutating one element in place. Notifies
    /// observers and invalidates the fast-path cache on drop, on every
    /// exit path (including panics unwinding through it), matching the
    /// spec's `MutableDataHandle` (§5).
    pub fn get_mut_by_entity_id(&self, id: EntityId) -> Option<MutationHandle<'_, P>> {
        let idx = self.storage.find_by_entity_id(id)?;
        self.cache.lock().invalidate();
        let guard = self.storage.owning_write()?;
        Some(MutationHandle {
            base: self,
            guard,
            idx,
        })
    }
}

/// See [`SeriesBase::get_mut_by_entity_id`].
pub struct MutationHandle<'a, P: Clone> {
    base: &'a SeriesBase<P>,
    guard: parking_lot::RwLockWriteGuard<'a, crate::storage::OwningStorage<P>>,
    idx: usize,
}

impl<'a, P: Clone> Deref for MutationHandle<'a, P> {
    type Target = P;
    fn deref(&self) -> &P {
        self.guard.get_payload(self.idx)
    }
}

impl<'a, P: Clone> DerefMut for MutationHandle<'a, P> {
    fn deref_mut(&mut self) -> &mut P {
        // `OwningStorage` does not expose a direct `&mut P` accessor since
        // in-place mutation isn't part of its normal (append/remove) API;
        // a handle is the one place that needs it, so it reaches into the
        // backing slice directly via the write guard it already holds.
        &mut self.guard.payloads_mut()[self.idx]
    }
}

impl<'a, P: Clone> Drop for MutationHandle<'a, P> {
    fn drop(&mut self) {
        self.base.cache.lock().rebuild(&self.base.storage);
        self.base.notify(Notify::Yes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::OwningStorage;

    fn make_base() -> SeriesBase<f32> {
        let frame = Arc::new(TimeFrame::constant_step("f", 10, 0.0, 1.0));
        let mut owning = OwningStorage::with_frame(&frame);
        owning.append(TimeFrameIndex(0), 1.0, EntityId(0)).unwrap();
        owning.append(TimeFrameIndex(1), 2.0, EntityId(1)).unwrap();
        SeriesBase::new(frame, RaggedStorage::owning(owning))
    }

    #[test]
    fn clear_at_time_drops_time_from_index() {
        let base = make_base();
        assert_eq!(base.clear_at_time(TimeFrameIndex(0), Notify::No).unwrap(), 1);
        assert!(!base.times_with_data().contains(&TimeFrameIndex(0)));
    }

    #[test]
    fn observer_fires_on_notify() {
        let base = make_base();
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let f2 = Arc::clone(&fired);
        base.add_observer(Arc::new(move || {
            f2.store(true, std::sync::atomic::Ordering::SeqCst);
        }));
        base.clear_at_time(TimeFrameIndex(0), Notify::No).unwrap();
        assert!(!fired.load(std::sync::atomic::Ordering::SeqCst));
        base.clear_at_time(TimeFrameIndex(1), Notify::Yes).unwrap();
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn mutation_handle_notifies_on_drop() {
        let base = make_base();
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let f2 = Arc::clone(&fired);
        base.add_observer(Arc::new(move || {
            f2.store(true, std::sync::atomic::Ordering::SeqCst);
        }));
        {
            let mut handle = base.get_mut_by_entity_id(EntityId(0)).unwrap();
            *handle = 42.0;
        }
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(base.data_by_entity_id(EntityId(0)), Some(42.0));
    }
}
