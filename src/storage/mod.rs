//! The storage substrate: three interchangeable backends for every ragged
//! container, unified behind [`RaggedStorage`].
//!
//! The spec this crate implements describes a "fast-path cache" as a
//! struct of raw pointers into the owning backend, kept valid only when
//! reads can skip virtual dispatch. Rust's enum dispatch is already as
//! cheap as a raw-pointer read would be, so here the fast path is instead a
//! pair of safe borrowed slices handed out through [`FastPath`]; see
//! [`RaggedStorage::fast_path`]. [`FastPathCache`] is the small flag a
//! container keeps to avoid recomputing view contiguity on every read.

mod lazy;
mod owning;
mod view;

pub use lazy::LazyStorage;
pub use owning::OwningStorage;
pub use view::ViewStorage;

use crate::entity::EntityId;
use crate::error::{EngineError, Result};
use crate::time::TimeFrameIndex;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::ops::Range;
use std::sync::Arc;

/// A type-erased ragged storage, dispatched by an exhaustive match rather
/// than trait objects (spec §9: "prefer sum types over dynamic dispatch in
/// hot paths").
pub enum RaggedStorage<P> {
    Owning(Arc<RwLock<OwningStorage<P>>>),
    View(ViewStorage<P>),
    Lazy(LazyStorage<P>),
}

impl<P> RaggedStorage<P> {
    pub fn owning(storage: OwningStorage<P>) -> Self {
        Self::Owning(Arc::new(RwLock::new(storage)))
    }

    pub fn is_view(&self) -> bool {
        matches!(self, Self::View(_))
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, Self::Lazy(_))
    }

    pub fn is_owning(&self) -> bool {
        matches!(self, Self::Owning(_))
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Owning(s) => s.read().size(),
            Self::View(v) => v.size(),
            Self::Lazy(l) => l.size(),
        }
    }

    pub fn get_time(&self, i: usize) -> TimeFrameIndex {
        match self {
            Self::Owning(s) => s.read().get_time(i),
            Self::View(v) => v.get_time(i),
            Self::Lazy(l) => l.get_time(i),
        }
    }

    pub fn get_entity_id(&self, i: usize) -> EntityId {
        match self {
            Self::Owning(s) => s.read().get_entity_id(i),
            Self::View(v) => v.get_entity_id(i),
            Self::Lazy(l) => l.get_entity_id(i),
        }
    }
}

impl<P: Clone> RaggedStorage<P> {
    pub fn get_payload(&self, i: usize) -> P {
        match self {
            Self::Owning(s) => s.read().get_payload(i).clone(),
            Self::View(v) => v.source.read().get_payload(v.indices[i]).clone(),
            Self::Lazy(l) => l.get_payload(i),
        }
    }

    /// The `[start, end)` storage-index range carrying time `t`. For
    /// `Lazy` backends (which keep no index) this is an O(n) linear scan,
    /// acceptable because lazy sequences are consumed once and then
    /// materialized rather than repeatedly range-queried.
    pub fn time_range(&self, t: TimeFrameIndex) -> Range<usize> {
        match self {
            Self::Owning(s) => s.read().time_range(t),
            Self::View(v) => {
                let source = v.source.read();
                let mut start = None;
                let mut end = 0;
                for (i, &idx) in v.indices.iter().enumerate() {
                    if source.get_time(idx) == t {
                        if start.is_none() {
                            start = Some(i);
                        }
                        end = i + 1;
                    }
                }
                start.map_or(0..0, |s| s..end)
            }
            Self::Lazy(l) => {
                let mut start = None;
                let mut end = 0;
                for i in 0..l.size() {
                    if l.get_time(i) == t {
                        if start.is_none() {
                            start = Some(i);
                        }
                        end = i + 1;
                    }
                }
                start.map_or(0..0, |s| s..end)
            }
        }
    }

    pub fn times_with_data(&self) -> Vec<TimeFrameIndex> {
        match self {
            Self::Owning(s) => s.read().times_with_data().collect(),
            _ => {
                let mut times: Vec<TimeFrameIndex> =
                    (0..self.size()).map(|i| self.get_time(i)).collect();
                times.dedup();
                times
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (TimeFrameIndex, P)> + '_ {
        (0..self.size()).map(move |i| (self.get_time(i), self.get_payload(i)))
    }

    pub fn append(&self, t: TimeFrameIndex, payload: P, id: EntityId) -> Result<()> {
        match self {
            Self::Owning(s) => s.write().append(t, payload, id),
            Self::View(_) | Self::Lazy(_) => Err(EngineError::ReadOnlyStorage),
        }
    }

    pub fn remove_at_time(&self, t: TimeFrameIndex) -> Result<usize> {
        match self {
            Self::Owning(s) => Ok(s.write().remove_at_time(t)),
            Self::View(_) | Self::Lazy(_) => Err(EngineError::ReadOnlyStorage),
        }
    }

    pub fn remove_by_entity_id(&self, id: EntityId) -> Result<bool> {
        match self {
            Self::Owning(s) => Ok(s.write().remove_by_entity_id(id)),
            Self::View(_) | Self::Lazy(_) => Err(EngineError::ReadOnlyStorage),
        }
    }

    pub fn find_by_entity_id(&self, id: EntityId) -> Option<usize> {
        match self {
            Self::Owning(s) => s.read().find_by_entity_id(id),
            Self::View(v) => {
                let source = v.source.read();
                source
                    .find_by_entity_id(id)
                    .and_then(|src_idx| v.indices.iter().position(|&i| i == src_idx))
            }
            Self::Lazy(l) => (0..l.size()).find(|&i| l.get_entity_id(i) == id),
        }
    }

    pub fn clear(&self) -> Result<()> {
        match self {
            Self::Owning(s) => {
                s.write().clear();
                Ok(())
            }
            Self::View(_) | Self::Lazy(_) => Err(EngineError::ReadOnlyStorage),
        }
    }

    /// Borrows direct slices into the backing owning storage when doing so
    /// is safe: this is the Owning backend itself, or a contiguous View
    /// over it. Returns `None` for `Lazy` storage and non-contiguous
    /// Views, in which case callers fall back to [`Self::iter`].
    /// Direct write access to the backing owning storage, for callers that
    /// need to mutate a single element in place (e.g. a scoped
    /// get-mutable-by-id handle). `None` for View/Lazy backends.
    pub fn owning_write(&self) -> Option<RwLockWriteGuard<'_, OwningStorage<P>>> {
        match self {
            Self::Owning(s) => Some(s.write()),
            Self::View(_) | Self::Lazy(_) => None,
        }
    }

    pub fn fast_path(&self) -> Option<FastPath<'_, P>> {
        match self {
            Self::Owning(s) => Some(FastPath {
                guard: s.read(),
                offset: 0,
                len: None,
            }),
            Self::View(v) if v.is_contiguous() => Some(FastPath {
                guard: v.source.read(),
                offset: v.indices.first().copied().unwrap_or(0),
                len: Some(v.indices.len()),
            }),
            Self::View(_) | Self::Lazy(_) => None,
        }
    }
}

/// Borrowed slices into an owning backend, valid only while alive (it holds
/// the read lock). See [`RaggedStorage::fast_path`].
pub struct FastPath<'a, P> {
    guard: RwLockReadGuard<'a, OwningStorage<P>>,
    offset: usize,
    len: Option<usize>,
}

impl<'a, P> FastPath<'a, P> {
    fn len(&self) -> usize {
        self.len.unwrap_or_else(|| self.guard.size() - self.offset)
    }

    pub fn times(&self) -> &[TimeFrameIndex] {
        &self.guard.times_slice()[self.offset..self.offset + self.len()]
    }

    pub fn ids(&self) -> &[EntityId] {
        &self.guard.ids_slice()[self.offset..self.offset + self.len()]
    }

    pub fn payloads(&self) -> &[P] {
        &self.guard.payloads_slice()[self.offset..self.offset + self.len()]
    }
}

/// A cheap flag a container keeps beside its [`RaggedStorage`] so it
/// doesn't have to recompute view contiguity on every read. Mutations must
/// call [`Self::invalidate`] before writing and [`Self::rebuild`] after;
/// every mutating container method in this crate does so.
#[derive(Copy, Clone, Debug)]
pub struct FastPathCache {
    valid: bool,
    len: usize,
}

impl Default for FastPathCache {
    fn default() -> Self {
        Self {
            valid: false,
            len: 0,
        }
    }
}

impl FastPathCache {
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn rebuild<P>(&mut self, storage: &RaggedStorage<P>) {
        self.len = storage.size();
        self.valid = !storage.is_lazy()
            && match storage {
                RaggedStorage::View(v) => v.is_contiguous(),
                _ => true,
            };
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn len(&self) -> usize {
        self.len
    }
}
