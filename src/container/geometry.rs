//! [`GeometrySeries`]: ragged, entity-bearing `TimeFrameIndex -> [GeometryEntry<T>]`
//! for points, lines, and masks.

use super::{Notify, SeriesBase};
use crate::element::GeometryEntry;
use crate::entity::{EntityId, EntityKind, EntityRegistry};
use crate::error::Result;
use crate::storage::{OwningStorage, RaggedStorage};
use crate::time::{TimeFrame, TimeFrameIndex};
use std::sync::Arc;

pub struct GeometrySeries<T: Clone> {
    base: SeriesBase<T>,
    data_key: String,
    kind: EntityKind,
}

impl<T: Clone> GeometrySeries<T> {
    pub fn new(data_key: impl Into<String>, kind: EntityKind, frame: Arc<TimeFrame>) -> Self {
        let storage = RaggedStorage::owning(OwningStorage::with_frame(&frame));
        Self {
            base: SeriesBase::new(frame, storage),
            data_key: data_key.into(),
            kind,
        }
    }

    pub fn from_storage(
        data_key: impl Into<String>,
        kind: EntityKind,
        frame: Arc<TimeFrame>,
        storage: RaggedStorage<T>,
    ) -> Self {
        Self {
            base: SeriesBase::new(frame, storage),
            data_key: data_key.into(),
            kind,
        }
    }

    pub fn base(&self) -> &SeriesBase<T> {
        &self.base
    }

    pub fn size(&self) -> usize {
        self.base.size()
    }

    pub fn at_time(&self, t: TimeFrameIndex) -> Vec<T> {
        self.base.at_time(t)
    }

    pub fn entries(&self) -> Vec<GeometryEntry<T>> {
        self.base
            .flattened_data()
            .into_iter()
            .map(|(time, id, payload)| GeometryEntry { time, id, payload })
            .collect()
    }

    pub fn append(
        &self,
        registry: &mut EntityRegistry,
        t: TimeFrameIndex,
        payload: T,
        notify: Notify,
    ) -> Result<EntityId> {
        let local_index = self.base.at_time(t).len();
        let id = registry.assign(&self.data_key, self.kind, t, local_index);
        self.base.append_at_time(t, payload, id, notify)?;
        Ok(id)
    }
}
