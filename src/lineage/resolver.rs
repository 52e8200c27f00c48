//! [`LineageResolver`]: answers "which source entities produced this
//! derived element?" by dispatching on the lineage variant recorded for a
//! container key (spec §4.7).

use super::{Cardinality, Lineage, LineageRegistry};
use crate::entity::EntityId;
use crate::time::TimeFrameIndex;
use ahash::AHashMap;
use std::collections::HashSet;

/// The narrow interface the resolver needs from whatever stores actual
/// container data. The core never reaches into a concrete container type
/// directly here (spec §1's Non-goals: the surrounding key/value store is
/// external); it only asks this trait.
pub trait EntityDataSource {
    fn entity_ids(&self, key: &str, time: TimeFrameIndex, local_idx: usize) -> Vec<EntityId>;
    fn all_entity_ids_at_time(&self, key: &str, time: TimeFrameIndex) -> Vec<EntityId>;
    fn all_entity_ids(&self, key: &str) -> HashSet<EntityId>;
    fn element_count(&self, key: &str, time: TimeFrameIndex) -> usize;
}

/// A reference [`EntityDataSource`] backed by plain in-memory maps, used by
/// this crate's own tests in place of an external DataManager.
#[derive(Default)]
pub struct InMemoryEntityDataSource {
    // key -> time -> ordered ids at that time (index = local_idx)
    data: AHashMap<String, AHashMap<TimeFrameIndex, Vec<EntityId>>>,
}

impl InMemoryEntityDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, time: TimeFrameIndex, ids: Vec<EntityId>) {
        self.data.entry(key.into()).or_default().insert(time, ids);
    }
}

impl EntityDataSource for InMemoryEntityDataSource {
    fn entity_ids(&self, key: &str, time: TimeFrameIndex, local_idx: usize) -> Vec<EntityId> {
        self.data
            .get(key)
            .and_then(|by_time| by_time.get(&time))
            .and_then(|ids| ids.get(local_idx))
            .map(|id| vec![*id])
            .unwrap_or_default()
    }

    fn all_entity_ids_at_time(&self, key: &str, time: TimeFrameIndex) -> Vec<EntityId> {
        self.data
            .get(key)
            .and_then(|by_time| by_time.get(&time))
            .cloned()
            .unwrap_or_default()
    }

    fn all_entity_ids(&self, key: &str) -> HashSet<EntityId> {
        self.data
            .get(key)
            .map(|by_time| by_time.values().flatten().copied().collect())
            .unwrap_or_default()
    }

    fn element_count(&self, key: &str, time: TimeFrameIndex) -> usize {
        self.data
            .get(key)
            .and_then(|by_time| by_time.get(&time))
            .map(|ids| ids.len())
            .unwrap_or(0)
    }
}

/// How [`LineageResolver::resolve_to_root`] should fetch ids for a
/// frontier key once it reaches a leaf: either the single entity at a
/// remembered `local_idx`, or every entity recorded at that time.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum FetchMode {
    All,
    Local(usize),
}

pub struct LineageResolver<'a, D: EntityDataSource> {
    registry: &'a LineageRegistry,
    data: &'a D,
}

impl<'a, D: EntityDataSource> LineageResolver<'a, D> {
    pub fn new(registry: &'a LineageRegistry, data: &'a D) -> Self {
        Self { registry, data }
    }

    /// One-step resolution, dispatched on `key`'s recorded lineage variant.
    /// Returns an empty vec if `key` has no lineage entry.
    pub fn resolve_to_source(&self, key: &str, time: TimeFrameIndex, local_idx: usize) -> Vec<EntityId> {
        let Some(entry) = self.registry.get(key) else {
            return Vec::new();
        };
        match &entry.descriptor {
            Lineage::Source => self.data.entity_ids(key, time, local_idx),
            Lineage::OneToOneByTime { source } => self.data.entity_ids(source, time, local_idx),
            Lineage::AllToOneByTime { source } => self.data.all_entity_ids_at_time(source, time),
            Lineage::Subset { source, included, .. } => self
                .data
                .entity_ids(source, time, local_idx)
                .into_iter()
                .filter(|id| included.contains(id))
                .collect(),
            Lineage::MultiSource { sources, .. } => {
                let mut seen = HashSet::new();
                let mut out = Vec::new();
                for source in sources {
                    for id in self.data.entity_ids(source, time, local_idx) {
                        if seen.insert(id) {
                            out.push(id);
                        }
                    }
                }
                out
            }
            Lineage::Explicit { contributors, .. } => {
                contributors.get(local_idx).cloned().unwrap_or_default()
            }
            Lineage::EntityMapped { .. } => Vec::new(),
            Lineage::ImplicitEntityMap { source, cardinality } => match cardinality {
                Cardinality::OneToOne => self.data.entity_ids(source, time, local_idx),
                Cardinality::ManyToOne => self.data.all_entity_ids_at_time(source, time),
                Cardinality::OneToMany => self.data.entity_ids(source, time, local_idx),
            },
        }
    }

    /// BFS over the lineage graph down to `Source` nodes. A cycle (detected
    /// via a visited set keyed by container name) short-circuits to the
    /// current node's own ids rather than hanging. Source names with no
    /// recorded lineage entry are included as opaque leaves.
    ///
    /// Each frontier entry carries a [`FetchMode`] alongside the container
    /// key: crossing an `AllToOneByTime` edge switches its downstream
    /// traversal to "every entity at this time" rather than the single
    /// `local_idx` the caller started with, since that's what the edge
    /// means - every source entity at that time contributed to the
    /// collapsed value. Other edge kinds preserve whatever mode they were
    /// reached with.
    pub fn resolve_to_root(&self, key: &str, time: TimeFrameIndex, local_idx: usize) -> Vec<EntityId> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut seen_ids: HashSet<EntityId> = HashSet::new();
        let mut out = Vec::new();
        let mut frontier = vec![(key.to_string(), FetchMode::Local(local_idx))];

        while let Some((current, mode)) = frontier.pop() {
            if !visited.insert(current.clone()) {
                for id in self.fetch_ids(&current, time, mode) {
                    if seen_ids.insert(id) {
                        out.push(id);
                    }
                }
                continue;
            }
            match self.registry.get(&current) {
                None | Some(super::LineageEntry { descriptor: Lineage::Source, .. }) => {
                    for id in self.fetch_ids(&current, time, mode) {
                        if seen_ids.insert(id) {
                            out.push(id);
                        }
                    }
                }
                Some(entry) => match &entry.descriptor {
                    Lineage::Source => unreachable!("handled above"),
                    Lineage::AllToOneByTime { source } => {
                        frontier.push((source.clone(), FetchMode::All));
                    }
                    Lineage::ImplicitEntityMap { source, cardinality: Cardinality::ManyToOne } => {
                        frontier.push((source.clone(), FetchMode::All));
                    }
                    Lineage::MultiSource { sources, .. } => {
                        for source in sources {
                            frontier.push((source.clone(), mode));
                        }
                    }
                    _ => {
                        for source in entry.descriptor.source_keys() {
                            frontier.push((source.to_string(), mode));
                        }
                    }
                },
            }
        }
        out
    }

    fn fetch_ids(&self, key: &str, time: TimeFrameIndex, mode: FetchMode) -> Vec<EntityId> {
        match mode {
            FetchMode::All => self.data.all_entity_ids_at_time(key, time),
            FetchMode::Local(idx) => self.data.entity_ids(key, time, idx),
        }
    }

    pub fn resolve_by_entity_id(&self, key: &str, derived_id: EntityId) -> Vec<EntityId> {
        let Some(entry) = self.registry.get(key) else {
            return Vec::new();
        };
        match &entry.descriptor {
            Lineage::EntityMapped { map, .. } => map.get(&derived_id).cloned().unwrap_or_default(),
            Lineage::ImplicitEntityMap { .. } => Vec::new(),
            _ => Vec::new(),
        }
    }

    /// BFS-ordered list of container keys from `key` to its roots,
    /// `key` included first.
    pub fn get_lineage_chain(&self, key: &str) -> Vec<String> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut order = Vec::new();
        let mut frontier = std::collections::VecDeque::new();
        frontier.push_back(key.to_string());

        while let Some(current) = frontier.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            order.push(current.clone());
            if let Some(entry) = self.registry.get(&current) {
                for source in entry.descriptor.source_keys() {
                    frontier.push_back(source.to_string());
                }
            }
        }
        order
    }

    /// Union of every id the data source reports for every key reachable
    /// from `key` (including `key` itself).
    pub fn get_all_source_entities(&self, key: &str) -> HashSet<EntityId> {
        self.get_lineage_chain(key)
            .iter()
            .flat_map(|k| self.data.all_entity_ids(k))
            .collect()
    }
}
