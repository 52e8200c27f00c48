//! The lineage subsystem (§3.6, §4.7): recorded provenance between derived
//! containers and their sources, plus a resolver that answers "which source
//! entities produced this derived value?" across multi-step pipelines.

mod resolver;

pub use resolver::{EntityDataSource, InMemoryEntityDataSource, LineageResolver};

use crate::entity::EntityId;
use ahash::AHashMap;
use std::collections::HashSet;
use tracing::warn;

/// A derived container's relationship to its source(s) (spec §3.6). The
/// full 8-variant tag, as opposed to [`crate::registry::LineageClass`]'s
/// restricted subset a transform can claim automatically — `MultiSource`,
/// `Explicit`, `EntityMapped`, and `ImplicitEntityMap` lineage must be
/// recorded by hand.
#[derive(Clone, Debug)]
pub enum Lineage {
    Source,
    OneToOneByTime {
        source: String,
    },
    AllToOneByTime {
        source: String,
    },
    Subset {
        source: String,
        included: HashSet<EntityId>,
        filtered_from: Option<String>,
    },
    MultiSource {
        sources: Vec<String>,
        strategy: MultiSourceStrategy,
    },
    Explicit {
        source: String,
        contributors: Vec<Vec<EntityId>>,
    },
    EntityMapped {
        source: String,
        map: AHashMap<EntityId, Vec<EntityId>>,
    },
    ImplicitEntityMap {
        source: String,
        cardinality: Cardinality,
    },
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MultiSourceStrategy {
    ZipByTime,
    Cartesian,
    Custom,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Cardinality {
    OneToOne,
    ManyToOne,
    OneToMany,
}

impl Lineage {
    /// The source container keys this lineage references, in declaration
    /// order. Empty for `Source`.
    pub fn source_keys(&self) -> Vec<&str> {
        match self {
            Self::Source => vec![],
            Self::OneToOneByTime { source }
            | Self::AllToOneByTime { source }
            | Self::Subset { source, .. }
            | Self::Explicit { source, .. }
            | Self::EntityMapped { source, .. }
            | Self::ImplicitEntityMap { source, .. } => vec![source.as_str()],
            Self::MultiSource { sources, .. } => sources.iter().map(String::as_str).collect(),
        }
    }
}

/// A process-wide timestamp surrogate: lineage entries need something
/// orderable to record "last validated", but this crate never touches the
/// system clock internally (see workflow rules on `Date.now`-equivalents in
/// embedding hosts); callers supply their own monotonic counter or wall
/// clock reading.
pub type Timestamp = u64;

pub struct LineageEntry {
    pub descriptor: Lineage,
    pub is_stale: bool,
    pub last_validated: Timestamp,
}

/// The kind of change that triggered an invalidation edge, passed to a
/// registered `invalidation_callback`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum InvalidationChangeType {
    Added,
    Removed,
    Modified,
    IdsChanged,
}

pub type InvalidationCallback = Box<dyn Fn(&str, &str, InvalidationChangeType) + Send + Sync>;

/// Stores, per container name, a [`LineageEntry`]. Staleness propagates
/// transitively: marking `k` stale also marks every key whose lineage names
/// `k` among its sources, recursively.
#[derive(Default)]
pub struct LineageRegistry {
    entries: AHashMap<String, LineageEntry>,
    callbacks: Vec<InvalidationCallback>,
}

impl LineageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, descriptor: Lineage, validated_at: Timestamp) {
        let key = key.into();
        if let Some(existing) = self.entries.get(&key) {
            if existing.is_stale {
                warn!(container = %key, "overwriting a stale lineage entry without running invalidation callbacks");
            }
        }
        self.entries.insert(
            key,
            LineageEntry {
                descriptor,
                is_stale: false,
                last_validated: validated_at,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&LineageEntry> {
        self.entries.get(key)
    }

    pub fn is_stale(&self, key: &str) -> bool {
        self.entries.get(key).map(|e| e.is_stale).unwrap_or(false)
    }

    pub fn on_invalidation(&mut self, callback: InvalidationCallback) {
        self.callbacks.push(callback);
    }

    /// Flips `key`'s stale flag and recursively marks every descendant
    /// (every key whose descriptor names `key` among its sources). Fires
    /// `invalidation_callback` once per `(derived, source)` edge walked.
    pub fn mark_stale(&mut self, key: &str, change: InvalidationChangeType) {
        let mut frontier = vec![key.to_string()];
        let mut visited: HashSet<String> = HashSet::new();
        while let Some(current) = frontier.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(entry) = self.entries.get_mut(&current) {
                entry.is_stale = true;
            }
            let descendants: Vec<String> = self
                .entries
                .iter()
                .filter(|(_, entry)| entry.descriptor.source_keys().contains(&current.as_str()))
                .map(|(k, _)| k.clone())
                .collect();
            for descendant in descendants {
                for cb in &self.callbacks {
                    cb(&descendant, &current, change);
                }
                frontier.push(descendant);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_stale_propagates_to_descendants() {
        let mut reg = LineageRegistry::new();
        reg.insert("masks", Lineage::Source, 0);
        reg.insert(
            "areas",
            Lineage::OneToOneByTime {
                source: "masks".to_string(),
            },
            0,
        );
        reg.insert(
            "peaks",
            Lineage::AllToOneByTime {
                source: "areas".to_string(),
            },
            0,
        );
        reg.mark_stale("masks", InvalidationChangeType::Modified);
        assert!(reg.is_stale("masks"));
        assert!(reg.is_stale("areas"));
        assert!(reg.is_stale("peaks"));
    }

    #[test]
    fn mark_stale_handles_cycles_without_hanging() {
        let mut reg = LineageRegistry::new();
        reg.insert(
            "a",
            Lineage::OneToOneByTime {
                source: "b".to_string(),
            },
            0,
        );
        reg.insert(
            "b",
            Lineage::OneToOneByTime {
                source: "a".to_string(),
            },
            0,
        );
        reg.mark_stale("a", InvalidationChangeType::Modified);
        assert!(reg.is_stale("a"));
        assert!(reg.is_stale("b"));
    }
}
