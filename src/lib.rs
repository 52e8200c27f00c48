//! A typed, lineage-tracking transformation engine for heterogeneous
//! time-series data: scalar signals, ragged multi-value signals, discrete
//! events, time intervals, and 2D geometry.
//!
//! * See [`container`] for the five container categories every pipeline
//!   reads and writes.
//! * See [`registry`] and [`pipeline`] for how a JSON pipeline document
//!   becomes a materialized container.
//! * See [`lineage`] for recording and resolving which source entities
//!   produced a derived value.
//! * See [`gather`] for slicing a container by a set of trial intervals and
//!   running the pipeline machinery per trial.
//!
//! ## Feature flags
//!
//! - `builtin-transforms` — links a small, explicitly scoped catalog of
//!   concrete transforms (`mask_area`, `z_score`, ...) and the full range
//!   reduction catalog (`mean_value`, `event_count`, ...). Disable to link
//!   only the registry and runtime with no demo transforms registered.

#[cfg(feature = "builtin-transforms")]
pub mod builtin;
pub mod container;
pub mod context;
pub mod element;
pub mod entity;
pub mod error;
pub mod gather;
pub mod lineage;
pub mod payload;
pub mod pipeline;
pub mod registry;
pub mod storage;
pub mod time;
pub mod value_store;

pub use context::Context;
pub use entity::{EntityId, EntityKind, EntityRegistry};
pub use error::{EngineError, Result};
pub use gather::GatherResult;
pub use lineage::{Lineage, LineageRegistry, LineageResolver};
pub use pipeline::Pipeline;
pub use time::{TimeFrame, TimeFrameIndex, TimeFrameInterval};
pub use value_store::PipelineValueStore;
