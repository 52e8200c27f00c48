//! The transform and reduction registries (§4.3, §4.6): global maps from
//! name to metadata plus a type-erased callable, populated at process
//! startup via [`inventory`] self-registration and, for tests and dynamic
//! callers, a runtime [`TransformRegistry::register`] escape hatch.
//!
//! Parameters are the one place this crate reaches for `Box<dyn Any>`: the
//! element/container payload types are a small closed set (see
//! [`crate::payload`]) and are dispatched by match, but parameter types are
//! genuinely open-ended, so the registry stores a `JSON -> Any` parser
//! alongside each transform and pattern-matches it back to a concrete type
//! only inside that transform's own closure (spec §9, "reflection
//! substitute").

mod reductions;
mod transforms;

pub use reductions::{ReductionEntry, ReductionFn, ReductionKind, ReductionMetadata, ReductionRegistry};
pub use transforms::{
    ContainerTransformFn, ElementTransformFn, LineageClass, TimeGroupedTransformFn,
    TransformEntry, TransformKind, TransformMetadata, TransformRegistry,
};

inventory::collect!(TransformRegistration);
inventory::collect!(ReductionRegistration);

/// A compile-time-submitted transform factory; see `inventory::submit!` call
/// sites in [`crate::builtin`].
pub struct TransformRegistration(pub fn() -> TransformEntry);

/// A compile-time-submitted reduction factory; see `inventory::submit!` call
/// sites in [`crate::builtin`].
pub struct ReductionRegistration(pub fn() -> ReductionEntry);
