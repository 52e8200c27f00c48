//! The error taxonomy for the whole crate.
//!
//! Every fallible operation in this crate returns [`EngineError`] (aliased as
//! [`Result`]). Variants line up one-to-one with the failure model described
//! by the spec this crate implements: storage failures, registry lookup
//! failures, binding failures, and the small number of runtime-only failures
//! (shape mismatch, cancellation, fatal invariant violations).

use crate::entity::EntityId;
use crate::time::TimeFrameIndex;

/// The crate-wide result alias. Prefer this over spelling out
/// `Result<T, EngineError>` at call sites.
pub type Result<T> = ::std::result::Result<T, EngineError>;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("attempted to mutate a read-only (view or lazy) storage backend")]
    ReadOnlyStorage,

    #[error("time {time:?} is out of range for the associated time frame (len={frame_len})")]
    TimeOutOfRange {
        time: TimeFrameIndex,
        frame_len: usize,
    },

    #[error("entity id {0:?} is already present in this container")]
    DuplicateEntityId(EntityId),

    #[error("no element with entity id {0:?} was found")]
    EntityNotFound(EntityId),

    #[error("expected storage backend payload type `{expected}`, found `{found}`")]
    BackendTypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("no transform is registered under the name `{0}`")]
    UnknownTransform(String),

    #[error("no range reduction is registered under the name `{0}`")]
    UnknownReduction(String),

    #[error("failed to parse parameters for `{transform}`: {source}")]
    ParameterParseError {
        transform: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("parameter binding referenced unknown value-store key `{0}`")]
    BindingMissingKey(String),

    #[error("parameter binding for field `{field}` could not convert store value into the parameter type: {reason}")]
    BindingTypeMismatch { field: String, reason: String },

    #[error("multi-input zip has incompatible cardinalities at time {time:?}: {counts:?}")]
    ShapeMismatch {
        time: TimeFrameIndex,
        counts: Vec<usize>,
    },

    #[error("operand time frames are incompatible and no converter was supplied")]
    TimeFrameMismatch,

    #[error("pipeline execution was cancelled")]
    Cancelled,

    #[error("invariant violated: {context}")]
    InvariantViolation { context: String },
}

impl EngineError {
    pub(crate) fn invariant(context: impl Into<String>) -> Self {
        Self::InvariantViolation {
            context: context.into(),
        }
    }
}
