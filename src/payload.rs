//! [`Payload`]: the closed sum of element payload types the transform
//! registry and pipeline runtime operate on.
//!
//! The spec calls for "type erasure without inheritance": a tagged sum
//! dispatched by exhaustive match rather than trait objects. Container
//! payload types are a small closed set (§3.3), so the pipeline runtime
//! represents any single element's payload as one `Payload` value rather
//! than reaching for `Box<dyn Any>` at this layer; `Any` is reserved for
//! transform *parameters*, which are genuinely open-ended (see
//! [`crate::registry`]).

use crate::element::{Interval, Line2D, Mask2D, Point2D};

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Scalar(f32),
    Unit,
    Interval(Interval),
    Point(Point2D),
    Line(Line2D),
    Mask(Mask2D),
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum PayloadKind {
    Scalar,
    Unit,
    Interval,
    Point,
    Line,
    Mask,
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Scalar(_) => PayloadKind::Scalar,
            Self::Unit => PayloadKind::Unit,
            Self::Interval(_) => PayloadKind::Interval,
            Self::Point(_) => PayloadKind::Point,
            Self::Line(_) => PayloadKind::Line,
            Self::Mask(_) => PayloadKind::Mask,
        }
    }

    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_mask(&self) -> Option<&Mask2D> {
        match self {
            Self::Mask(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_line(&self) -> Option<&Line2D> {
        match self {
            Self::Line(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_point(&self) -> Option<&Point2D> {
        match self {
            Self::Point(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_interval(&self) -> Option<Interval> {
        match self {
            Self::Interval(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<f32> for Payload {
    fn from(v: f32) -> Self {
        Self::Scalar(v)
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Self::Unit
    }
}

impl From<Interval> for Payload {
    fn from(i: Interval) -> Self {
        Self::Interval(i)
    }
}

impl From<Point2D> for Payload {
    fn from(p: Point2D) -> Self {
        Self::Point(p)
    }
}

impl From<Line2D> for Payload {
    fn from(l: Line2D) -> Self {
        Self::Line(l)
    }
}

impl From<Mask2D> for Payload {
    fn from(m: Mask2D) -> Self {
        Self::Mask(m)
    }
}

/// A single `(time, entity id, payload)` element flowing through the
/// pipeline runtime; the generic analogue of a concrete container's
/// elements used while lazy views are composed (spec §4.4).
#[derive(Clone, Debug, PartialEq)]
pub struct GenericElement {
    pub time: crate::time::TimeFrameIndex,
    pub id: crate::entity::EntityId,
    pub payload: Payload,
}
