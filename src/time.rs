//! Strongly typed time: [`TimeFrame`], [`TimeFrameIndex`], and the single
//! sanctioned way to convert an index from one frame into another.

use std::cmp::Ordering;

/// A position inside a specific, named [`TimeFrame`].
///
/// This is a thin newtype over `i64` so that indices from different frames
/// can't be accidentally compared or added together; arithmetic between
/// indices of different frames is a type error waiting to happen in a
/// stringly-typed system, so we make it a real one here.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, serde::Serialize, serde::Deserialize)]
#[repr(transparent)]
pub struct TimeFrameIndex(pub i64);

impl TimeFrameIndex {
    #[inline]
    pub fn new(i: i64) -> Self {
        Self(i)
    }

    #[inline]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for TimeFrameIndex {
    #[inline]
    fn from(i: i64) -> Self {
        Self(i)
    }
}

impl nohash_hasher::IsEnabled for TimeFrameIndex {}

/// An ordered, monotonic mapping from index to real-valued time.
///
/// Construction guarantees the times are non-decreasing; [`index_at_time`]
/// binary-searches that invariant to answer the inverse query.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeFrame {
    name: String,
    times: Vec<f64>,
}

impl TimeFrame {
    /// Builds a frame from an explicit, already-ascending list of times.
    ///
    /// Panics if `times` is not non-decreasing; callers loading data from an
    /// external source are expected to validate (or sort) before calling
    /// this, the same way the teacher's own index types assume sorted input.
    pub fn new(name: impl Into<String>, times: Vec<f64>) -> Self {
        debug_assert!(
            times.windows(2).all(|w| w[0] <= w[1]),
            "TimeFrame times must be non-decreasing"
        );
        Self {
            name: name.into(),
            times,
        }
    }

    /// Builds a frame of `n` samples starting at `start` with a fixed `step`.
    /// Convenient for tests and for frames derived from a constant sample rate.
    pub fn constant_step(name: impl Into<String>, n: usize, start: f64, step: f64) -> Self {
        let times = (0..n).map(|i| start + i as f64 * step).collect();
        Self::new(name, times)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    #[inline]
    pub fn contains_index(&self, i: TimeFrameIndex) -> bool {
        i.0 >= 0 && (i.0 as usize) < self.times.len()
    }

    /// The real-valued time at `i`. Panics if `i` is out of range; callers
    /// that need a checked variant should go through the container layer,
    /// which validates against the frame before indexing.
    pub fn time_at_index(&self, i: TimeFrameIndex) -> f64 {
        self.times[i.0 as usize]
    }

    /// The index whose time is closest to (and not after) `t`, via binary
    /// search. Ties resolve to the first index carrying exactly `t`.
    pub fn index_at_time(&self, t: f64) -> TimeFrameIndex {
        match self
            .times
            .binary_search_by(|probe| probe.partial_cmp(&t).unwrap_or(Ordering::Less))
        {
            Ok(mut i) => {
                while i > 0 && self.times[i - 1] == t {
                    i -= 1;
                }
                TimeFrameIndex(i as i64)
            }
            // `i` is the insertion point binary_search_by returns for a miss,
            // i.e. the first index whose time is strictly greater than `t` -
            // a ceiling. Floor semantics want the index just before that.
            Err(0) => TimeFrameIndex(0),
            Err(i) => TimeFrameIndex((i - 1) as i64),
        }
    }
}

/// A [`TimeFrameIndex`] bundled with the frame it belongs to, so that a
/// value can be converted into another frame without the caller having to
/// separately track which frame it came from.
pub struct TimeIndexAndFrame<'f> {
    pub index: TimeFrameIndex,
    pub frame: &'f TimeFrame,
}

impl<'f> TimeIndexAndFrame<'f> {
    pub fn new(index: TimeFrameIndex, frame: &'f TimeFrame) -> Self {
        Self { index, frame }
    }

    /// Converts this index into `dst`, the only sanctioned way to cross
    /// frames: `dst.index_at_time(self.frame.time_at_index(self.index))`.
    /// When `dst` is the same frame (by name), the index is returned as-is
    /// without round-tripping through `f64`, satisfying the frame-conversion
    /// identity property exactly (no floating point noise).
    pub fn convert_to(&self, dst: &TimeFrame) -> TimeFrameIndex {
        if dst.name == self.frame.name {
            return self.index;
        }
        let t = self.frame.time_at_index(self.index);
        dst.index_at_time(t)
    }
}

/// An end-inclusive range of [`TimeFrameIndex`] within one (implicit) frame.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct TimeFrameInterval {
    pub start: TimeFrameIndex,
    pub end: TimeFrameIndex,
}

impl TimeFrameInterval {
    pub fn new(start: TimeFrameIndex, end: TimeFrameIndex) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn contains(&self, i: TimeFrameIndex) -> bool {
        i >= self.start && i <= self.end
    }

    /// Converts both endpoints from `src` into `dst`, in the only sanctioned
    /// way (§3.1): each endpoint is independently translated via real time.
    pub fn convert(&self, src: &TimeFrame, dst: &TimeFrame) -> TimeFrameInterval {
        TimeFrameInterval {
            start: TimeIndexAndFrame::new(self.start, src).convert_to(dst),
            end: TimeIndexAndFrame::new(self.end, src).convert_to(dst),
        }
    }
}
