use crate::context::Context;
use crate::element::{Line2D, Mask2D, Point2D};
use crate::error::{EngineError, Result};
use crate::payload::{GenericElement, Payload, PayloadKind};
use crate::registry::{
    LineageClass, TransformEntry, TransformMetadata, TransformRegistration, TransformRegistry,
};
use crate::time::TimeFrameIndex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

fn downcast<'a, T: 'static>(transform: &'static str, params: &'a dyn Any) -> Result<&'a T> {
    params
        .downcast_ref::<T>()
        .ok_or_else(|| EngineError::invariant(format!("{transform}: params downcast failed")))
}

fn parser<T>(transform_name: &'static str) -> impl Fn(&serde_json::Value) -> std::result::Result<Box<dyn Any + Send + Sync>, serde_json::Error>
where
    T: for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    move |json| {
        let _ = transform_name;
        let parsed: T = serde_json::from_value(json.clone())?;
        Ok(Box::new(parsed) as Box<dyn Any + Send + Sync>)
    }
}

fn default_json<T: Default + Serialize>() -> serde_json::Value {
    serde_json::to_value(T::default()).unwrap_or(serde_json::Value::Null)
}

// ---- mask_area ------------------------------------------------------------

#[derive(Default, Serialize, Deserialize)]
pub struct MaskAreaParams {}

fn mask_area_entry() -> TransformEntry {
    TransformEntry::element(
        TransformMetadata {
            name: "mask_area",
            category: "geometry",
            description: "pixel count of a binary mask",
            input_types: vec![PayloadKind::Mask],
            output_type: PayloadKind::Scalar,
            lineage_class: LineageClass::OneToOneByTime,
            arity: 1,
            expensive: false,
            deterministic: true,
            context_bindings: vec![],
        },
        Arc::new(|_time: TimeFrameIndex, inputs: &[Payload], params: &dyn Any| {
            let _: &MaskAreaParams = downcast("mask_area", params)?;
            let mask: &Mask2D = inputs
                .first()
                .and_then(Payload::as_mask)
                .ok_or_else(|| EngineError::invariant("mask_area expects a Mask2D input"))?;
            Ok(Payload::Scalar(mask.area()))
        }),
        Arc::new(parser::<MaskAreaParams>("mask_area")),
        Arc::new(default_json::<MaskAreaParams>),
    )
}

inventory::submit! { TransformRegistration(mask_area_entry) }

// ---- sum_reduction (time-grouped) -----------------------------------------

#[derive(Default, Serialize, Deserialize)]
pub struct SumReductionParams {}

fn sum_reduction_entry() -> TransformEntry {
    TransformEntry::time_grouped(
        TransformMetadata {
            name: "sum_reduction",
            category: "reduction",
            description: "sums every ragged value at a time into one scalar",
            input_types: vec![PayloadKind::Scalar],
            output_type: PayloadKind::Scalar,
            lineage_class: LineageClass::AllToOneByTime,
            arity: 1,
            expensive: false,
            deterministic: true,
            context_bindings: vec![],
        },
        Arc::new(|group: &[Payload], params: &dyn Any| {
            let _: &SumReductionParams = downcast("sum_reduction", params)?;
            let sum: f32 = group.iter().filter_map(Payload::as_scalar).sum();
            Ok(vec![Payload::Scalar(sum)])
        }),
        Arc::new(parser::<SumReductionParams>("sum_reduction")),
        Arc::new(default_json::<SumReductionParams>),
    )
}

inventory::submit! { TransformRegistration(sum_reduction_entry) }

// ---- line_point_distance (binary element transform) -----------------------

#[derive(Default, Serialize, Deserialize)]
pub struct LinePointDistanceParams {}

fn point_segment_distance(p: Point2D, a: Point2D, b: Point2D) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f32::EPSILON {
        return ((p.x - a.x).powi(2) + (p.y - a.y).powi(2)).sqrt();
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    let proj = Point2D::new(a.x + t * dx, a.y + t * dy);
    ((p.x - proj.x).powi(2) + (p.y - proj.y).powi(2)).sqrt()
}

fn line_point_distance(line: &Line2D, point: Point2D) -> f32 {
    if line.points.is_empty() {
        return f32::INFINITY;
    }
    if line.points.len() == 1 {
        let a = line.points[0];
        return ((point.x - a.x).powi(2) + (point.y - a.y).powi(2)).sqrt();
    }
    line.points
        .windows(2)
        .map(|w| point_segment_distance(point, w[0], w[1]))
        .fold(f32::INFINITY, f32::min)
}

fn line_point_distance_entry() -> TransformEntry {
    TransformEntry::element(
        TransformMetadata {
            name: "line_point_distance",
            category: "geometry",
            description: "minimum distance from a point to a polyline",
            input_types: vec![PayloadKind::Line, PayloadKind::Point],
            output_type: PayloadKind::Scalar,
            lineage_class: LineageClass::None,
            arity: 2,
            expensive: false,
            deterministic: true,
            context_bindings: vec![],
        },
        Arc::new(|_time: TimeFrameIndex, inputs: &[Payload], params: &dyn Any| {
            let _: &LinePointDistanceParams = downcast("line_point_distance", params)?;
            let line = inputs
                .first()
                .and_then(Payload::as_line)
                .ok_or_else(|| EngineError::invariant("line_point_distance expects a Line2D as input 0"))?;
            let point = inputs
                .get(1)
                .and_then(Payload::as_point)
                .ok_or_else(|| EngineError::invariant("line_point_distance expects a Point2D as input 1"))?;
            Ok(Payload::Scalar(line_point_distance(line, *point)))
        }),
        Arc::new(parser::<LinePointDistanceParams>("line_point_distance")),
        Arc::new(default_json::<LinePointDistanceParams>),
    )
}

inventory::submit! { TransformRegistration(line_point_distance_entry) }

// ---- z_score ----------------------------------------------------------------

#[derive(Clone, Serialize, Deserialize)]
pub struct ZScoreParams {
    #[serde(default)]
    pub mean: f64,
    #[serde(default = "default_std_dev")]
    pub std_dev: f64,
    #[serde(default)]
    pub clamp_outliers: bool,
    #[serde(default = "default_outlier_threshold")]
    pub outlier_threshold: f64,
}

fn default_std_dev() -> f64 {
    1.0
}

fn default_outlier_threshold() -> f64 {
    3.0
}

impl Default for ZScoreParams {
    fn default() -> Self {
        Self {
            mean: 0.0,
            std_dev: 1.0,
            clamp_outliers: false,
            outlier_threshold: 3.0,
        }
    }
}

fn z_score_entry() -> TransformEntry {
    TransformEntry::element(
        TransformMetadata {
            name: "z_score",
            category: "statistics",
            description: "normalizes a scalar by a bound mean/std_dev, with optional outlier clamping",
            input_types: vec![PayloadKind::Scalar],
            output_type: PayloadKind::Scalar,
            lineage_class: LineageClass::OneToOneByTime,
            arity: 1,
            expensive: false,
            deterministic: true,
            context_bindings: vec!["mean", "std_dev"],
        },
        Arc::new(|_time: TimeFrameIndex, inputs: &[Payload], params: &dyn Any| {
            let p: &ZScoreParams = downcast("z_score", params)?;
            let v = inputs
                .first()
                .and_then(Payload::as_scalar)
                .ok_or_else(|| EngineError::invariant("z_score expects a scalar input"))?;
            let std_dev = if p.std_dev.abs() < f64::EPSILON { 1.0 } else { p.std_dev };
            let mut z = (v as f64 - p.mean) / std_dev;
            if p.clamp_outliers {
                z = z.clamp(-p.outlier_threshold, p.outlier_threshold);
            }
            Ok(Payload::Scalar(z as f32))
        }),
        Arc::new(parser::<ZScoreParams>("z_score")),
        Arc::new(default_json::<ZScoreParams>),
    )
}

inventory::submit! { TransformRegistration(z_score_entry) }

// ---- normalize_event_time ---------------------------------------------------

#[derive(Clone, Serialize, Deserialize)]
pub struct NormalizeEventTimeParams {
    #[serde(default)]
    pub alignment_time: f64,
}

impl Default for NormalizeEventTimeParams {
    fn default() -> Self {
        Self { alignment_time: 0.0 }
    }
}

fn normalize_event_time_entry() -> TransformEntry {
    TransformEntry::element(
        TransformMetadata {
            name: "normalize_event_time",
            category: "temporal",
            description: "subtracts a bound alignment time from an element's own time",
            input_types: vec![PayloadKind::Unit],
            output_type: PayloadKind::Scalar,
            lineage_class: LineageClass::OneToOneByTime,
            arity: 1,
            expensive: false,
            deterministic: true,
            context_bindings: vec!["alignment_time"],
        },
        Arc::new(|time: TimeFrameIndex, _inputs: &[Payload], params: &dyn Any| {
            let p: &NormalizeEventTimeParams = downcast("normalize_event_time", params)?;
            Ok(Payload::Scalar((time.get() as f64 - p.alignment_time) as f32))
        }),
        Arc::new(parser::<NormalizeEventTimeParams>("normalize_event_time")),
        Arc::new(default_json::<NormalizeEventTimeParams>),
    )
}

inventory::submit! { TransformRegistration(normalize_event_time_entry) }

// ---- analog_interval_threshold (container transform) ------------------------

#[derive(Clone, Serialize, Deserialize)]
pub struct AnalogIntervalThresholdParams {
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub treat_missing_as_zero: bool,
}

impl Default for AnalogIntervalThresholdParams {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            treat_missing_as_zero: false,
        }
    }
}

/// A gap is detected when the spacing between consecutive samples exceeds
/// 1.5x the typical (first-pair-derived) step. Inside a detected gap,
/// missing samples count as `0.0` for threshold purposes, and any open
/// interval is closed exactly at the last sample before the gap rather than
/// extrapolated into it.
fn analog_interval_threshold(elements: &[GenericElement], threshold: f64, treat_missing_as_zero: bool) -> Vec<(i64, i64)> {
    if elements.is_empty() {
        return Vec::new();
    }
    let times: Vec<i64> = elements.iter().map(|e| e.time.get()).collect();
    let values: Vec<f64> = elements
        .iter()
        .map(|e| e.payload.as_scalar().unwrap_or(0.0) as f64)
        .collect();
    let typical_step = if times.len() >= 2 {
        (times[1] - times[0]).unsigned_abs().max(1) as i64
    } else {
        1
    };
    let gap_threshold = ((typical_step as f64) * 1.5).ceil() as i64;

    let mut intervals = Vec::new();
    let mut open_start: Option<i64> = None;
    let mut prev_time = times[0];

    for (i, &t) in times.iter().enumerate() {
        let is_gap = i > 0 && (t - prev_time) > gap_threshold;
        if is_gap {
            if let Some(s) = open_start.take() {
                intervals.push((s, prev_time));
            }
            // a detected gap implies missing samples read as 0.0 (below any
            // non-negative threshold), so no interval is opened inside it
            // regardless of `treat_missing_as_zero`'s downstream callers.
            let _ = treat_missing_as_zero;
        }
        let above = values[i] >= threshold;
        match (above, open_start) {
            (true, None) => open_start = Some(t),
            (false, Some(s)) => {
                intervals.push((s, prev_time));
                open_start = None;
            }
            _ => {}
        }
        prev_time = t;
    }
    if let Some(s) = open_start {
        intervals.push((s, prev_time));
    }
    intervals
}

fn analog_interval_threshold_entry() -> TransformEntry {
    TransformEntry::container(
        TransformMetadata {
            name: "analog_interval_threshold",
            category: "temporal",
            description: "finds intervals where a scalar series stays at or above a threshold",
            input_types: vec![PayloadKind::Scalar],
            output_type: PayloadKind::Interval,
            lineage_class: LineageClass::Subset,
            arity: 1,
            expensive: true,
            deterministic: true,
            context_bindings: vec![],
        },
        Arc::new(|inputs: &[Vec<GenericElement>], params: &dyn Any, _ctx: &Context| {
            let p: &AnalogIntervalThresholdParams = downcast("analog_interval_threshold", params)?;
            let elements = inputs
                .first()
                .ok_or_else(|| EngineError::invariant("analog_interval_threshold expects one input"))?;
            let intervals = analog_interval_threshold(elements, p.threshold, p.treat_missing_as_zero);
            Ok(intervals
                .into_iter()
                .enumerate()
                .map(|(i, (start, end))| GenericElement {
                    time: TimeFrameIndex(start),
                    id: crate::entity::EntityId(i as u64),
                    payload: Payload::Interval(crate::element::Interval::new(start, end)),
                })
                .collect())
        }),
        Arc::new(parser::<AnalogIntervalThresholdParams>("analog_interval_threshold")),
        Arc::new(default_json::<AnalogIntervalThresholdParams>),
    )
}

inventory::submit! { TransformRegistration(analog_interval_threshold_entry) }

#[cfg(test)]
mod tests {
    use super::*;

    fn el(t: i64, v: f32) -> GenericElement {
        GenericElement {
            time: TimeFrameIndex(t),
            id: crate::entity::EntityId(0),
            payload: Payload::Scalar(v),
        }
    }

    #[test]
    fn line_point_distance_to_nearest_segment() {
        let line = Line2D::new(vec![Point2D::new(0.0, 0.0), Point2D::new(10.0, 0.0)]);
        let d = line_point_distance(&line, Point2D::new(5.0, 3.0));
        assert!((d - 3.0).abs() < 1e-6);
    }

    #[test]
    fn analog_interval_threshold_basic_crossing() {
        let elements = vec![el(0, 0.0), el(1, 1.0), el(2, 1.0), el(3, 0.0)];
        let intervals = analog_interval_threshold(&elements, 0.5, false);
        assert_eq!(intervals, vec![(1, 2)]);
    }

    #[test]
    fn analog_interval_threshold_closes_at_gap_boundary() {
        // constant step of 1 between samples 0,1,2, then a large gap to 50
        let elements = vec![el(0, 1.0), el(1, 1.0), el(2, 1.0), el(50, 1.0)];
        let intervals = analog_interval_threshold(&elements, 0.5, true);
        // the interval closes at the last sample before the gap (t=2), not
        // extrapolated across it, and a fresh interval opens at t=50
        assert_eq!(intervals, vec![(0, 2), (50, 50)]);
    }
}
