//! The full range reduction catalog named in spec §4.6. Unlike the
//! transform catalog (deliberately minimal - just enough for the crate's
//! own scenario tests), the reduction catalog is small and fully
//! enumerated by name, so the whole thing is implemented here.

use crate::error::{EngineError, Result};
use crate::payload::GenericElement;
use crate::registry::{ReductionEntry, ReductionKind, ReductionMetadata, ReductionRegistration};
use crate::value_store::Scalar;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

fn downcast<'a, T: 'static>(reduction: &'static str, params: &'a dyn Any) -> Result<&'a T> {
    params
        .downcast_ref::<T>()
        .ok_or_else(|| EngineError::invariant(format!("{reduction}: params downcast failed")))
}

fn parser<T>(
) -> impl Fn(&serde_json::Value) -> std::result::Result<Box<dyn Any + Send + Sync>, serde_json::Error>
where
    T: for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    move |json| {
        let parsed: T = serde_json::from_value(json.clone())?;
        Ok(Box::new(parsed) as Box<dyn Any + Send + Sync>)
    }
}

fn default_json<T: Default + Serialize>() -> serde_json::Value {
    serde_json::to_value(T::default()).unwrap_or(serde_json::Value::Null)
}

/// Every value reduction filters out NaN payloads first when
/// `skip_nan` is set; the default is `true` since an un-skipped NaN would
/// otherwise poison `sum`/`mean`/extrema silently.
#[derive(Clone, Serialize, Deserialize)]
pub struct ValueReductionParams {
    #[serde(default = "default_true")]
    pub skip_nan: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ValueReductionParams {
    fn default() -> Self {
        Self { skip_nan: true }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ThresholdParams {
    #[serde(default)]
    pub threshold: f64,
    #[serde(default = "default_true")]
    pub skip_nan: bool,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            skip_nan: true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WindowParams {
    #[serde(default)]
    pub lo: i64,
    #[serde(default)]
    pub hi: i64,
}

impl Default for WindowParams {
    fn default() -> Self {
        Self { lo: 0, hi: 0 }
    }
}

fn values(elements: &[GenericElement], skip_nan: bool) -> Vec<f64> {
    elements
        .iter()
        .filter_map(|e| e.payload.as_scalar())
        .map(|v| v as f64)
        .filter(|v| !skip_nan || !v.is_nan())
        .collect()
}

fn register(
    name: &'static str,
    kind: ReductionKind,
    input_type: crate::payload::PayloadKind,
    description: &'static str,
    func: impl Fn(&[GenericElement], &dyn Any) -> Result<Scalar> + Send + Sync + 'static,
) -> ReductionEntry {
    ReductionEntry::new(
        ReductionMetadata {
            name,
            kind,
            input_type,
            description,
        },
        Arc::new(func),
        Arc::new(parser::<ValueReductionParams>()),
        Arc::new(default_json::<ValueReductionParams>),
    )
}

macro_rules! submit_reduction {
    ($factory:ident) => {
        inventory::submit! { ReductionRegistration($factory) }
    };
}

// ---- value reductions -------------------------------------------------

fn max_value_entry() -> ReductionEntry {
    register(
        "max_value",
        ReductionKind::Value,
        crate::payload::PayloadKind::Scalar,
        "maximum value in range; -inf (sentinel) if empty",
        |els, params| {
            let p: &ValueReductionParams = downcast("max_value", params)?;
            let vs = values(els, p.skip_nan);
            Ok(Scalar::F64(vs.into_iter().fold(f64::NEG_INFINITY, f64::max)))
        },
    )
}
submit_reduction!(max_value_entry);

fn min_value_entry() -> ReductionEntry {
    register(
        "min_value",
        ReductionKind::Value,
        crate::payload::PayloadKind::Scalar,
        "minimum value in range; +inf (sentinel) if empty",
        |els, params| {
            let p: &ValueReductionParams = downcast("min_value", params)?;
            let vs = values(els, p.skip_nan);
            Ok(Scalar::F64(vs.into_iter().fold(f64::INFINITY, f64::min)))
        },
    )
}
submit_reduction!(min_value_entry);

fn mean_value_entry() -> ReductionEntry {
    register(
        "mean_value",
        ReductionKind::Value,
        crate::payload::PayloadKind::Scalar,
        "arithmetic mean of values in range; NaN if empty",
        |els, params| {
            let p: &ValueReductionParams = downcast("mean_value", params)?;
            let vs = values(els, p.skip_nan);
            if vs.is_empty() {
                return Ok(Scalar::F64(f64::NAN));
            }
            Ok(Scalar::F64(vs.iter().sum::<f64>() / vs.len() as f64))
        },
    )
}
submit_reduction!(mean_value_entry);

fn std_value_entry() -> ReductionEntry {
    register(
        "std_value",
        ReductionKind::Value,
        crate::payload::PayloadKind::Scalar,
        "population standard deviation of values in range; NaN if empty",
        |els, params| {
            let p: &ValueReductionParams = downcast("std_value", params)?;
            let vs = values(els, p.skip_nan);
            if vs.is_empty() {
                return Ok(Scalar::F64(f64::NAN));
            }
            let mean = vs.iter().sum::<f64>() / vs.len() as f64;
            let var = vs.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / vs.len() as f64;
            Ok(Scalar::F64(var.sqrt()))
        },
    )
}
submit_reduction!(std_value_entry);

fn sum_value_entry() -> ReductionEntry {
    register(
        "sum_value",
        ReductionKind::Value,
        crate::payload::PayloadKind::Scalar,
        "sum of values in range; 0.0 if empty",
        |els, params| {
            let p: &ValueReductionParams = downcast("sum_value", params)?;
            Ok(Scalar::F64(values(els, p.skip_nan).iter().sum()))
        },
    )
}
submit_reduction!(sum_value_entry);

fn value_range_entry() -> ReductionEntry {
    register(
        "value_range",
        ReductionKind::Value,
        crate::payload::PayloadKind::Scalar,
        "max - min of values in range; NaN if empty",
        |els, params| {
            let p: &ValueReductionParams = downcast("value_range", params)?;
            let vs = values(els, p.skip_nan);
            if vs.is_empty() {
                return Ok(Scalar::F64(f64::NAN));
            }
            let max = vs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let min = vs.iter().cloned().fold(f64::INFINITY, f64::min);
            Ok(Scalar::F64(max - min))
        },
    )
}
submit_reduction!(value_range_entry);

fn time_of_max_entry() -> ReductionEntry {
    register(
        "time_of_max",
        ReductionKind::Value,
        crate::payload::PayloadKind::Scalar,
        "time index of the maximal value; -1 if empty",
        |els, params| {
            let p: &ValueReductionParams = downcast("time_of_max", params)?;
            let best = els
                .iter()
                .filter_map(|e| e.payload.as_scalar().map(|v| (e.time.get(), v as f64)))
                .filter(|(_, v)| !p.skip_nan || !v.is_nan())
                .fold(None, |acc: Option<(i64, f64)>, (t, v)| match acc {
                    Some((_, bv)) if bv >= v => acc,
                    _ => Some((t, v)),
                });
            Ok(Scalar::I64(best.map(|(t, _)| t).unwrap_or(-1)))
        },
    )
}
submit_reduction!(time_of_max_entry);

fn time_of_min_entry() -> ReductionEntry {
    register(
        "time_of_min",
        ReductionKind::Value,
        crate::payload::PayloadKind::Scalar,
        "time index of the minimal value; -1 if empty",
        |els, params| {
            let p: &ValueReductionParams = downcast("time_of_min", params)?;
            let best = els
                .iter()
                .filter_map(|e| e.payload.as_scalar().map(|v| (e.time.get(), v as f64)))
                .filter(|(_, v)| !p.skip_nan || !v.is_nan())
                .fold(None, |acc: Option<(i64, f64)>, (t, v)| match acc {
                    Some((_, bv)) if bv <= v => acc,
                    _ => Some((t, v)),
                });
            Ok(Scalar::I64(best.map(|(t, _)| t).unwrap_or(-1)))
        },
    )
}
submit_reduction!(time_of_min_entry);

fn time_of_threshold_cross_entry() -> ReductionEntry {
    ReductionEntry::new(
        ReductionMetadata {
            name: "time_of_threshold_cross",
            kind: ReductionKind::Value,
            input_type: crate::payload::PayloadKind::Scalar,
            description: "time index of the first upward crossing of `threshold`; -1 if none",
        },
        Arc::new(|els: &[GenericElement], params: &dyn Any| {
            let p: &ThresholdParams = downcast("time_of_threshold_cross", params)?;
            let mut prev: Option<f64> = None;
            for e in els {
                let Some(v) = e.payload.as_scalar().map(|v| v as f64) else {
                    continue;
                };
                if p.skip_nan && v.is_nan() {
                    continue;
                }
                if let Some(pv) = prev {
                    if pv < p.threshold && v >= p.threshold {
                        return Ok(Scalar::I64(e.time.get()));
                    }
                }
                prev = Some(v);
            }
            Ok(Scalar::I64(-1))
        }),
        Arc::new(parser::<ThresholdParams>()),
        Arc::new(default_json::<ThresholdParams>),
    )
}
submit_reduction!(time_of_threshold_cross_entry);

fn area_under_curve_entry() -> ReductionEntry {
    register(
        "area_under_curve",
        ReductionKind::Value,
        crate::payload::PayloadKind::Scalar,
        "trapezoidal integral of value over index-time; 0.0 if fewer than two samples",
        |els, params| {
            let p: &ValueReductionParams = downcast("area_under_curve", params)?;
            let pts: Vec<(i64, f64)> = els
                .iter()
                .filter_map(|e| e.payload.as_scalar().map(|v| (e.time.get(), v as f64)))
                .filter(|(_, v)| !p.skip_nan || !v.is_nan())
                .collect();
            let mut area = 0.0;
            for w in pts.windows(2) {
                let (t0, v0) = w[0];
                let (t1, v1) = w[1];
                area += (t1 - t0) as f64 * (v0 + v1) / 2.0;
            }
            Ok(Scalar::F64(area))
        },
    )
}
submit_reduction!(area_under_curve_entry);

fn count_above_threshold_entry() -> ReductionEntry {
    ReductionEntry::new(
        ReductionMetadata {
            name: "count_above_threshold",
            kind: ReductionKind::Value,
            input_type: crate::payload::PayloadKind::Scalar,
            description: "count of values >= threshold; 0 if empty",
        },
        Arc::new(|els: &[GenericElement], params: &dyn Any| {
            let p: &ThresholdParams = downcast("count_above_threshold", params)?;
            let vs = values(els, p.skip_nan);
            Ok(Scalar::I64(vs.iter().filter(|&&v| v >= p.threshold).count() as i64))
        }),
        Arc::new(parser::<ThresholdParams>()),
        Arc::new(default_json::<ThresholdParams>),
    )
}
submit_reduction!(count_above_threshold_entry);

fn fraction_above_threshold_entry() -> ReductionEntry {
    ReductionEntry::new(
        ReductionMetadata {
            name: "fraction_above_threshold",
            kind: ReductionKind::Value,
            input_type: crate::payload::PayloadKind::Scalar,
            description: "fraction of values >= threshold; 0.0 if empty",
        },
        Arc::new(|els: &[GenericElement], params: &dyn Any| {
            let p: &ThresholdParams = downcast("fraction_above_threshold", params)?;
            let vs = values(els, p.skip_nan);
            if vs.is_empty() {
                return Ok(Scalar::F64(0.0));
            }
            let above = vs.iter().filter(|&&v| v >= p.threshold).count() as f64;
            Ok(Scalar::F64(above / vs.len() as f64))
        }),
        Arc::new(parser::<ThresholdParams>()),
        Arc::new(default_json::<ThresholdParams>),
    )
}
submit_reduction!(fraction_above_threshold_entry);

// ---- event reductions ---------------------------------------------------

fn event_count_entry() -> ReductionEntry {
    ReductionEntry::new(
        ReductionMetadata {
            name: "event_count",
            kind: ReductionKind::Event,
            input_type: crate::payload::PayloadKind::Unit,
            description: "number of events in range; 0 if empty",
        },
        Arc::new(|els: &[GenericElement], _params: &dyn Any| Ok(Scalar::I64(els.len() as i64))),
        Arc::new(parser::<()>()),
        Arc::new(default_json::<()>),
    )
}
submit_reduction!(event_count_entry);

fn first_positive_latency_entry() -> ReductionEntry {
    ReductionEntry::new(
        ReductionMetadata {
            name: "first_positive_latency",
            kind: ReductionKind::Event,
            input_type: crate::payload::PayloadKind::Scalar,
            description: "first value > 0 among elements already relative to an alignment time; NaN if none",
        },
        Arc::new(|els: &[GenericElement], _params: &dyn Any| {
            let found = els
                .iter()
                .filter_map(|e| e.payload.as_scalar())
                .find(|&v| v > 0.0);
            Ok(Scalar::F64(found.map(|v| v as f64).unwrap_or(f64::NAN)))
        }),
        Arc::new(parser::<()>()),
        Arc::new(default_json::<()>),
    )
}
submit_reduction!(first_positive_latency_entry);

fn last_negative_latency_entry() -> ReductionEntry {
    ReductionEntry::new(
        ReductionMetadata {
            name: "last_negative_latency",
            kind: ReductionKind::Event,
            input_type: crate::payload::PayloadKind::Scalar,
            description: "last value < 0 among elements already relative to an alignment time; NaN if none",
        },
        Arc::new(|els: &[GenericElement], _params: &dyn Any| {
            let found = els
                .iter()
                .filter_map(|e| e.payload.as_scalar())
                .filter(|&v| v < 0.0)
                .last();
            Ok(Scalar::F64(found.map(|v| v as f64).unwrap_or(f64::NAN)))
        }),
        Arc::new(parser::<()>()),
        Arc::new(default_json::<()>),
    )
}
submit_reduction!(last_negative_latency_entry);

fn event_count_in_window_entry() -> ReductionEntry {
    ReductionEntry::new(
        ReductionMetadata {
            name: "event_count_in_window",
            kind: ReductionKind::Event,
            input_type: crate::payload::PayloadKind::Unit,
            description: "count of events whose own time falls in [lo, hi]; 0 if none",
        },
        Arc::new(|els: &[GenericElement], params: &dyn Any| {
            let p: &WindowParams = downcast("event_count_in_window", params)?;
            let count = els
                .iter()
                .filter(|e| e.time.get() >= p.lo && e.time.get() <= p.hi)
                .count();
            Ok(Scalar::I64(count as i64))
        }),
        Arc::new(parser::<WindowParams>()),
        Arc::new(default_json::<WindowParams>),
    )
}
submit_reduction!(event_count_in_window_entry);

fn mean_inter_event_interval_entry() -> ReductionEntry {
    ReductionEntry::new(
        ReductionMetadata {
            name: "mean_inter_event_interval",
            kind: ReductionKind::Event,
            input_type: crate::payload::PayloadKind::Unit,
            description: "mean gap between consecutive event times; NaN if fewer than 2 events",
        },
        Arc::new(|els: &[GenericElement], _params: &dyn Any| {
            if els.len() < 2 {
                return Ok(Scalar::F64(f64::NAN));
            }
            let mut gaps = 0i64;
            let mut count = 0i64;
            for w in els.windows(2) {
                gaps += w[1].time.get() - w[0].time.get();
                count += 1;
            }
            Ok(Scalar::F64(gaps as f64 / count as f64))
        }),
        Arc::new(parser::<()>()),
        Arc::new(default_json::<()>),
    )
}
submit_reduction!(mean_inter_event_interval_entry);

fn event_time_span_entry() -> ReductionEntry {
    ReductionEntry::new(
        ReductionMetadata {
            name: "event_time_span",
            kind: ReductionKind::Event,
            input_type: crate::payload::PayloadKind::Unit,
            description: "last event time minus first event time; 0 if fewer than 2 events",
        },
        Arc::new(|els: &[GenericElement], _params: &dyn Any| {
            if els.len() < 2 {
                return Ok(Scalar::I64(0));
            }
            let first = els.first().unwrap().time.get();
            let last = els.last().unwrap().time.get();
            Ok(Scalar::I64(last - first))
        }),
        Arc::new(parser::<()>()),
        Arc::new(default_json::<()>),
    )
}
submit_reduction!(event_time_span_entry);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;
    use crate::payload::Payload;
    use crate::time::TimeFrameIndex;

    fn scalar_el(t: i64, v: f32) -> GenericElement {
        GenericElement {
            time: TimeFrameIndex(t),
            id: EntityId(0),
            payload: Payload::Scalar(v),
        }
    }

    fn unit_el(t: i64) -> GenericElement {
        GenericElement {
            time: TimeFrameIndex(t),
            id: EntityId(0),
            payload: Payload::Unit,
        }
    }

    #[test]
    fn mean_and_std_of_one_to_five() {
        let els: Vec<GenericElement> = (1..=5).map(|v| scalar_el(v, v as f32)).collect();
        let mean = mean_value_entry();
        let p = mean.parse_params(&mean.default_params_json()).unwrap();
        let Scalar::F64(m) = mean.call(&els, p.as_ref()).unwrap() else {
            panic!("expected f64")
        };
        assert!((m - 3.0).abs() < 1e-9);

        let std = std_value_entry();
        let p = std.parse_params(&std.default_params_json()).unwrap();
        let Scalar::F64(s) = std.call(&els, p.as_ref()).unwrap() else {
            panic!("expected f64")
        };
        assert!((s - std::f64::consts::SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn empty_range_identities() {
        let empty: Vec<GenericElement> = Vec::new();

        let sum = sum_value_entry();
        let p = sum.parse_params(&sum.default_params_json()).unwrap();
        assert_eq!(sum.call(&empty, p.as_ref()).unwrap(), Scalar::F64(0.0));

        let mean = mean_value_entry();
        let p = mean.parse_params(&mean.default_params_json()).unwrap();
        let Scalar::F64(m) = mean.call(&empty, p.as_ref()).unwrap() else {
            panic!("expected f64")
        };
        assert!(m.is_nan());

        let count = event_count_entry();
        let p = count.parse_params(&count.default_params_json()).unwrap();
        assert_eq!(count.call(&empty, p.as_ref()).unwrap(), Scalar::I64(0));
    }

    #[test]
    fn event_time_span_and_mean_interval() {
        let els: Vec<GenericElement> = [5, 25, 55, 65, 120].iter().map(|&t| unit_el(t)).collect();
        let span = event_time_span_entry();
        let p = span.parse_params(&span.default_params_json()).unwrap();
        assert_eq!(span.call(&els, p.as_ref()).unwrap(), Scalar::I64(115));

        let mean_gap = mean_inter_event_interval_entry();
        let p = mean_gap.parse_params(&mean_gap.default_params_json()).unwrap();
        let Scalar::F64(g) = mean_gap.call(&els, p.as_ref()).unwrap() else {
            panic!("expected f64")
        };
        assert!((g - 28.75).abs() < 1e-9);
    }

    #[test]
    fn count_and_fraction_above_threshold() {
        let els = vec![scalar_el(0, 0.0), scalar_el(1, 1.0), scalar_el(2, 2.0)];
        let count = count_above_threshold_entry();
        let json = serde_json::json!({"threshold": 1.0});
        let p = count.parse_params(&json).unwrap();
        assert_eq!(count.call(&els, p.as_ref()).unwrap(), Scalar::I64(2));

        let frac = fraction_above_threshold_entry();
        let p = frac.parse_params(&json).unwrap();
        let Scalar::F64(f) = frac.call(&els, p.as_ref()).unwrap() else {
            panic!("expected f64")
        };
        assert!((f - 2.0 / 3.0).abs() < 1e-9);
    }
}
