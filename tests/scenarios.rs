//! The six literal end-to-end scenarios from the engine's testable
//! properties (S1-S6): concrete inputs run through the real registry,
//! pipeline runtime, lineage registry/resolver, and gather machinery,
//! checked against literal expected outputs.

#![cfg(feature = "builtin-transforms")]

use std::collections::HashSet;
use std::sync::Arc;

use similar_asserts::assert_eq;

use ts_pipeline::container::{EventSeries, GeometrySeries, IntervalSeries, Notify, RaggedScalarSeries, ScalarSeries};
use ts_pipeline::element::{Interval, Line2D, Mask2D, Point2D};
use ts_pipeline::entity::EntityKind;
use ts_pipeline::gather::{bind_projection, bind_reducer, GatherResult};
use ts_pipeline::lineage::{InMemoryEntityDataSource, Lineage, LineageResolver};
use ts_pipeline::payload::{GenericElement, Payload};
use ts_pipeline::pipeline::{Pipeline, PipelineStep};
use ts_pipeline::value_store::Bindings;
use ts_pipeline::{Context, EntityRegistry, LineageRegistry, TimeFrame, TimeFrameIndex};

fn frame(len: usize) -> Arc<TimeFrame> {
    Arc::new(TimeFrame::constant_step("f", len, 0.0, 1.0))
}

/// Installs a `tracing` subscriber honoring `RUST_LOG` so a scenario can be
/// re-run with step-level `debug!` output visible; harmless (and a no-op)
/// when a subscriber is already installed by an earlier test in this binary.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn element_step(transform: &str, bindings: Bindings) -> PipelineStep {
    PipelineStep {
        step_id: None,
        transform_name: transform.to_string(),
        params: serde_json::json!({}),
        param_bindings: bindings,
        enabled: true,
    }
}

/// S1: a mask_area element transform over two masks at t=10 and one at
/// t=20, lifted automatically into a ragged container.
#[test]
fn s1_mask_area_pipeline() {
    init_tracing();
    ts_pipeline::builtin::ensure_registered();

    let f = frame(30);
    let masks: GeometrySeries<Mask2D> = GeometrySeries::new("masks", EntityKind::Mask, Arc::clone(&f));
    let mut registry = EntityRegistry::new();
    masks
        .append(&mut registry, TimeFrameIndex(10), Mask2D::new(vec![(0, 0), (0, 1), (1, 0), (1, 1)]), Notify::No)
        .unwrap();
    masks
        .append(&mut registry, TimeFrameIndex(10), Mask2D::new(vec![(2, 2), (2, 3)]), Notify::No)
        .unwrap();
    masks
        .append(&mut registry, TimeFrameIndex(20), Mask2D::new(vec![(0, 0), (0, 1), (1, 0), (1, 1), (2, 2)]), Notify::No)
        .unwrap();

    let input: Vec<(TimeFrameIndex, ts_pipeline::EntityId, Payload)> = masks
        .base()
        .flattened_data()
        .into_iter()
        .map(|(t, id, mask)| (t, id, Payload::Mask(mask)))
        .collect();

    let pipeline = Pipeline {
        name: "mask_area".to_string(),
        pre_reductions: vec![],
        steps: vec![element_step("mask_area", Bindings::new())],
    };
    let (out, _store) = pipeline.execute(vec![input], &Context::new()).unwrap();

    let areas = RaggedScalarSeries::new(Arc::clone(&f));
    for (t, _id, payload) in &out {
        areas.append_value(*t, payload.as_scalar().unwrap(), Notify::No).unwrap();
    }
    assert_eq!(areas.at_time(TimeFrameIndex(10)), vec![4.0, 2.0]);
    assert_eq!(areas.at_time(TimeFrameIndex(20)), vec![5.0]);

    let lineage = pipeline.lineage_for(&["masks".to_string()]).unwrap();
    assert!(matches!(lineage, Lineage::OneToOneByTime { source } if source == "masks"));
}

/// S2: chaining mask_area into sum_reduction (time-grouped), then
/// resolving the derived scalar's root back to both source masks.
#[test]
fn s2_mask_area_then_sum_reduction_with_root_resolution() {
    ts_pipeline::builtin::ensure_registered();

    let f = frame(30);
    let masks: GeometrySeries<Mask2D> = GeometrySeries::new("masks", EntityKind::Mask, Arc::clone(&f));
    let mut registry = EntityRegistry::new();
    let id_a = masks
        .append(&mut registry, TimeFrameIndex(10), Mask2D::new(vec![(0, 0), (0, 1), (1, 0), (1, 1)]), Notify::No)
        .unwrap();
    let id_b = masks
        .append(&mut registry, TimeFrameIndex(10), Mask2D::new(vec![(2, 2), (2, 3)]), Notify::No)
        .unwrap();
    masks
        .append(&mut registry, TimeFrameIndex(20), Mask2D::new(vec![(0, 0), (0, 1), (1, 0), (1, 1), (2, 2)]), Notify::No)
        .unwrap();

    let input: Vec<(TimeFrameIndex, ts_pipeline::EntityId, Payload)> = masks
        .base()
        .flattened_data()
        .into_iter()
        .map(|(t, id, mask)| (t, id, Payload::Mask(mask)))
        .collect();

    let pipeline = Pipeline {
        name: "mask_area_sum".to_string(),
        pre_reductions: vec![],
        steps: vec![
            element_step("mask_area", Bindings::new()),
            element_step("sum_reduction", Bindings::new()),
        ],
    };
    let (out, _store) = pipeline.execute(vec![input], &Context::new()).unwrap();

    let sums = ScalarSeries::new(Arc::clone(&f));
    for (t, _id, payload) in &out {
        sums.append_value(*t, payload.as_scalar().unwrap(), Notify::No).unwrap();
    }
    assert_eq!(sums.value_at_time(TimeFrameIndex(10)), Some(6.0));
    assert_eq!(sums.value_at_time(TimeFrameIndex(20)), Some(5.0));

    // Lineage: a single-step-chain pipeline's output is recorded directly
    // against its original input key ("masks"), under the lineage class of
    // the pipeline's last enabled step (sum_reduction -> AllToOneByTime).
    let lineage = pipeline.lineage_for(&["masks".to_string()]).unwrap();
    let mut lineage_registry = LineageRegistry::new();
    lineage_registry.insert("masks", Lineage::Source, 0);
    lineage_registry.insert("sums", lineage, 0);

    let mut data = InMemoryEntityDataSource::new();
    data.insert("masks", TimeFrameIndex(10), vec![id_a, id_b]);

    let resolver = LineageResolver::new(&lineage_registry, &data);
    let mut resolved = resolver.resolve_to_root("sums", TimeFrameIndex(10), 0);
    resolved.sort();
    let mut expected = vec![id_a, id_b];
    expected.sort();
    assert_eq!(resolved, expected);
}

/// S3: multi-input zip of lines and points, broadcasting whichever side has
/// exactly one entry at a given time.
#[test]
fn s3_multi_input_zip_with_broadcast() {
    ts_pipeline::builtin::ensure_registered();

    let l1 = Line2D::new(vec![Point2D::new(0.0, 0.0)]);
    let l2 = Line2D::new(vec![Point2D::new(10.0, 0.0)]);
    let l3 = Line2D::new(vec![Point2D::new(20.0, 0.0)]);
    let p1 = Point2D::new(0.0, 3.0);
    let p2 = Point2D::new(0.0, 4.0);
    let p4 = Point2D::new(10.0, 6.0);

    let dist = |a: Point2D, b: Point2D| (((a.x - b.x).powi(2) + (a.y - b.y).powi(2)) as f64).sqrt() as f32;

    use ts_pipeline::EntityId;
    let lines = vec![
        (TimeFrameIndex(0), EntityId(1), Payload::Line(l1.clone())),
        (TimeFrameIndex(1), EntityId(2), Payload::Line(l2.clone())),
        (TimeFrameIndex(1), EntityId(3), Payload::Line(l3.clone())),
    ];
    let points = vec![
        (TimeFrameIndex(0), EntityId(10), Payload::Point(p1)),
        (TimeFrameIndex(0), EntityId(11), Payload::Point(p2)),
        (TimeFrameIndex(1), EntityId(12), Payload::Point(p4)),
    ];

    let pipeline = Pipeline {
        name: "line_point_distance".to_string(),
        pre_reductions: vec![],
        steps: vec![element_step("line_point_distance", Bindings::new())],
    };
    let (out, _store) = pipeline.execute(vec![lines, points], &Context::new()).unwrap();

    assert_eq!(out.len(), 4);
    assert_eq!(out[0].0, TimeFrameIndex(0));
    assert!((out[0].2.as_scalar().unwrap() - dist(l1.points[0], p1)).abs() < 1e-5);
    assert_eq!(out[1].0, TimeFrameIndex(0));
    assert!((out[1].2.as_scalar().unwrap() - dist(l1.points[0], p2)).abs() < 1e-5);
    assert_eq!(out[2].0, TimeFrameIndex(1));
    assert!((out[2].2.as_scalar().unwrap() - dist(l2.points[0], p4)).abs() < 1e-5);
    assert_eq!(out[3].0, TimeFrameIndex(1));
    assert!((out[3].2.as_scalar().unwrap() - dist(l3.points[0], p4)).abs() < 1e-5);
}

/// S4: z-score bound to pre-reductions via the value store, loaded from the
/// pipeline JSON schema end to end (spec §6.1).
#[test]
fn s4_z_score_with_store_bindings() {
    ts_pipeline::builtin::ensure_registered();

    let f = frame(5);
    let series = ScalarSeries::new(Arc::clone(&f));
    for (i, v) in [1.0_f32, 2.0, 3.0, 4.0, 5.0].into_iter().enumerate() {
        series.append_value(TimeFrameIndex(i as i64), v, Notify::No).unwrap();
    }

    let json = r#"{
        "name": "z_score_demo",
        "pre_reductions": [
            {"reduction": "mean_value", "output_key": "m"},
            {"reduction": "std_value", "output_key": "s"}
        ],
        "steps": [
            {"transform": "z_score", "param_bindings": {"mean": "m", "std_dev": "s"}}
        ]
    }"#;
    let pipeline = ts_pipeline::pipeline::load_pipeline_json(json).unwrap();

    let input: Vec<(TimeFrameIndex, ts_pipeline::EntityId, Payload)> = series
        .base()
        .flattened_data()
        .into_iter()
        .map(|(t, id, v)| (t, id, Payload::Scalar(v)))
        .collect();
    let (out, store) = pipeline.execute(vec![input], &Context::new()).unwrap();

    let values: Vec<f64> = out.iter().map(|(_, _, p)| p.as_scalar().unwrap() as f64).collect();
    let mean: f64 = values.iter().sum::<f64>() / values.len() as f64;
    let var: f64 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    assert!(mean.abs() < 1e-5, "mean was {mean}");
    assert!((var.sqrt() - 1.0).abs() < 1e-5, "std was {}", var.sqrt());

    assert!(store.get("m").unwrap().as_f64().unwrap().is_finite());
    assert!(store.get("s").unwrap().as_f64().unwrap().is_finite());

    // clamp_outliers variant
    let json_clamped = r#"{
        "name": "z_score_clamped",
        "pre_reductions": [
            {"reduction": "mean_value", "output_key": "m"},
            {"reduction": "std_value", "output_key": "s"}
        ],
        "steps": [
            {"transform": "z_score", "params": {"clamp_outliers": true, "outlier_threshold": 2.5},
             "param_bindings": {"mean": "m", "std_dev": "s"}}
        ]
    }"#;
    let pipeline_clamped = ts_pipeline::pipeline::load_pipeline_json(json_clamped).unwrap();
    let input2: Vec<(TimeFrameIndex, ts_pipeline::EntityId, Payload)> = series
        .base()
        .flattened_data()
        .into_iter()
        .map(|(t, id, v)| (t, id, Payload::Scalar(v)))
        .collect();
    let (out2, _) = pipeline_clamped.execute(vec![input2], &Context::new()).unwrap();
    for (_, _, payload) in out2 {
        let v = payload.as_scalar().unwrap();
        assert!((-2.5..=2.5).contains(&v), "value {v} escaped the clamp");
    }
}

/// S5: gather-and-sort over events normalized to per-trial alignment time,
/// reduced with `first_positive_latency`.
#[test]
fn s5_gather_and_sort() {
    ts_pipeline::builtin::ensure_registered();

    let f = frame(200);
    let events = EventSeries::new("events", Arc::clone(&f));
    let mut registry = EntityRegistry::new();
    for t in [5, 25, 55, 65, 120] {
        events.insert(&mut registry, TimeFrameIndex(t), Notify::No).unwrap();
    }

    let trials = IntervalSeries::new("trials", Arc::clone(&f));
    let mut trial_registry = EntityRegistry::new();
    for (s, e) in [(0, 49), (50, 99), (100, 149)] {
        trials.insert(&mut trial_registry, Interval::new(s, e), Notify::No).unwrap();
    }

    let elements: Vec<GenericElement> = events
        .elements()
        .into_iter()
        .map(|ev| GenericElement {
            time: ev.time,
            id: ev.id,
            payload: Payload::Unit,
        })
        .collect();
    let gathered = GatherResult::new(elements, &trials);

    let normalize_step = element_step(
        "normalize_event_time",
        Bindings::from_iter([("alignment_time".to_string(), "alignment_time".to_string())]),
    );
    let pipeline = Pipeline {
        name: "normalize".to_string(),
        pre_reductions: vec![],
        steps: vec![normalize_step],
    };

    let reducer_factory = bind_reducer(pipeline, "first_positive_latency");
    let scalars = gathered.reduce(reducer_factory).unwrap();
    let values: Vec<f64> = scalars.iter().map(|s| s.as_f64().unwrap()).collect();
    assert_eq!(values, vec![5.0, 5.0, 20.0]);

    let normalize_step2 = element_step(
        "normalize_event_time",
        Bindings::from_iter([("alignment_time".to_string(), "alignment_time".to_string())]),
    );
    let pipeline2 = Pipeline {
        name: "normalize2".to_string(),
        pre_reductions: vec![],
        steps: vec![normalize_step2],
    };
    let sorted = gathered
        .sort_indices_by(bind_reducer(pipeline2, "first_positive_latency"))
        .unwrap();
    assert_eq!(sorted, vec![0, 1, 2]);

    // bind_projection exercises the same binding machinery for a
    // per-element projection rather than a whole-trial reduction.
    let normalize_step3 = element_step(
        "normalize_event_time",
        Bindings::from_iter([("alignment_time".to_string(), "alignment_time".to_string())]),
    );
    let pipeline3 = Pipeline {
        name: "normalize3".to_string(),
        pre_reductions: vec![],
        steps: vec![normalize_step3],
    };
    let projected = gathered.project(bind_projection(pipeline3)).unwrap();
    assert_eq!(projected[0].len(), 2);
    assert_eq!(projected[0][0].payload.as_scalar(), Some(5.0));
    assert_eq!(projected[0][1].payload.as_scalar(), Some(25.0));
}

/// S6: three-level lineage resolution, Masks(Source) -> areas
/// (OneToOneByTime) -> peaks(AllToOneByTime).
#[test]
fn s6_lineage_resolution_across_three_levels() {
    let mut registry = LineageRegistry::new();
    registry.insert("masks", Lineage::Source, 0);
    registry.insert("areas", Lineage::OneToOneByTime { source: "masks".to_string() }, 0);
    registry.insert("peaks", Lineage::AllToOneByTime { source: "areas".to_string() }, 0);

    use ts_pipeline::EntityId;
    let mut data = InMemoryEntityDataSource::new();
    data.insert("masks", TimeFrameIndex(10), vec![EntityId(100), EntityId(101)]);

    let resolver = LineageResolver::new(&registry, &data);
    let mut resolved = resolver.resolve_to_root("peaks", TimeFrameIndex(10), 0);
    resolved.sort();
    assert_eq!(resolved, vec![EntityId(100), EntityId(101)]);

    let all: HashSet<EntityId> = resolver.get_all_source_entities("peaks");
    assert_eq!(all, HashSet::from([EntityId(100), EntityId(101)]));
}
