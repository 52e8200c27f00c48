//! Pins down the `analog_interval_threshold` gap-handling rule end to end,
//! through the registry and pipeline runtime rather than the bare function:
//! a gap is detected when consecutive samples are spaced more than 1.5x the
//! step derived from the first pair of samples, and an interval open at the
//! moment a gap starts closes at the last real sample before it rather than
//! extending into (or past) the gap.

#![cfg(feature = "builtin-transforms")]

use ts_pipeline::entity::EntityId;
use ts_pipeline::payload::Payload;
use ts_pipeline::pipeline::PipelineStep;
use ts_pipeline::value_store::Bindings;
use ts_pipeline::{Context, Pipeline, TimeFrameIndex};

fn run(times: &[i64], values: &[f32], threshold: f64) -> Vec<(i64, i64)> {
    ts_pipeline::builtin::ensure_registered();
    let pipeline = Pipeline {
        name: "gap".to_string(),
        pre_reductions: vec![],
        steps: vec![PipelineStep {
            step_id: None,
            transform_name: "analog_interval_threshold".to_string(),
            params: serde_json::json!({"threshold": threshold}),
            param_bindings: Bindings::new(),
            enabled: true,
        }],
    };
    let input: Vec<(TimeFrameIndex, EntityId, Payload)> = times
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (&t, &v))| (TimeFrameIndex(t), EntityId(i as u64), Payload::Scalar(v)))
        .collect();
    let (out, _) = pipeline.execute(vec![input], &Context::new()).unwrap();
    out.into_iter()
        .map(|(_, _, payload)| {
            let interval = payload.as_interval().expect("container output must be an Interval");
            (interval.start, interval.end)
        })
        .collect()
}

#[test]
fn large_gap_closes_interval_at_last_real_sample() {
    let times = [0, 1, 2, 3, 4, 50, 51, 52];
    let values = [1.0; 8];
    let intervals = run(&times, &values, 0.5);
    assert_eq!(intervals, vec![(0, 4), (50, 52)]);
}

#[test]
fn spacing_at_exactly_1_5x_typical_step_is_not_a_gap() {
    // typical step derived from the first pair (0 -> 1) is 1; a gap
    // threshold of ceil(1 * 1.5) = 2, so a spacing of exactly 2 is still
    // treated as continuous sampling.
    let times = [0, 1, 2, 4];
    let values = [1.0; 4];
    let intervals = run(&times, &values, 0.5);
    assert_eq!(intervals, vec![(0, 4)]);
}

#[test]
fn spacing_one_past_the_threshold_is_a_gap() {
    let times = [0, 1, 2, 5];
    let values = [1.0; 4];
    let intervals = run(&times, &values, 0.5);
    assert_eq!(intervals, vec![(0, 2), (5, 5)]);
}

#[test]
fn typical_step_is_derived_once_from_the_first_pair() {
    // first pair spacing is 5, so the gap threshold is ceil(5 * 1.5) = 8;
    // a later spacing of 7 should NOT be treated as a gap even though it's
    // wider than most of the other steps in this series.
    let times = [0, 5, 10, 17, 18];
    let values = [1.0; 5];
    let intervals = run(&times, &values, 0.5);
    assert_eq!(intervals, vec![(0, 18)]);
}

#[test]
fn gap_forces_closure_independent_of_threshold_crossings_around_it() {
    let times = [0, 1, 2, 3, 40, 41, 42];
    // above threshold right up to the gap, and again right after it
    let values = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
    let intervals = run(&times, &values, 0.5);
    assert_eq!(intervals, vec![(0, 3), (40, 42)]);
}

#[test]
fn no_samples_above_threshold_yields_no_intervals() {
    let times = [0, 1, 2, 3];
    let values = [0.0, 0.0, 0.0, 0.0];
    assert!(run(&times, &values, 0.5).is_empty());
}
