//! [`zip_inputs`]: the `FlatZipView` construction (§4.4) that reconciles N
//! per-time element counts into one stream, broadcasting a lone element
//! against the other inputs' entries at that time.

use super::ZippedElement;
use crate::error::{EngineError, Result};
use crate::time::TimeFrameIndex;
use itertools::Itertools;
use smallvec::smallvec;
use std::collections::BTreeMap;

/// Zips `lanes` (one element stream per pipeline input) into a single
/// stream in non-decreasing time order. A lane with exactly one input
/// requires no zipping and is returned as-is. Only times present in every
/// lane are emitted; at each such time, equal per-lane counts pair up
/// positionally, and a lone (`count == 1`) lane broadcasts against the
/// others, which must themselves share one common count.
pub fn zip_inputs(lanes: Vec<Vec<ZippedElement>>) -> Result<Vec<ZippedElement>> {
    match lanes.len() {
        0 => Ok(Vec::new()),
        1 => Ok(lanes.into_iter().next().unwrap()),
        _ => zip_many(lanes),
    }
}

fn zip_many(lanes: Vec<Vec<ZippedElement>>) -> Result<Vec<ZippedElement>> {
    let grouped: Vec<BTreeMap<TimeFrameIndex, Vec<ZippedElement>>> = lanes
        .into_iter()
        .map(|lane| {
            let mut map: BTreeMap<TimeFrameIndex, Vec<ZippedElement>> = BTreeMap::new();
            for el in lane {
                map.entry(el.time).or_default().push(el);
            }
            map
        })
        .collect();

    let mut common_times: Vec<TimeFrameIndex> = grouped[0].keys().copied().collect();
    for g in &grouped[1..] {
        common_times.retain(|t| g.contains_key(t));
    }

    let mut out = Vec::new();
    for t in common_times {
        let groups: Vec<&Vec<ZippedElement>> = grouped.iter().map(|g| &g[&t]).collect();
        let counts: Vec<usize> = groups.iter().map(|g| g.len()).collect();

        if counts.iter().all_equal() {
            for idx in 0..counts[0] {
                out.push(combine(t, &groups, |_| idx));
            }
            continue;
        }

        let broadcasters: Vec<usize> = (0..counts.len()).filter(|&i| counts[i] == 1).collect();
        if broadcasters.len() != 1 {
            return Err(EngineError::ShapeMismatch { time: t, counts });
        }
        let b = broadcasters[0];
        let others: Vec<usize> = (0..counts.len()).filter(|&i| i != b).collect();
        let m = counts[others[0]];
        if !others.iter().all(|&i| counts[i] == m) {
            return Err(EngineError::ShapeMismatch { time: t, counts });
        }

        for idx in 0..m {
            out.push(combine(t, &groups, |lane| if lane == b { 0 } else { idx }));
        }
    }
    Ok(out)
}

fn combine(
    time: TimeFrameIndex,
    groups: &[&Vec<ZippedElement>],
    index_for_lane: impl Fn(usize) -> usize,
) -> ZippedElement {
    let mut ids = smallvec![];
    let mut payloads = smallvec![];
    for (lane, group) in groups.iter().enumerate() {
        let el = &group[index_for_lane(lane)];
        ids.push(el.ids[0]);
        payloads.push(el.payloads[0].clone());
    }
    ZippedElement { time, ids, payloads }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;
    use crate::payload::Payload;

    fn el(t: i64, id: u64, v: f32) -> ZippedElement {
        ZippedElement::single(TimeFrameIndex(t), EntityId(id), Payload::Scalar(v))
    }

    #[test]
    fn broadcast_side_chosen_per_time() {
        let a = vec![el(0, 1, 10.0), el(1, 2, 20.0), el(1, 3, 21.0)];
        let b = vec![el(0, 10, 1.0), el(0, 11, 2.0), el(1, 12, 100.0)];
        let zipped = zip_inputs(vec![a, b]).unwrap();
        assert_eq!(zipped.len(), 4);
        assert_eq!(zipped[0].time, TimeFrameIndex(0));
        assert_eq!(zipped[0].payloads[0].as_scalar(), Some(10.0));
        assert_eq!(zipped[0].payloads[1].as_scalar(), Some(1.0));
        assert_eq!(zipped[1].payloads[1].as_scalar(), Some(2.0));
        assert_eq!(zipped[2].payloads[0].as_scalar(), Some(20.0));
        assert_eq!(zipped[2].payloads[1].as_scalar(), Some(100.0));
        assert_eq!(zipped[3].payloads[0].as_scalar(), Some(21.0));
    }

    #[test]
    fn mismatched_cardinalities_fail() {
        let a = vec![el(0, 1, 1.0), el(0, 2, 2.0)];
        let b = vec![el(0, 10, 1.0), el(0, 11, 2.0), el(0, 12, 3.0)];
        assert!(matches!(
            zip_inputs(vec![a, b]),
            Err(EngineError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn times_absent_from_any_lane_are_skipped() {
        let a = vec![el(0, 1, 1.0), el(5, 2, 2.0)];
        let b = vec![el(0, 10, 1.0)];
        let zipped = zip_inputs(vec![a, b]).unwrap();
        assert_eq!(zipped.len(), 1);
        assert_eq!(zipped[0].time, TimeFrameIndex(0));
    }
}
