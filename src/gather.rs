//! The gather operation and trial-aligned analysis primitive (§4.8): slices
//! a container by a set of time intervals and composes with the pipeline
//! runtime to produce per-trial reductions or per-trial projected views.

pub use crate::context::Context;

use crate::container::IntervalSeries;
use crate::entity::EntityId;
use crate::error::{EngineError, Result};
use crate::payload::{GenericElement, Payload};
use crate::pipeline::Pipeline;
use crate::time::TimeFrameIndex;
use crate::value_store::{PipelineValueStore, Scalar};

#[derive(Copy, Clone, Debug)]
struct Trial {
    start: i64,
    end: i64,
}

/// An ordered sequence of per-trial views into a source container, produced
/// by slicing it with an [`IntervalSeries`] of trial windows.
pub struct GatherResult {
    trials: Vec<Trial>,
    elements: Vec<GenericElement>,
}

impl GatherResult {
    /// Slices `elements` (must already be in non-decreasing time order) by
    /// `trials`, one view per interval.
    pub fn new(elements: Vec<GenericElement>, trials: &IntervalSeries) -> Self {
        let trials = trials
            .elements()
            .into_iter()
            .map(|el| Trial {
                start: el.interval.start,
                end: el.interval.end,
            })
            .collect();
        Self { trials, elements }
    }

    pub fn size(&self) -> usize {
        self.trials.len()
    }

    /// The source elements whose time falls inside trial `i`'s `[start,
    /// end]` window.
    pub fn view_at(&self, i: usize) -> Vec<GenericElement> {
        let trial = &self.trials[i];
        self.elements
            .iter()
            .filter(|e| e.time.get() >= trial.start && e.time.get() <= trial.end)
            .cloned()
            .collect()
    }

    /// Populates a value store describing trial `i`: `alignment_time`
    /// (the trial's start, the usual time-zero reference point),
    /// `trial_start`, `trial_end`, `trial_duration`.
    pub fn build_trial_store(&self, i: usize) -> PipelineValueStore {
        let trial = &self.trials[i];
        let mut store = PipelineValueStore::new();
        store.set("alignment_time", Scalar::I64(trial.start));
        store.set("trial_start", Scalar::I64(trial.start));
        store.set("trial_end", Scalar::I64(trial.end));
        store.set("trial_duration", Scalar::I64(trial.end - trial.start));
        store
    }

    /// Applies a per-trial projection (built from that trial's value store
    /// by `factory`) to every element in each trial's view.
    pub fn project(
        &self,
        factory: impl Fn(&PipelineValueStore) -> Result<Box<dyn Fn(&GenericElement) -> Result<GenericElement>>>,
    ) -> Result<Vec<Vec<GenericElement>>> {
        (0..self.size())
            .map(|i| {
                let store = self.build_trial_store(i);
                let projector = factory(&store)?;
                self.view_at(i).iter().map(&*projector).collect::<Result<Vec<_>>>()
            })
            .collect()
    }

    /// Runs a per-trial reducer (built from that trial's value store by
    /// `factory`) over each trial's view, returning one scalar per trial.
    pub fn reduce(
        &self,
        factory: impl Fn(&PipelineValueStore) -> Result<Box<dyn Fn(&[GenericElement]) -> Result<Scalar>>>,
    ) -> Result<Vec<Scalar>> {
        (0..self.size())
            .map(|i| {
                let store = self.build_trial_store(i);
                let reducer = factory(&store)?;
                reducer(&self.view_at(i))
            })
            .collect()
    }

    /// Runs [`Self::reduce`] then returns trial indices sorted by the
    /// resulting scalar: stable, ties keep original order, NaN sorts last.
    pub fn sort_indices_by(
        &self,
        factory: impl Fn(&PipelineValueStore) -> Result<Box<dyn Fn(&[GenericElement]) -> Result<Scalar>>>,
    ) -> Result<Vec<usize>> {
        let scalars = self.reduce(factory)?;
        let mut indices: Vec<usize> = (0..scalars.len()).collect();
        indices.sort_by(|&a, &b| {
            let va = scalars[a].as_f64();
            let vb = scalars[b].as_f64();
            match (va, vb) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or_else(|| nan_last(x, y)),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });
        Ok(indices)
    }

    /// A new `GatherResult` whose trials are `indices`' permutation/filter
    /// of this one's.
    pub fn reorder(&self, indices: &[usize]) -> GatherResult {
        GatherResult {
            trials: indices.iter().map(|&i| self.trials[i]).collect(),
            elements: self.elements.clone(),
        }
    }
}

fn nan_last(x: f64, y: f64) -> std::cmp::Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => std::cmp::Ordering::Equal,
    }
}

/// Builds a per-trial projection closure from `pipeline` (expected to
/// contain only element/time-grouped steps): for a given trial's value
/// store, runs the pipeline's step chain against a one-element input so its
/// `param_bindings` resolve against that trial's `alignment_time`/
/// `trial_*` keys (spec §4.5's binding rule, reused verbatim here).
pub fn bind_projection(
    pipeline: Pipeline,
) -> impl Fn(&PipelineValueStore) -> Result<Box<dyn Fn(&GenericElement) -> Result<GenericElement>>> {
    move |trial_store: &PipelineValueStore| {
        let seeded = merge_store_into_params(&pipeline, trial_store)?;
        Ok(Box::new(move |el: &GenericElement| {
            let ctx = Context::new();
            let (out, _) = seeded.execute(vec![vec![(el.time, el.id, el.payload.clone())]], &ctx)?;
            out.into_iter()
                .next()
                .map(|(time, id, payload)| GenericElement { time, id, payload })
                .ok_or_else(|| EngineError::invariant("projection pipeline produced no output for input element"))
        }) as Box<dyn Fn(&GenericElement) -> Result<GenericElement>>)
    }
}

/// Builds a per-trial reducer closure: runs `pipeline`'s steps over the
/// trial's whole view, then applies `reduction_name` (via the same
/// registry §4.6 reductions use) to the transformed stream.
pub fn bind_reducer(
    pipeline: Pipeline,
    reduction_name: impl Into<String>,
) -> impl Fn(&PipelineValueStore) -> Result<Box<dyn Fn(&[GenericElement]) -> Result<Scalar>>> {
    let reduction_name = reduction_name.into();
    move |trial_store: &PipelineValueStore| {
        let seeded = merge_store_into_params(&pipeline, trial_store)?;
        let reduction_name = reduction_name.clone();
        Ok(Box::new(move |elements: &[GenericElement]| {
            let ctx = Context::new();
            let inputs = elements
                .iter()
                .map(|e| (e.time, e.id, e.payload.clone()))
                .collect::<Vec<_>>();
            let (transformed, _) = seeded.execute(vec![inputs], &ctx)?;
            let entry = crate::registry::ReductionRegistry::get(&reduction_name)?;
            let generic: Vec<GenericElement> = transformed
                .into_iter()
                .map(|(time, id, payload)| GenericElement { time, id, payload })
                .collect();
            let params = entry
                .parse_params(&entry.default_params_json())
                .map_err(|source| EngineError::ParameterParseError {
                    transform: reduction_name.clone(),
                    source,
                })?;
            entry.call(&generic, params.as_ref())
        }) as Box<dyn Fn(&[GenericElement]) -> Result<Scalar>>)
    }
}

/// Builds a per-trial view adaptor: identical machinery to
/// [`bind_projection`], exposed separately since callers reaching for "just
/// reshape this trial's view" read more clearly than reusing the
/// projection name for it.
pub fn bind_view_adaptor(
    pipeline: Pipeline,
) -> impl Fn(&PipelineValueStore) -> Result<Box<dyn Fn(&[GenericElement]) -> Result<Vec<GenericElement>>>> {
    move |trial_store: &PipelineValueStore| {
        let seeded = merge_store_into_params(&pipeline, trial_store)?;
        Ok(Box::new(move |elements: &[GenericElement]| {
            let ctx = Context::new();
            let inputs = elements
                .iter()
                .map(|e| (e.time, e.id, e.payload.clone()))
                .collect::<Vec<_>>();
            let (out, _) = seeded.execute(vec![inputs], &ctx)?;
            Ok(out
                .into_iter()
                .map(|(time, id, payload)| GenericElement { time, id, payload })
                .collect())
        }) as Box<dyn Fn(&[GenericElement]) -> Result<Vec<GenericElement>>>)
    }
}

/// Clones `pipeline` and rewrites every step's `param_bindings` target keys
/// so they resolve against `trial_store` by pre-resolving them into literal
/// params up front — the trial store and the pipeline's own pre-reduction
/// store are kept separate (spec's `PipelineValueStore` is pipeline-scoped),
/// so binding a trial key means substituting it into the step's base
/// params before execution rather than merging stores.
fn merge_store_into_params(pipeline: &Pipeline, trial_store: &PipelineValueStore) -> Result<Pipeline> {
    let mut steps = Vec::with_capacity(pipeline.steps.len());
    for step in &pipeline.steps {
        let params = trial_store.apply_bindings(&step.params, &step.param_bindings)?;
        steps.push(crate::pipeline::PipelineStep {
            step_id: step.step_id.clone(),
            transform_name: step.transform_name.clone(),
            params,
            param_bindings: Default::default(),
            enabled: step.enabled,
        });
    }
    let mut pre_reductions = Vec::with_capacity(pipeline.pre_reductions.len());
    for red in &pipeline.pre_reductions {
        let params = trial_store.apply_bindings(&red.params, &red.bindings)?;
        pre_reductions.push(crate::pipeline::ReductionStep {
            reduction_name: red.reduction_name.clone(),
            output_key: red.output_key.clone(),
            params,
            bindings: Default::default(),
        });
    }
    Ok(Pipeline {
        name: pipeline.name.clone(),
        pre_reductions,
        steps,
    })
}
