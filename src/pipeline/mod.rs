//! The pipeline runtime (§4.4): composes element/time-grouped/container
//! transforms into lazy chains, resolves multi-input zipping, runs
//! pre-reductions into a [`PipelineValueStore`], and materialises a final
//! element stream.

mod json;
mod zip;

pub use json::load_pipeline_json;
pub use zip::zip_inputs;

use crate::context::Context;
use crate::entity::EntityId;
use crate::error::{EngineError, Result};
use crate::lineage::{Lineage, MultiSourceStrategy};
use crate::payload::Payload;
use crate::registry::{LineageClass, ReductionRegistry, TransformKind, TransformRegistry};
use crate::time::TimeFrameIndex;
use crate::value_store::{Bindings, PipelineValueStore};
use itertools::Itertools;
use smallvec::{smallvec, SmallVec};
use std::cell::Cell;
use tracing::debug;

/// Almost every `ZippedElement` carries exactly one id/payload; only a
/// multi-input zip's combined tuple needs more than a couple, so inline
/// storage covers the common single-input case without a heap allocation.
type ZippedIds = SmallVec<[EntityId; 2]>;
type ZippedPayloads = SmallVec<[Payload; 2]>;

/// One element flowing through pipeline execution. Before the first step
/// runs it may carry more than one payload (the zipped tuple of a
/// multi-input pipeline's inputs); every step after the first always sees
/// exactly one.
#[derive(Clone, Debug)]
pub struct ZippedElement {
    pub time: TimeFrameIndex,
    pub ids: ZippedIds,
    pub payloads: ZippedPayloads,
}

impl ZippedElement {
    fn single(time: TimeFrameIndex, id: EntityId, payload: Payload) -> Self {
        Self {
            time,
            ids: smallvec![id],
            payloads: smallvec![payload],
        }
    }
}

pub struct PipelineStep {
    pub step_id: Option<String>,
    pub transform_name: String,
    pub params: serde_json::Value,
    pub param_bindings: Bindings,
    pub enabled: bool,
}

pub struct ReductionStep {
    pub reduction_name: String,
    pub output_key: String,
    pub params: serde_json::Value,
    pub bindings: Bindings,
}

#[derive(Default)]
pub struct Pipeline {
    pub name: String,
    pub pre_reductions: Vec<ReductionStep>,
    pub steps: Vec<PipelineStep>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pre_reductions: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// The lineage descriptor this pipeline's output should be recorded
    /// under, given the keys of its inputs. Spec §4.4: multi-input always
    /// produces `MultiSource`/`ZipByTime`; a single input takes the lineage
    /// class declared by the last enabled step (or `Source` if the
    /// pipeline has none, i.e. an identity pass).
    pub fn lineage_for(&self, input_keys: &[String]) -> Result<Lineage> {
        if input_keys.len() > 1 {
            return Ok(Lineage::MultiSource {
                sources: input_keys.to_vec(),
                strategy: MultiSourceStrategy::ZipByTime,
            });
        }
        let source = input_keys.first().cloned().unwrap_or_default();
        let last_enabled = self.steps.iter().rev().find(|s| s.enabled);
        let class = match last_enabled {
            None => LineageClass::Source,
            Some(step) => TransformRegistry::metadata(&step.transform_name)?.lineage_class,
        };
        Ok(match class {
            LineageClass::Source => Lineage::Source,
            LineageClass::OneToOneByTime => Lineage::OneToOneByTime { source },
            LineageClass::AllToOneByTime => Lineage::AllToOneByTime { source },
            LineageClass::Subset => Lineage::Subset {
                source,
                included: Default::default(),
                filtered_from: None,
            },
            LineageClass::None => Lineage::Source,
        })
    }

    /// Runs this pipeline against `inputs` (one element stream per declared
    /// input), returning the final single-payload element stream and the
    /// value store populated by pre-reductions.
    pub fn execute(
        &self,
        inputs: Vec<Vec<(TimeFrameIndex, EntityId, Payload)>>,
        context: &Context,
    ) -> Result<(Vec<(TimeFrameIndex, EntityId, Payload)>, PipelineValueStore)> {
        let mut store = PipelineValueStore::new();

        let lanes: Vec<Vec<ZippedElement>> = inputs
            .into_iter()
            .map(|lane| {
                lane.into_iter()
                    .map(|(t, id, p)| ZippedElement::single(t, id, p))
                    .collect()
            })
            .collect();

        let mut current: Vec<ZippedElement> = zip::zip_inputs(lanes)?;

        for red in &self.pre_reductions {
            let entry = ReductionRegistry::get(&red.reduction_name)?;
            let bound = store.apply_bindings(&red.params, &red.bindings)?;
            let params = entry
                .parse_params(&bound)
                .map_err(|source| binding_or_parse_error(&red.reduction_name, &red.bindings, source))?;
            let flattened: Vec<crate::payload::GenericElement> = current
                .iter()
                .map(|z| crate::payload::GenericElement {
                    time: z.time,
                    id: z.ids.first().copied().unwrap_or(EntityId(0)),
                    payload: z.payloads.first().cloned().unwrap_or(Payload::Unit),
                })
                .collect();
            let scalar = entry.call(&flattened, params.as_ref())?;
            store.set(red.output_key.clone(), scalar);
        }

        let total_steps = self.steps.iter().filter(|s| s.enabled).count();
        let mut done = 0usize;
        let mut fresh_id_counter: u64 = 0;

        for step in &self.steps {
            if !step.enabled {
                continue;
            }
            debug!(pipeline = %self.name, step = %step.transform_name, elements = current.len(), "executing step");
            let entry = TransformRegistry::get(&step.transform_name)?;
            let bound = store.apply_bindings(&step.params, &step.param_bindings)?;
            let params = entry
                .parse_params(&bound)
                .map_err(|source| binding_or_parse_error(&step.transform_name, &step.param_bindings, source))?;

            current = match entry.kind {
                TransformKind::Element => {
                    let f = entry
                        .as_element()
                        .ok_or_else(|| EngineError::invariant("element transform entry missing its function"))?;
                    let total = current.len();
                    let mut out = Vec::with_capacity(total);
                    for (i, el) in current.into_iter().enumerate() {
                        if context.is_cancelled() {
                            return Err(EngineError::Cancelled);
                        }
                        let payload = f(el.time, &el.payloads, params.as_ref())?;
                        out.push(ZippedElement {
                            time: el.time,
                            ids: el.ids,
                            payloads: smallvec![payload],
                        });
                        if i % 100 == 0 {
                            context.report_progress(i, total);
                        }
                    }
                    out
                }
                TransformKind::TimeGrouped => {
                    let f = entry
                        .as_time_grouped()
                        .ok_or_else(|| EngineError::invariant("time-grouped transform entry missing its function"))?;
                    apply_time_grouped(current, f.as_ref(), params.as_ref(), &mut fresh_id_counter)?
                }
                TransformKind::Container => {
                    let f = entry
                        .as_container()
                        .ok_or_else(|| EngineError::invariant("container transform entry missing its function"))?;
                    let flattened: Vec<crate::payload::GenericElement> = current
                        .into_iter()
                        .map(|z| crate::payload::GenericElement {
                            time: z.time,
                            id: z.ids.first().copied().unwrap_or(EntityId(0)),
                            payload: z.payloads.into_iter().next().unwrap_or(Payload::Unit),
                        })
                        .collect();
                    if context.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    let result = f(&[flattened], params.as_ref(), context)?;
                    result
                        .into_iter()
                        .map(|e| ZippedElement::single(e.time, e.id, e.payload))
                        .collect()
                }
            };
            done += 1;
            context.report_progress(done, total_steps);
        }

        let out = current
            .into_iter()
            .map(|z| {
                (
                    z.time,
                    z.ids.first().copied().unwrap_or(EntityId(0)),
                    z.payloads.into_iter().next().unwrap_or(Payload::Unit),
                )
            })
            .collect();
        Ok((out, store))
    }
}

fn binding_or_parse_error(name: &str, bindings: &Bindings, source: serde_json::Error) -> EngineError {
    if let Some(field) = bindings.keys().next() {
        EngineError::BindingTypeMismatch {
            field: field.clone(),
            reason: source.to_string(),
        }
    } else {
        EngineError::ParameterParseError {
            transform: name.to_string(),
            source,
        }
    }
}

/// Groups `current` by time (already in non-decreasing time order, so equal
/// times are always contiguous), runs `f` once per group, and re-flattens.
/// When a group's output length matches its input length, output entity ids
/// are reused positionally; otherwise (a genuine reduction in count, e.g.
/// ragged-to-scalar) fresh ids are minted from `fresh_id_counter`, since the
/// collapsed outputs no longer correspond 1:1 with any single source entity.
fn apply_time_grouped(
    current: Vec<ZippedElement>,
    f: &(dyn Fn(&[Payload], &dyn std::any::Any) -> Result<Vec<Payload>> + Send + Sync),
    params: &dyn std::any::Any,
    fresh_id_counter: &mut u64,
) -> Result<Vec<ZippedElement>> {
    let counter = Cell::new(*fresh_id_counter);
    let mut out = Vec::new();
    let chunks = current.into_iter().chunk_by(|el| el.time);
    for (t, chunk) in &chunks {
        let group: Vec<ZippedElement> = chunk.collect();
        let inputs: Vec<Payload> = group.iter().map(|z| z.payloads[0].clone()).collect();
        let outputs = f(&inputs, params)?;
        if outputs.len() == group.len() {
            for (el, payload) in group.into_iter().zip(outputs) {
                out.push(ZippedElement {
                    time: t,
                    ids: el.ids,
                    payloads: smallvec![payload],
                });
            }
        } else {
            for payload in outputs {
                let id = EntityId(counter.get());
                counter.set(counter.get() + 1);
                out.push(ZippedElement {
                    time: t,
                    ids: smallvec![id],
                    payloads: smallvec![payload],
                });
            }
        }
    }
    *fresh_id_counter = counter.get();
    Ok(out)
}
