//! Loading a [`Pipeline`] from the JSON schema in spec §6.1.

use super::{Pipeline, PipelineStep, ReductionStep};
use crate::error::{EngineError, Result};
use crate::registry::{ReductionRegistry, TransformRegistry};
use crate::value_store::Bindings;
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Deserialize)]
struct PipelineJson {
    name: String,
    #[serde(default)]
    pre_reductions: Vec<ReductionStepJson>,
    #[serde(default)]
    steps: Vec<StepJson>,
}

#[derive(Deserialize)]
struct ReductionStepJson {
    reduction: String,
    output_key: String,
    #[serde(default)]
    params: Option<serde_json::Value>,
    #[serde(default)]
    bindings: Bindings,
}

#[derive(Deserialize)]
struct StepJson {
    #[serde(default)]
    step_id: Option<String>,
    transform: String,
    #[serde(default)]
    params: Option<serde_json::Value>,
    #[serde(default)]
    param_bindings: Bindings,
    #[serde(default)]
    enabled: Option<bool>,
}

/// Parses and validates a pipeline JSON document: unknown transform or
/// reduction names fail the load with `UnknownTransform`/`UnknownReduction`
/// rather than at execution time, and duplicate `step_id`s (when present)
/// fail with `ParameterParseError` since they're a loader-time convenience
/// check, not something later code relies on.
pub fn load_pipeline_json(text: &str) -> Result<Pipeline> {
    let parsed: PipelineJson = serde_json::from_str(text).map_err(|source| EngineError::ParameterParseError {
        transform: "<pipeline>".to_string(),
        source,
    })?;

    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut steps = Vec::with_capacity(parsed.steps.len());
    for step in parsed.steps {
        if !TransformRegistry::has(&step.transform) {
            return Err(EngineError::UnknownTransform(step.transform));
        }
        if let Some(id) = &step.step_id {
            if !seen_ids.insert(id.clone()) {
                return Err(EngineError::ParameterParseError {
                    transform: step.transform,
                    source: <serde_json::Error as serde::de::Error>::custom(format!("duplicate step_id `{id}`")),
                });
            }
        }
        let entry = TransformRegistry::get(&step.transform)?;
        let params = step.params.unwrap_or_else(|| entry.default_params_json());
        steps.push(PipelineStep {
            step_id: step.step_id,
            transform_name: step.transform,
            params,
            param_bindings: step.param_bindings,
            enabled: step.enabled.unwrap_or(true),
        });
    }

    let mut pre_reductions = Vec::with_capacity(parsed.pre_reductions.len());
    for red in parsed.pre_reductions {
        if !ReductionRegistry::has(&red.reduction) {
            return Err(EngineError::UnknownReduction(red.reduction));
        }
        let entry = ReductionRegistry::get(&red.reduction)?;
        let params = red.params.unwrap_or_else(|| entry.default_params_json());
        pre_reductions.push(ReductionStep {
            reduction_name: red.reduction,
            output_key: red.output_key,
            params,
            bindings: red.bindings,
        });
    }

    Ok(Pipeline {
        name: parsed.name,
        pre_reductions,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_transform_fails_load() {
        let json = r#"{"name":"p","steps":[{"transform":"does_not_exist"}]}"#;
        assert!(matches!(
            load_pipeline_json(json),
            Err(EngineError::UnknownTransform(_))
        ));
    }

    #[test]
    fn empty_steps_load_as_identity() {
        let json = r#"{"name":"p"}"#;
        let pipeline = load_pipeline_json(json).unwrap();
        assert!(pipeline.steps.is_empty());
        assert!(pipeline.pre_reductions.is_empty());
    }

    #[test]
    #[cfg(feature = "builtin-transforms")]
    fn duplicate_step_ids_rejected() {
        let json = r#"{"name":"p","steps":[
            {"step_id":"s1","transform":"mask_area"},
            {"step_id":"s1","transform":"mask_area"}
        ]}"#;
        crate::builtin::ensure_registered();
        assert!(matches!(
            load_pipeline_json(json),
            Err(EngineError::ParameterParseError { .. })
        ));
    }
}
