//! [`PipelineValueStore`]: a flat `string -> Scalar` scratch space populated
//! by range reductions and consumed by parameter bindings (§4.5).
//!
//! Binding application is a pure string-level substitution over JSON: the
//! step's base parameters are serialised, each bound field's value is
//! replaced by the store entry's JSON form, and the result is deserialised
//! back into the concrete parameter type at the registry boundary. This
//! sidesteps needing compile-time knowledge of every parameter type in the
//! binding machinery itself (spec's "reflection substitute").

use crate::error::{EngineError, Result};
use ahash::AHashMap;
use std::collections::HashMap;

/// The closed set of value kinds a reduction can deposit into the store.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    I64(i64),
    F64(f64),
    Bool(bool),
    Str(String),
    I64Vec(Vec<i64>),
    F64Vec(Vec<f64>),
    StrVec(Vec<String>),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::I64(v) => Some(*v as f64),
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// A mapping from a parameter-struct field name to a value-store key,
/// applied to a step's base parameters before it executes.
pub type Bindings = HashMap<String, String>;

#[derive(Default)]
pub struct PipelineValueStore {
    values: AHashMap<String, Scalar>,
}

impl PipelineValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Scalar) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Applies `bindings` to `params`, returning the substituted JSON value.
    /// `params` must be a JSON object; a bound field is inserted or
    /// overwritten with the store entry's JSON form. Fails with
    /// `BindingMissingKey` if a binding names an absent store key.
    pub fn apply_bindings(
        &self,
        params: &serde_json::Value,
        bindings: &Bindings,
    ) -> Result<serde_json::Value> {
        let mut out = params.clone();
        if bindings.is_empty() {
            return Ok(out);
        }
        let obj = out
            .as_object_mut()
            .ok_or_else(|| EngineError::invariant("pipeline params must be a JSON object to bind into"))?;
        for (field, store_key) in bindings {
            let value = self
                .values
                .get(store_key)
                .ok_or_else(|| EngineError::BindingMissingKey(store_key.clone()))?;
            obj.insert(field.clone(), value.to_json());
        }
        Ok(out)
    }
}
