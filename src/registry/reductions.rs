use super::ReductionRegistration;
use crate::error::{EngineError, Result};
use crate::payload::{GenericElement, PayloadKind};
use crate::value_store::Scalar;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ReductionKind {
    Event,
    Value,
}

#[derive(Clone)]
pub struct ReductionMetadata {
    pub name: &'static str,
    pub kind: ReductionKind,
    pub input_type: PayloadKind,
    pub description: &'static str,
}

pub type ReductionFn = Arc<dyn Fn(&[GenericElement], &dyn Any) -> Result<Scalar> + Send + Sync>;
pub type ReductionParseParamsFn =
    Arc<dyn Fn(&serde_json::Value) -> std::result::Result<Box<dyn Any + Send + Sync>, serde_json::Error> + Send + Sync>;
pub type ReductionDefaultParamsFn = Arc<dyn Fn() -> serde_json::Value + Send + Sync>;

#[derive(Clone)]
pub struct ReductionEntry {
    pub metadata: ReductionMetadata,
    func: ReductionFn,
    parse_params: ReductionParseParamsFn,
    default_params: ReductionDefaultParamsFn,
}

impl ReductionEntry {
    pub fn new(
        metadata: ReductionMetadata,
        func: ReductionFn,
        parse_params: ReductionParseParamsFn,
        default_params: ReductionDefaultParamsFn,
    ) -> Self {
        Self {
            metadata,
            func,
            parse_params,
            default_params,
        }
    }

    pub fn call(&self, elements: &[GenericElement], params: &dyn Any) -> Result<Scalar> {
        (self.func)(elements, params)
    }

    pub fn parse_params(&self, json: &serde_json::Value) -> std::result::Result<Box<dyn Any + Send + Sync>, serde_json::Error> {
        (self.parse_params)(json)
    }

    pub fn default_params_json(&self) -> serde_json::Value {
        (self.default_params)()
    }
}

static REGISTRY: Lazy<RwLock<HashMap<&'static str, ReductionEntry>>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for registration in inventory::iter::<ReductionRegistration> {
        let entry = (registration.0)();
        map.insert(entry.metadata.name, entry);
    }
    RwLock::new(map)
});

pub struct ReductionRegistry;

impl ReductionRegistry {
    pub fn register(entry: ReductionEntry) {
        REGISTRY.write().insert(entry.metadata.name, entry);
    }

    pub fn has(name: &str) -> bool {
        REGISTRY.read().contains_key(name)
    }

    pub fn get(name: &str) -> Result<ReductionEntry> {
        REGISTRY
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownReduction(name.to_string()))
    }

    pub fn list() -> Vec<&'static str> {
        let mut names: Vec<&'static str> = REGISTRY.read().keys().copied().collect();
        names.sort_unstable();
        names
    }
}
