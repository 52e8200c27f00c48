use super::{TransformRegistration};
use crate::error::{EngineError, Result};
use crate::context::Context;
use crate::payload::{GenericElement, Payload, PayloadKind};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// The lineage class a transform declares for the containers it produces,
/// restricted to the subset spec §4.3 allows a transform to claim
/// automatically; `MultiSource`/`Explicit`/`EntityMapped`/`ImplicitEntityMap`
/// lineage (§3.6) can only be recorded by hand, never inferred from a
/// transform's own metadata.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LineageClass {
    Source,
    OneToOneByTime,
    AllToOneByTime,
    Subset,
    None,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TransformKind {
    Element,
    TimeGrouped,
    Container,
}

pub type ParamsBox = Box<dyn Any + Send + Sync>;
pub type ParseParamsFn = Arc<dyn Fn(&serde_json::Value) -> std::result::Result<ParamsBox, serde_json::Error> + Send + Sync>;
pub type DefaultParamsFn = Arc<dyn Fn() -> serde_json::Value + Send + Sync>;

/// `fn(time, inputs, &Params) -> P_out`, one call per `(time, local_index)`
/// position; `inputs` has one entry per declared arity. The element's own
/// time is passed alongside its payload(s) since some transforms need it
/// (e.g. `normalize_event_time` subtracting a bound alignment time).
pub type ElementTransformFn =
    Arc<dyn Fn(crate::time::TimeFrameIndex, &[Payload], &dyn Any) -> Result<Payload> + Send + Sync>;

/// `fn(&[P_in] at time t, &Params) -> Vec<P_out> at time t`; single input
/// only (a ragged container's whole group at one time).
pub type TimeGroupedTransformFn = Arc<dyn Fn(&[Payload], &dyn Any) -> Result<Vec<Payload>> + Send + Sync>;

/// `fn(&[Container_in], &Params, &Context) -> Container_out`, for operations
/// that cannot be expressed element-wise.
pub type ContainerTransformFn =
    Arc<dyn Fn(&[Vec<GenericElement>], &dyn Any, &Context) -> Result<Vec<GenericElement>> + Send + Sync>;

#[derive(Clone)]
pub struct TransformMetadata {
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub input_types: Vec<PayloadKind>,
    pub output_type: PayloadKind,
    pub lineage_class: LineageClass,
    pub arity: usize,
    pub expensive: bool,
    pub deterministic: bool,
    pub context_bindings: Vec<&'static str>,
}

enum TransformBody {
    Element(ElementTransformFn),
    TimeGrouped(TimeGroupedTransformFn),
    Container(ContainerTransformFn),
}

#[derive(Clone)]
pub struct TransformEntry {
    pub metadata: TransformMetadata,
    pub kind: TransformKind,
    body: Arc<TransformBody>,
    parse_params: ParseParamsFn,
    default_params: DefaultParamsFn,
}

impl TransformEntry {
    pub fn element(
        metadata: TransformMetadata,
        f: ElementTransformFn,
        parse_params: ParseParamsFn,
        default_params: DefaultParamsFn,
    ) -> Self {
        Self {
            metadata,
            kind: TransformKind::Element,
            body: Arc::new(TransformBody::Element(f)),
            parse_params,
            default_params,
        }
    }

    pub fn time_grouped(
        metadata: TransformMetadata,
        f: TimeGroupedTransformFn,
        parse_params: ParseParamsFn,
        default_params: DefaultParamsFn,
    ) -> Self {
        Self {
            metadata,
            kind: TransformKind::TimeGrouped,
            body: Arc::new(TransformBody::TimeGrouped(f)),
            parse_params,
            default_params,
        }
    }

    pub fn container(
        metadata: TransformMetadata,
        f: ContainerTransformFn,
        parse_params: ParseParamsFn,
        default_params: DefaultParamsFn,
    ) -> Self {
        Self {
            metadata,
            kind: TransformKind::Container,
            body: Arc::new(TransformBody::Container(f)),
            parse_params,
            default_params,
        }
    }

    pub fn parse_params(&self, json: &serde_json::Value) -> std::result::Result<ParamsBox, serde_json::Error> {
        (self.parse_params)(json)
    }

    pub fn default_params_json(&self) -> serde_json::Value {
        (self.default_params)()
    }

    pub fn as_element(&self) -> Option<&ElementTransformFn> {
        match self.body.as_ref() {
            TransformBody::Element(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_time_grouped(&self) -> Option<&TimeGroupedTransformFn> {
        match self.body.as_ref() {
            TransformBody::TimeGrouped(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&ContainerTransformFn> {
        match self.body.as_ref() {
            TransformBody::Container(f) => Some(f),
            _ => None,
        }
    }
}

static REGISTRY: Lazy<RwLock<HashMap<&'static str, TransformEntry>>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for registration in inventory::iter::<TransformRegistration> {
        let entry = (registration.0)();
        map.insert(entry.metadata.name, entry);
    }
    RwLock::new(map)
});

/// The global transform registry. All methods go through a process-wide
/// `RwLock`; built-in transforms self-register via `inventory` before first
/// use, and callers may additionally `register` their own at runtime (tests
/// do this for transforms with no reason to live in the built-in catalog).
pub struct TransformRegistry;

impl TransformRegistry {
    pub fn register(entry: TransformEntry) {
        REGISTRY.write().insert(entry.metadata.name, entry);
    }

    pub fn has(name: &str) -> bool {
        REGISTRY.read().contains_key(name)
    }

    pub fn get(name: &str) -> Result<TransformEntry> {
        REGISTRY
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTransform(name.to_string()))
    }

    pub fn metadata(name: &str) -> Result<TransformMetadata> {
        Self::get(name).map(|e| e.metadata)
    }

    pub fn list() -> Vec<&'static str> {
        let mut names: Vec<&'static str> = REGISTRY.read().keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn list_by_category(category: &str) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = REGISTRY
            .read()
            .values()
            .filter(|e| e.metadata.category == category)
            .map(|e| e.metadata.name)
            .collect();
        names.sort_unstable();
        names
    }
}
