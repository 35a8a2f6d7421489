use std::sync::Arc;

use serde_json::{Map, Value};

use crate::executor::RemoteExecutor;
use crate::transform::{Transform, TransformPipeline};
use crate::type_graph::TypeGraph;

/// Outcome of a dedicated field resolver.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Value(Value),
    NotFound,
}

/// A backend's type graph together with its field resolvers.
pub trait ResolverSet: Send + Sync {
    fn type_graph(&self) -> &TypeGraph;

    /// Resolves `type_name.field_name` with coerced `args`.
    ///
    /// `None` means the field has no dedicated resolver and is read from the
    /// parent object by name.
    fn resolve(&self, type_name: &str, field_name: &str, args: &Map<String, Value>) -> Option<Resolution>;
}

/// Startup configuration of one subschema, before transforms are applied.
pub struct SubschemaConfig {
    pub name: String,
    pub type_graph: TypeGraph,
    pub executor: Arc<dyn RemoteExecutor>,
    pub transforms: TransformPipeline,
}

impl SubschemaConfig {
    pub fn new(name: impl Into<String>, type_graph: TypeGraph, executor: Arc<dyn RemoteExecutor>) -> Self {
        SubschemaConfig {
            name: name.into(),
            type_graph,
            executor,
            transforms: TransformPipeline::new(),
        }
    }

    pub fn with_transform<T: Transform + 'static>(mut self, transform: T) -> Self {
        self.transforms.push(transform);
        self
    }
}

/// A subschema as owned by the composed schema: transforms already applied.
pub struct Subschema {
    pub name: String,
    pub type_graph: TypeGraph,
    pub executor: Arc<dyn RemoteExecutor>,
}

impl std::fmt::Debug for Subschema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subschema")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
