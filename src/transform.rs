use std::sync::Arc;

use crate::type_graph::TypeGraph;

/// A pure rewrite of a subschema's type graph, applied before composition.
pub trait Transform: Send + Sync {
    fn apply(&self, type_graph: TypeGraph) -> TypeGraph;
}

/// Appends `Resolved by <service>.` to the documentation of every object field.
///
/// Applying the transform twice does not stack annotations: a field whose
/// documentation already ends with the annotation is left alone.
#[derive(Clone, Debug)]
pub struct ProvenanceTransform {
    service_name: String,
}

impl ProvenanceTransform {
    pub fn new(service_name: impl Into<String>) -> Self {
        ProvenanceTransform {
            service_name: service_name.into(),
        }
    }

    pub fn annotation(&self) -> String {
        format!("Resolved by {}.", self.service_name)
    }
}

impl Default for ProvenanceTransform {
    fn default() -> Self {
        ProvenanceTransform::new("unknown")
    }
}

impl Transform for ProvenanceTransform {
    fn apply(&self, mut type_graph: TypeGraph) -> TypeGraph {
        let annotation = self.annotation();

        for object in type_graph.objects_mut() {
            for field in &mut object.fields {
                field.description = Some(match field.description.take() {
                    None => annotation.clone(),
                    Some(existing) if existing.lines().last() == Some(annotation.as_str()) => {
                        existing
                    }
                    Some(existing) => format!("{}\n{}", existing, annotation),
                });
            }
        }

        type_graph
    }
}

/// Ordered list of transforms, applied left to right.
#[derive(Clone, Default)]
pub struct TransformPipeline {
    transforms: Vec<Arc<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        TransformPipeline::default()
    }

    pub fn push<T: Transform + 'static>(&mut self, transform: T) {
        self.transforms.push(Arc::new(transform));
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn apply(&self, type_graph: TypeGraph) -> TypeGraph {
        self.transforms
            .iter()
            .fold(type_graph, |type_graph, transform| transform.apply(type_graph))
    }
}
