//! Merges independently defined subschemas into one composed schema and
//! records which subschema owns every object field.
//!
//! Merge rules, by the kinds of the two definitions sharing a type name:
//!
//! | existing \ incoming | same kind                                   | other kind        |
//! |---------------------|---------------------------------------------|-------------------|
//! | object              | union of fields, a shared field is rejected | `TypeKindConflict`|
//! | scalar              | kept once                                   | `TypeKindConflict`|
//! | enum                | value sets must be equal                    | `TypeKindConflict`|
//! | input object        | fields must be equal                        | `TypeKindConflict`|
//!
//! Descriptions follow "last non-empty wins" in subschema order.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use indexmap::map::Entry;
use tracing::{debug, info};

use crate::subschema::{Subschema, SubschemaConfig};
use crate::type_graph::{
    RootTypes, TypeDefinition, TypeGraph, TypeGraphError, TypeKind, canonical_root_name,
};

pub type SubschemaId = usize;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CompositionError {
    #[error("No subschemas to compose")]
    NoSubschemas,
    #[error("Subschema \"{0}\" is registered more than once")]
    DuplicateService(String),
    #[error(
        "Field \"{type_name}.{field}\" is defined by both \"{first}\" and \"{second}\"; ownership is ambiguous"
    )]
    AmbiguousFieldOwnership {
        type_name: String,
        field: String,
        first: String,
        second: String,
    },
    #[error("Type \"{type_name}\" is {first_kind} in \"{first}\" but {second_kind} in \"{second}\"")]
    TypeKindConflict {
        type_name: String,
        first_kind: TypeKind,
        first: String,
        second_kind: TypeKind,
        second: String,
    },
    #[error("Enum \"{type_name}\" has different values in \"{first}\" and \"{second}\"")]
    EnumValuesMismatch {
        type_name: String,
        first: String,
        second: String,
    },
    #[error("Input object \"{type_name}\" has different fields in \"{first}\" and \"{second}\"")]
    InputObjectMismatch {
        type_name: String,
        first: String,
        second: String,
    },
    #[error("Type \"{type_name}\" of \"{service}\" collides with a root operation type")]
    RootTypeConflict { type_name: String, service: String },
    #[error("Composed schema is invalid: {0}")]
    InvalidComposedSchema(TypeGraphError),
}

/// Owner of every `(type, field)` pair of the composed schema's object types.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DelegationPlan {
    owners: HashMap<String, HashMap<String, SubschemaId>>,
}

impl DelegationPlan {
    fn insert(&mut self, type_name: &str, field: &str, owner: SubschemaId) {
        self.owners
            .entry(type_name.to_string())
            .or_default()
            .insert(field.to_string(), owner);
    }

    pub fn owner(&self, type_name: &str, field: &str) -> Option<SubschemaId> {
        self.owners
            .get(type_name)
            .and_then(|fields| fields.get(field))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.owners.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The merged schema served by the gateway. Built once, read-only afterwards.
#[derive(Debug)]
pub struct ComposedSchema {
    type_graph: TypeGraph,
    subschemas: Vec<Subschema>,
    delegation_plan: DelegationPlan,
}

impl ComposedSchema {
    pub fn type_graph(&self) -> &TypeGraph {
        &self.type_graph
    }

    pub fn subschemas(&self) -> &[Subschema] {
        &self.subschemas
    }

    pub fn subschema(&self, id: SubschemaId) -> &Subschema {
        &self.subschemas[id]
    }

    pub fn delegation_plan(&self) -> &DelegationPlan {
        &self.delegation_plan
    }

    pub fn owner_of(&self, type_name: &str, field: &str) -> Option<&Subschema> {
        self.delegation_plan
            .owner(type_name, field)
            .map(|id| self.subschema(id))
    }
}

struct MergedType {
    definition: TypeDefinition,
    origin: SubschemaId,
}

pub struct SchemaComposer;

impl SchemaComposer {
    pub fn compose(configs: Vec<SubschemaConfig>) -> Result<ComposedSchema, CompositionError> {
        if configs.is_empty() {
            return Err(CompositionError::NoSubschemas);
        }

        let mut names = HashSet::new();
        for config in &configs {
            if !names.insert(config.name.as_str()) {
                return Err(CompositionError::DuplicateService(config.name.clone()));
            }
        }

        let subschemas: Vec<Subschema> = configs
            .into_iter()
            .map(|config| {
                let type_graph = config.transforms.apply(config.type_graph);
                debug!(
                    service = %config.name,
                    transforms = config.transforms.len(),
                    "prepared subschema"
                );
                Subschema {
                    name: config.name,
                    type_graph,
                    executor: config.executor,
                }
            })
            .collect();

        let mut merged: IndexMap<String, MergedType> = IndexMap::new();
        let mut delegation_plan = DelegationPlan::default();
        let mut roots = RootTypes::default();

        for (id, subschema) in subschemas.iter().enumerate() {
            for (role, _) in subschema.type_graph.roots().iter() {
                match role {
                    "mutation" => roots.mutation = Some(canonical_root_name(role).to_string()),
                    "subscription" => roots.subscription = Some(canonical_root_name(role).to_string()),
                    _ => {}
                }
            }

            for (definition, is_root) in subschema.type_graph.clone().into_canonical_definitions() {
                if !is_root && is_root_name(definition.name()) {
                    return Err(CompositionError::RootTypeConflict {
                        type_name: definition.name().to_string(),
                        service: subschema.name.clone(),
                    });
                }
                merge_definition(&mut merged, &mut delegation_plan, &subschemas, id, definition)?;
            }
        }

        let types = merged
            .into_iter()
            .map(|(name, merged_type)| (name, merged_type.definition))
            .collect();
        let type_graph =
            TypeGraph::from_parts(roots, types).map_err(CompositionError::InvalidComposedSchema)?;

        info!(
            subschemas = subschemas.len(),
            types = type_graph.types().count(),
            fields = delegation_plan.len(),
            "composed schema"
        );

        Ok(ComposedSchema {
            type_graph,
            subschemas,
            delegation_plan,
        })
    }
}

fn is_root_name(name: &str) -> bool {
    matches!(name, "Query" | "Mutation" | "Subscription")
}

fn merge_definition(
    merged: &mut IndexMap<String, MergedType>,
    delegation_plan: &mut DelegationPlan,
    subschemas: &[Subschema],
    id: SubschemaId,
    incoming: TypeDefinition,
) -> Result<(), CompositionError> {
    let name = incoming.name().to_string();

    let existing = match merged.entry(name.clone()) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => {
            if let TypeDefinition::Object(object) = &incoming {
                for field in &object.fields {
                    delegation_plan.insert(&name, &field.name, id);
                }
            }
            entry.insert(MergedType {
                definition: incoming,
                origin: id,
            });
            return Ok(());
        }
    };

    let first = subschemas[existing.origin].name.clone();
    let second = subschemas[id].name.clone();
    let description = incoming.description().map(str::to_string);

    match (&mut existing.definition, incoming) {
        (TypeDefinition::Object(existing_object), TypeDefinition::Object(incoming_object)) => {
            for field in incoming_object.fields {
                if let Some(owner) = delegation_plan.owner(&name, &field.name) {
                    return Err(CompositionError::AmbiguousFieldOwnership {
                        type_name: name,
                        field: field.name,
                        first: subschemas[owner].name.clone(),
                        second,
                    });
                }
                delegation_plan.insert(&name, &field.name, id);
                existing_object.fields.push(field);
            }
        }
        (TypeDefinition::Scalar(_), TypeDefinition::Scalar(_)) => {}
        (TypeDefinition::Enum(existing_enum), TypeDefinition::Enum(incoming_enum)) => {
            let existing_values: HashSet<&String> = existing_enum.values.iter().collect();
            let incoming_values: HashSet<&String> = incoming_enum.values.iter().collect();
            if existing_values != incoming_values {
                return Err(CompositionError::EnumValuesMismatch {
                    type_name: name,
                    first,
                    second,
                });
            }
        }
        (TypeDefinition::InputObject(existing_input), TypeDefinition::InputObject(incoming_input)) => {
            let same_fields = existing_input.fields.len() == incoming_input.fields.len()
                && incoming_input.fields.iter().all(|field| {
                    existing_input
                        .fields
                        .iter()
                        .any(|existing| existing.name == field.name && existing.ty == field.ty)
                });
            if !same_fields {
                return Err(CompositionError::InputObjectMismatch {
                    type_name: name,
                    first,
                    second,
                });
            }
        }
        (existing_definition, incoming) => {
            return Err(CompositionError::TypeKindConflict {
                type_name: name,
                first_kind: existing_definition.kind(),
                first,
                second_kind: incoming.kind(),
                second,
            });
        }
    }

    if description.is_some() {
        existing.definition.set_description(description);
    }
    Ok(())
}
