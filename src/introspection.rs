//! Gateway-side answers to `__schema` and `__type`.
//!
//! Both are read from the composed type graph, so clients see the stitched
//! schema with every description the transforms attached to it.

use std::collections::HashMap;

use graphql_parser::query::{Field, FragmentDefinition, Selection, SelectionSet, TypeCondition};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::operation::{self, response_key};
use crate::query_planner::{PlanningError, check_type_condition, same_field};
use crate::type_graph::{
    BUILTIN_SCALARS, FieldDefinition, InputValueDefinition, TypeDefinition, TypeGraph, TypeRef, literal_to_json,
};

pub(crate) const SCHEMA_FIELD: &str = "__schema";
pub(crate) const TYPE_FIELD: &str = "__type";

pub(crate) fn is_introspection_field(name: &str) -> bool {
    name == SCHEMA_FIELD || name == TYPE_FIELD
}

struct DirectiveDefinition {
    name: &'static str,
    description: &'static str,
    locations: &'static [&'static str],
    arguments: Vec<InputValueDefinition>,
}

fn builtin_directives() -> Vec<DirectiveDefinition> {
    let condition = |description: &str| InputValueDefinition {
        name: "if".to_string(),
        description: Some(description.to_string()),
        ty: TypeRef::NonNull(Box::new(TypeRef::Named("Boolean".to_string()))),
        default_value: None,
    };
    vec![
        DirectiveDefinition {
            name: "include",
            description: "Directs the executor to include this field or fragment only when the `if` argument is true.",
            locations: &["FIELD", "FRAGMENT_SPREAD", "INLINE_FRAGMENT"],
            arguments: vec![condition("Included when true.")],
        },
        DirectiveDefinition {
            name: "skip",
            description: "Directs the executor to skip this field or fragment when the `if` argument is true.",
            locations: &["FIELD", "FRAGMENT_SPREAD", "INLINE_FRAGMENT"],
            arguments: vec![condition("Skipped when true.")],
        },
    ]
}

#[derive(Clone, Copy)]
enum TypeNode<'i> {
    Named(&'i str),
    List(&'i TypeRef),
    NonNull(&'i TypeRef),
}

impl<'i> From<&'i TypeRef> for TypeNode<'i> {
    fn from(ty: &'i TypeRef) -> Self {
        match ty {
            TypeRef::Named(name) => TypeNode::Named(name),
            TypeRef::List(inner) => TypeNode::List(inner),
            TypeRef::NonNull(inner) => TypeNode::NonNull(inner),
        }
    }
}

/// A value of one of the introspection meta types.
#[derive(Clone, Copy)]
enum Node<'i> {
    Schema,
    Type(TypeNode<'i>),
    Field(&'i FieldDefinition),
    InputValue(&'i InputValueDefinition),
    EnumValue(&'i str),
    Directive(&'i DirectiveDefinition),
}

impl Node<'_> {
    fn type_name(&self) -> &'static str {
        match self {
            Node::Schema => "__Schema",
            Node::Type(_) => "__Type",
            Node::Field(_) => "__Field",
            Node::InputValue(_) => "__InputValue",
            Node::EnumValue(_) => "__EnumValue",
            Node::Directive(_) => "__Directive",
        }
    }
}

/// A meta field before completion, tagged with its declared type.
enum Resolved<'i> {
    Leaf(&'static str, Value),
    Object(&'static str, Option<Node<'i>>),
    List(&'static str, Option<Vec<Node<'i>>>),
}

fn leaf<'i>(declared: &'static str, value: impl Into<Value>) -> Option<Resolved<'i>> {
    Some(Resolved::Leaf(declared, value.into()))
}

fn object<'i>(declared: &'static str, node: Option<Node<'i>>) -> Option<Resolved<'i>> {
    Some(Resolved::Object(declared, node))
}

fn list<'i>(declared: &'static str, nodes: Option<Vec<Node<'i>>>) -> Option<Resolved<'i>> {
    Some(Resolved::List(declared, nodes))
}

fn has_selection(field: &Field<'_, String>) -> bool {
    !field.selection_set.items.is_empty()
}

fn check_arguments(type_name: &str, field: &Field<'_, String>) -> Result<(), PlanningError> {
    let allowed: &[&str] = match field.name.as_str() {
        TYPE_FIELD => &["name"],
        "fields" | "args" | "enumValues" | "inputFields" => &["includeDeprecated"],
        _ => &[],
    };
    match field
        .arguments
        .iter()
        .find(|(argument, _)| !allowed.contains(&argument.as_str()))
    {
        Some((argument, _)) => Err(PlanningError::UnknownArgument {
            type_name: type_name.to_string(),
            field: field.name.clone(),
            argument: argument.clone(),
        }),
        None => Ok(()),
    }
}

/// Answers introspection selections of one operation.
pub(crate) struct Introspector<'s, 'd, 'a> {
    type_graph: &'s TypeGraph,
    fragments: &'s HashMap<&'d str, &'d FragmentDefinition<'a, String>>,
    variables: &'s Map<String, Value>,
    directives: Vec<DirectiveDefinition>,
}

impl<'s, 'd, 'a> Introspector<'s, 'd, 'a> {
    pub(crate) fn new(
        type_graph: &'s TypeGraph,
        fragments: &'s HashMap<&'d str, &'d FragmentDefinition<'a, String>>,
        variables: &'s Map<String, Value>,
    ) -> Self {
        Introspector {
            type_graph,
            fragments,
            variables,
            directives: builtin_directives(),
        }
    }

    /// Resolves a root `__schema` or `__type` selection to its response value.
    /// An unknown `__type` name resolves to null.
    pub(crate) fn resolve_root<'f>(&self, field: &'f Field<'a, String>) -> Result<Value, PlanningError>
    where
        'd: 'f,
    {
        check_arguments(&self.type_graph.roots().query, field)?;

        if field.name == SCHEMA_FIELD {
            return self.complete_resolved(Resolved::Object("__Schema!", Some(Node::Schema)), &[field]);
        }

        let name = field
            .arguments
            .iter()
            .find(|(argument, _)| argument == "name")
            .map(|(_, value)| literal_to_json(value, Some(self.variables)));
        let Some(Value::String(name)) = name else {
            return Err(PlanningError::MissingArgument {
                field: field.name.clone(),
                argument: "name".to_string(),
                ty: "String!".to_string(),
            });
        };
        let node = self.named(&name).map(|name| Node::Type(TypeNode::Named(name)));
        self.complete_resolved(Resolved::Object("__Type", node), &[field])
    }

    fn named(&self, name: &str) -> Option<&'s str> {
        self.type_graph
            .get(name)
            .map(TypeDefinition::name)
            .or_else(|| BUILTIN_SCALARS.into_iter().find(|scalar| *scalar == name))
    }

    /// Groups the selected fields by response key, expanding fragments on
    /// `type_name`.
    fn collect_fields<'f>(
        &self,
        type_name: &str,
        selection_set: &'f SelectionSet<'a, String>,
        fields: &mut IndexMap<&'f str, Vec<&'f Field<'a, String>>>,
        visited: &mut Vec<&'f str>,
    ) -> Result<(), PlanningError>
    where
        'd: 'f,
    {
        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => {
                    if operation::is_included(&field.directives, self.variables) {
                        fields.entry(response_key(field)).or_default().push(field);
                    }
                }
                Selection::InlineFragment(inline) => {
                    if let Some(TypeCondition::On(on)) = &inline.type_condition {
                        check_type_condition(on, type_name)?;
                    }
                    if operation::is_included(&inline.directives, self.variables) {
                        self.collect_fields(type_name, &inline.selection_set, fields, visited)?;
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.as_str();
                    if visited.contains(&name) {
                        return Err(PlanningError::FragmentCycle(name.to_string()));
                    }
                    let fragment: &'d FragmentDefinition<'a, String> = *self
                        .fragments
                        .get(name)
                        .ok_or_else(|| PlanningError::UnknownFragment(name.to_string()))?;
                    let TypeCondition::On(on) = &fragment.type_condition;
                    check_type_condition(on, type_name)?;

                    if operation::is_included(&spread.directives, self.variables) {
                        visited.push(name);
                        self.collect_fields(type_name, &fragment.selection_set, fields, visited)?;
                        visited.pop();
                    }
                }
            }
        }
        Ok(())
    }

    fn complete<'i, 'f>(&'i self, node: Node<'i>, nodes: &[&'f Field<'a, String>]) -> Result<Value, PlanningError>
    where
        'd: 'f,
    {
        let type_name = node.type_name();
        let mut fields = IndexMap::new();
        for &field in nodes {
            self.collect_fields(type_name, &field.selection_set, &mut fields, &mut Vec::new())?;
        }

        let mut data = Map::new();
        for (key, selected) in fields {
            let field = selected[0];
            if selected.iter().any(|other| !same_field(field, other)) {
                return Err(PlanningError::ResponseKeyConflict(key.to_string()));
            }

            let resolved = if field.name == "__typename" {
                Resolved::Leaf("String!", Value::from(type_name))
            } else {
                self.resolve_field(node, &field.name)
                    .ok_or_else(|| PlanningError::UnknownField {
                        type_name: type_name.to_string(),
                        field: field.name.clone(),
                    })?
            };
            check_arguments(type_name, field)?;

            data.insert(key.to_string(), self.complete_resolved(resolved, &selected)?);
        }
        Ok(Value::Object(data))
    }

    fn complete_resolved<'i, 'f>(
        &'i self,
        resolved: Resolved<'i>,
        selected: &[&'f Field<'a, String>],
    ) -> Result<Value, PlanningError>
    where
        'd: 'f,
    {
        let name = &selected[0].name;
        let require_selection = |declared: &str| {
            if selected.iter().all(|field| has_selection(field)) {
                Ok(())
            } else {
                Err(PlanningError::MissingSelection {
                    type_name: declared.to_string(),
                    field: name.clone(),
                })
            }
        };

        match resolved {
            Resolved::Leaf(declared, value) => {
                if selected.iter().any(|field| has_selection(field)) {
                    return Err(PlanningError::SelectionOnLeaf {
                        type_name: declared.to_string(),
                        field: name.clone(),
                    });
                }
                Ok(value)
            }
            Resolved::Object(declared, node) => {
                require_selection(declared)?;
                match node {
                    Some(node) => self.complete(node, selected),
                    None => Ok(Value::Null),
                }
            }
            Resolved::List(declared, nodes) => {
                require_selection(declared)?;
                match nodes {
                    Some(nodes) => nodes
                        .into_iter()
                        .map(|node| self.complete(node, selected))
                        .collect::<Result<Vec<_>, _>>()
                        .map(Value::Array),
                    None => Ok(Value::Null),
                }
            }
        }
    }

    fn resolve_field<'i>(&'i self, node: Node<'i>, name: &str) -> Option<Resolved<'i>> {
        match node {
            Node::Schema => self.schema_field(name),
            Node::Type(ty) => self.type_field(ty, name),
            Node::Field(field) => match name {
                "name" => leaf("String!", field.name.as_str()),
                "description" => leaf("String", field.description.as_deref()),
                "args" => list(
                    "[__InputValue!]!",
                    Some(field.arguments.iter().map(Node::InputValue).collect()),
                ),
                "type" => object("__Type!", Some(Node::Type((&field.ty).into()))),
                "isDeprecated" => leaf("Boolean!", false),
                "deprecationReason" => leaf("String", Value::Null),
                _ => None,
            },
            Node::InputValue(input) => match name {
                "name" => leaf("String!", input.name.as_str()),
                "description" => leaf("String", input.description.as_deref()),
                "type" => object("__Type!", Some(Node::Type((&input.ty).into()))),
                "defaultValue" => leaf(
                    "String",
                    input.default_value.as_ref().map(|default| default.literal.as_str()),
                ),
                "isDeprecated" => leaf("Boolean!", false),
                "deprecationReason" => leaf("String", Value::Null),
                _ => None,
            },
            Node::EnumValue(value) => match name {
                "name" => leaf("String!", value),
                "description" | "deprecationReason" => leaf("String", Value::Null),
                "isDeprecated" => leaf("Boolean!", false),
                _ => None,
            },
            Node::Directive(directive) => match name {
                "name" => leaf("String!", directive.name),
                "description" => leaf("String", directive.description),
                "locations" => leaf("[__DirectiveLocation!]!", directive.locations.to_vec()),
                "args" => list(
                    "[__InputValue!]!",
                    Some(directive.arguments.iter().map(Node::InputValue).collect()),
                ),
                "isRepeatable" => leaf("Boolean!", false),
                _ => None,
            },
        }
    }

    fn schema_field<'i>(&'i self, name: &str) -> Option<Resolved<'i>> {
        let roots = self.type_graph.roots();
        let root = |name: Option<&'i str>| name.map(|name| Node::Type(TypeNode::Named(name)));

        match name {
            "description" => leaf("String", Value::Null),
            "types" => {
                let mut types: Vec<Node<'i>> = self
                    .type_graph
                    .types()
                    .map(|definition| Node::Type(TypeNode::Named(definition.name())))
                    .collect();
                types.extend(
                    BUILTIN_SCALARS
                        .into_iter()
                        .filter(|scalar| self.type_graph.get(scalar).is_none())
                        .map(|scalar| Node::Type(TypeNode::Named(scalar))),
                );
                list("[__Type!]!", Some(types))
            }
            "queryType" => object("__Type!", root(Some(roots.query.as_str()))),
            "mutationType" => object("__Type", root(roots.mutation.as_deref())),
            "subscriptionType" => object("__Type", root(roots.subscription.as_deref())),
            "directives" => list(
                "[__Directive!]!",
                Some(self.directives.iter().map(Node::Directive).collect()),
            ),
            _ => None,
        }
    }

    fn type_field<'i>(&'i self, ty: TypeNode<'i>, name: &str) -> Option<Resolved<'i>> {
        let definition = match ty {
            TypeNode::Named(type_name) => self.type_graph.get(type_name),
            TypeNode::List(_) | TypeNode::NonNull(_) => None,
        };

        match name {
            "kind" => leaf(
                "__TypeKind!",
                match (ty, definition) {
                    (TypeNode::List(_), _) => "LIST",
                    (TypeNode::NonNull(_), _) => "NON_NULL",
                    (_, Some(TypeDefinition::Object(_))) => "OBJECT",
                    (_, Some(TypeDefinition::Enum(_))) => "ENUM",
                    (_, Some(TypeDefinition::InputObject(_))) => "INPUT_OBJECT",
                    _ => "SCALAR",
                },
            ),
            "name" => leaf(
                "String",
                match ty {
                    TypeNode::Named(type_name) => Some(type_name),
                    TypeNode::List(_) | TypeNode::NonNull(_) => None,
                },
            ),
            "description" => leaf("String", definition.and_then(TypeDefinition::description)),
            "specifiedByURL" => leaf("String", Value::Null),
            "fields" => list(
                "[__Field!]",
                match definition {
                    Some(TypeDefinition::Object(object)) => Some(object.fields.iter().map(Node::Field).collect()),
                    _ => None,
                },
            ),
            "interfaces" => list(
                "[__Type!]",
                match definition {
                    Some(TypeDefinition::Object(_)) => Some(Vec::new()),
                    _ => None,
                },
            ),
            "possibleTypes" => list("[__Type!]", None),
            "enumValues" => list(
                "[__EnumValue!]",
                match definition {
                    Some(TypeDefinition::Enum(enum_type)) => Some(
                        enum_type
                            .values
                            .iter()
                            .map(|value| Node::EnumValue(value.as_str()))
                            .collect(),
                    ),
                    _ => None,
                },
            ),
            "inputFields" => list(
                "[__InputValue!]",
                match definition {
                    Some(TypeDefinition::InputObject(input)) => Some(input.fields.iter().map(Node::InputValue).collect()),
                    _ => None,
                },
            ),
            "ofType" => object(
                "__Type",
                match ty {
                    TypeNode::List(inner) | TypeNode::NonNull(inner) => Some(Node::Type(inner.into())),
                    TypeNode::Named(_) => None,
                },
            ),
            "isOneOf" => leaf(
                "Boolean",
                match definition {
                    Some(TypeDefinition::InputObject(_)) => Value::Bool(false),
                    _ => Value::Null,
                },
            ),
            _ => None,
        }
    }
}
