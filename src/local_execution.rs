//! Executes an operation document against a [`ResolverSet`].
//!
//! This is what a backend service runs when it receives a delegated
//! sub-request, whether over HTTP or through a [`LocalExecutor`].
//!
//! [`LocalExecutor`]: crate::executor::LocalExecutor

use std::collections::HashMap;

use graphql_parser::parse_query;
use graphql_parser::query::{
    Field, FragmentDefinition, Selection, SelectionSet, TypeCondition, Value as AstValue,
};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::executor::{ExecutionRequest, OperationKind};
use crate::operation::{self, coerce_variables, is_included, response_key, select_operation};
use crate::response::{GraphQLError, GraphQLResponse, codes};
use crate::subschema::{ResolverSet, Resolution};
use crate::type_graph::{FieldDefinition, TypeDefinition, TypeGraph, TypeRef, literal_to_json};

pub const NOT_FOUND_MESSAGE: &str = "Record not found";

enum Abort {
    /// The document cannot run at all; no `data` is produced.
    Invalid(GraphQLError),
    /// A non-null position resolved to null; the nearest nullable parent
    /// becomes null.
    Null,
}

fn invalid(message: String) -> Abort {
    Abort::Invalid(GraphQLError::new(message).with_code(codes::GRAPHQL_VALIDATION_FAILED))
}

pub fn execute(resolvers: &dyn ResolverSet, request: &ExecutionRequest) -> GraphQLResponse {
    let document = match parse_query::<String>(&request.document) {
        Ok(document) => document,
        Err(e) => {
            return GraphQLResponse::from_error(
                GraphQLError::new(format!("Syntax Error: {}", e)).with_code(codes::GRAPHQL_PARSE_FAILED),
            );
        }
    };

    let operation = match select_operation(&document, request.operation_name.as_deref()) {
        Ok(operation) => operation,
        Err(e) => {
            return GraphQLResponse::from_error(
                GraphQLError::new(e.to_string()).with_code(codes::OPERATION_RESOLUTION_FAILURE),
            );
        }
    };

    let type_graph = resolvers.type_graph();
    let root_type = match operation.kind {
        OperationKind::Query => Some(type_graph.roots().query.as_str()),
        OperationKind::Mutation => type_graph.roots().mutation.as_deref(),
    };
    let Some(root_type) = root_type else {
        return GraphQLResponse::from_error(
            GraphQLError::new(format!("Schema is not configured for {}s.", operation.kind.as_str()))
                .with_code(codes::GRAPHQL_VALIDATION_FAILED),
        );
    };

    let mut execution = Execution {
        resolvers,
        type_graph,
        fragments: operation::fragments(&document),
        variables: coerce_variables(operation.variable_definitions, &request.variables),
        errors: Vec::new(),
    };

    match execution.execute_selection_sets(root_type, &[operation.selection_set], &Value::Null, &[]) {
        Ok(data) => GraphQLResponse {
            data: Some(Value::Object(data)),
            errors: execution.errors,
        },
        Err(Abort::Null) => GraphQLResponse {
            data: Some(Value::Null),
            errors: execution.errors,
        },
        Err(Abort::Invalid(error)) => GraphQLResponse::from_error(error),
    }
}

struct Execution<'r, 'd, 'a> {
    resolvers: &'r dyn ResolverSet,
    type_graph: &'r TypeGraph,
    fragments: HashMap<&'d str, &'d FragmentDefinition<'a, String>>,
    variables: Map<String, Value>,
    errors: Vec<GraphQLError>,
}

fn child_path(path: &[Value], segment: Value) -> Vec<Value> {
    let mut child = path.to_vec();
    child.push(segment);
    child
}

impl<'r, 'd, 'a> Execution<'r, 'd, 'a> {
    /// Groups the selected fields by response key, expanding fragments that
    /// apply to `type_name`.
    fn collect_fields(
        &self,
        type_name: &str,
        selection_set: &'d SelectionSet<'a, String>,
        fields: &mut IndexMap<&'d str, Vec<&'d Field<'a, String>>>,
        visited: &mut Vec<&'d str>,
    ) -> Result<(), Abort> {
        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => {
                    if is_included(&field.directives, &self.variables) {
                        fields.entry(response_key(field)).or_default().push(field);
                    }
                }
                Selection::InlineFragment(inline) => {
                    let applies = inline.type_condition.as_ref().is_none_or(|condition| {
                        let TypeCondition::On(on) = condition;
                        on == type_name
                    });
                    if applies && is_included(&inline.directives, &self.variables) {
                        self.collect_fields(type_name, &inline.selection_set, fields, visited)?;
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.as_str();
                    if visited.contains(&name) || !is_included(&spread.directives, &self.variables) {
                        continue;
                    }
                    let fragment: &'d FragmentDefinition<'a, String> = *self
                        .fragments
                        .get(name)
                        .ok_or_else(|| invalid(format!("Unknown fragment \"{}\".", name)))?;
                    let TypeCondition::On(on) = &fragment.type_condition;
                    if on == type_name {
                        visited.push(name);
                        self.collect_fields(type_name, &fragment.selection_set, fields, visited)?;
                        visited.pop();
                    }
                }
            }
        }
        Ok(())
    }

    fn execute_selection_sets(
        &mut self,
        type_name: &str,
        selection_sets: &[&'d SelectionSet<'a, String>],
        parent: &Value,
        path: &[Value],
    ) -> Result<Map<String, Value>, Abort> {
        let type_graph = self.type_graph;
        let object = type_graph
            .object(type_name)
            .ok_or_else(|| invalid(format!("Type \"{}\" is not an object type.", type_name)))?;

        let mut fields = IndexMap::new();
        for selection_set in selection_sets {
            self.collect_fields(type_name, selection_set, &mut fields, &mut Vec::new())?;
        }

        let mut data = Map::new();
        for (key, nodes) in fields {
            let node = nodes[0];
            if node.name == "__typename" {
                data.insert(key.to_string(), Value::String(type_name.to_string()));
                continue;
            }

            let definition = object.field(&node.name).ok_or_else(|| {
                invalid(format!(
                    "Cannot query field \"{}\" on type \"{}\".",
                    node.name, type_name
                ))
            })?;
            let field_path = child_path(path, Value::String(key.to_string()));
            let args = self.coerce_arguments(type_name, definition, node)?;

            let resolved = match self.resolvers.resolve(type_name, &node.name, &args) {
                Some(Resolution::Value(value)) => value,
                Some(Resolution::NotFound) => {
                    self.errors.push(
                        GraphQLError::new(NOT_FOUND_MESSAGE)
                            .with_path(field_path)
                            .with_code(codes::NOT_FOUND),
                    );
                    if definition.ty.is_non_null() {
                        return Err(Abort::Null);
                    }
                    data.insert(key.to_string(), Value::Null);
                    continue;
                }
                None => parent.get(&node.name).cloned().unwrap_or(Value::Null),
            };

            let sub_selections: Vec<&'d SelectionSet<'a, String>> =
                nodes.iter().map(|node| &node.selection_set).collect();
            let label = format!("{}.{}", type_name, node.name);
            let value = self.complete_value(&definition.ty, resolved, &sub_selections, &field_path, &label)?;
            data.insert(key.to_string(), value);
        }

        Ok(data)
    }

    /// Completes `value` at a position of type `ty`. `Err(Abort::Null)` means
    /// the position is non-null and could not be filled.
    fn complete_value(
        &mut self,
        ty: &TypeRef,
        value: Value,
        selection_sets: &[&'d SelectionSet<'a, String>],
        path: &[Value],
        label: &str,
    ) -> Result<Value, Abort> {
        match ty {
            TypeRef::NonNull(inner) => {
                // A null propagated from below already carries its error.
                let completed = self.complete_nullable(inner, value, selection_sets, path, label)?;
                if completed.is_null() {
                    self.errors.push(
                        GraphQLError::new(format!("Cannot return null for non-nullable field {}.", label))
                            .with_path(path.to_vec()),
                    );
                    return Err(Abort::Null);
                }
                Ok(completed)
            }
            _ => match self.complete_nullable(ty, value, selection_sets, path, label) {
                Err(Abort::Null) => Ok(Value::Null),
                other => other,
            },
        }
    }

    fn complete_nullable(
        &mut self,
        ty: &TypeRef,
        value: Value,
        selection_sets: &[&'d SelectionSet<'a, String>],
        path: &[Value],
        label: &str,
    ) -> Result<Value, Abort> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        let type_graph = self.type_graph;
        match ty {
            TypeRef::NonNull(_) => self.complete_value(ty, value, selection_sets, path, label),
            TypeRef::List(inner) => {
                let Value::Array(items) = value else {
                    self.errors.push(
                        GraphQLError::new(format!("Expected a list for field {}.", label))
                            .with_path(path.to_vec()),
                    );
                    return Ok(Value::Null);
                };
                let mut completed = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let item_path = child_path(path, Value::from(index));
                    completed.push(self.complete_value(inner, item, selection_sets, &item_path, label)?);
                }
                Ok(Value::Array(completed))
            }
            TypeRef::Named(name) => match type_graph.get(name) {
                Some(TypeDefinition::Object(_)) => self
                    .execute_selection_sets(name, selection_sets, &value, path)
                    .map(Value::Object),
                _ if name == "ID" => Ok(match value {
                    Value::Number(number) => Value::String(number.to_string()),
                    other => other,
                }),
                _ => Ok(value),
            },
        }
    }

    fn coerce_arguments(
        &self,
        type_name: &str,
        definition: &FieldDefinition,
        node: &Field<'a, String>,
    ) -> Result<Map<String, Value>, Abort> {
        if let Some((unknown, _)) = node
            .arguments
            .iter()
            .find(|(name, _)| definition.argument(name).is_none())
        {
            return Err(invalid(format!(
                "Unknown argument \"{}\" on field \"{}.{}\".",
                unknown, type_name, definition.name
            )));
        }

        let mut args = Map::new();
        for argument in &definition.arguments {
            let provided = node
                .arguments
                .iter()
                .find(|(name, _)| name == &argument.name)
                .and_then(|(_, value)| match value {
                    AstValue::Variable(variable) if !self.variables.contains_key(variable) => None,
                    value => Some(literal_to_json(value, Some(&self.variables))),
                });
            let value = provided.or_else(|| {
                argument
                    .default_value
                    .as_ref()
                    .map(|default_value| default_value.value.clone())
            });

            match value {
                Some(Value::Null) | None if argument.ty.is_non_null() => {
                    return Err(invalid(format!(
                        "Argument \"{}\" of required type \"{}\" was not provided.",
                        argument.name, argument.ty
                    )));
                }
                Some(value) => {
                    args.insert(argument.name.clone(), coerce_input(&argument.ty, value));
                }
                None => {}
            }
        }
        Ok(args)
    }
}

/// `ID` inputs accept integers and are handed to resolvers as strings.
fn coerce_input(ty: &TypeRef, value: Value) -> Value {
    match (ty, value) {
        (TypeRef::NonNull(inner), value) => coerce_input(inner, value),
        (TypeRef::List(inner), Value::Array(items)) => Value::Array(
            items
                .into_iter()
                .map(|item| coerce_input(inner, item))
                .collect(),
        ),
        (TypeRef::Named(name), Value::Number(number)) if name == "ID" => Value::String(number.to_string()),
        (_, value) => value,
    }
}
