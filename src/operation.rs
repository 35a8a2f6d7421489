//! Helpers over a parsed executable document shared by the query planner and
//! the local execution engine.

use std::collections::HashMap;

use graphql_parser::query::{
    Definition, Directive, Document, Field, FragmentDefinition, OperationDefinition, SelectionSet,
    VariableDefinition,
};
use serde_json::{Map, Value};

use crate::executor::OperationKind;
use crate::type_graph::literal_to_json;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum OperationError {
    #[error("Unknown operation named \"{0}\".")]
    NotFound(String),
    #[error("Must provide operation name if query contains multiple operations.")]
    Ambiguous,
    #[error("Must provide an operation.")]
    Missing,
    #[error("Subscription operations are not supported.")]
    SubscriptionNotSupported,
}

pub(crate) struct Operation<'d, 'a> {
    pub definition: &'d OperationDefinition<'a, String>,
    pub name: Option<&'d str>,
    pub kind: OperationKind,
    pub selection_set: &'d SelectionSet<'a, String>,
    pub variable_definitions: &'d [VariableDefinition<'a, String>],
}

fn operation_name<'d>(definition: &'d OperationDefinition<'_, String>) -> Option<&'d str> {
    match definition {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(query) => query.name.as_deref(),
        OperationDefinition::Mutation(mutation) => mutation.name.as_deref(),
        OperationDefinition::Subscription(subscription) => subscription.name.as_deref(),
    }
}

/// Picks the operation to run: the one named `operation_name`, or the only
/// operation of the document.
pub(crate) fn select_operation<'d, 'a>(
    document: &'d Document<'a, String>,
    operation_name: Option<&str>,
) -> Result<Operation<'d, 'a>, OperationError> {
    let operation_name = operation_name.filter(|name| !name.is_empty());
    let mut operations = document.definitions.iter().filter_map(|definition| match definition {
        Definition::Operation(operation) => Some(operation),
        Definition::Fragment(_) => None,
    });

    let definition = match operation_name {
        Some(wanted) => operations
            .find(|operation| self::operation_name(operation) == Some(wanted))
            .ok_or_else(|| OperationError::NotFound(wanted.to_string()))?,
        None => {
            let first = operations.next().ok_or(OperationError::Missing)?;
            if operations.next().is_some() {
                return Err(OperationError::Ambiguous);
            }
            first
        }
    };

    let name = self::operation_name(definition);
    Ok(match definition {
        OperationDefinition::SelectionSet(selection_set) => Operation {
            definition,
            name,
            kind: OperationKind::Query,
            selection_set,
            variable_definitions: &[],
        },
        OperationDefinition::Query(query) => Operation {
            definition,
            name,
            kind: OperationKind::Query,
            selection_set: &query.selection_set,
            variable_definitions: &query.variable_definitions,
        },
        OperationDefinition::Mutation(mutation) => Operation {
            definition,
            name,
            kind: OperationKind::Mutation,
            selection_set: &mutation.selection_set,
            variable_definitions: &mutation.variable_definitions,
        },
        OperationDefinition::Subscription(_) => return Err(OperationError::SubscriptionNotSupported),
    })
}

pub(crate) fn fragments<'d, 'a>(
    document: &'d Document<'a, String>,
) -> HashMap<&'d str, &'d FragmentDefinition<'a, String>> {
    document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            Definition::Fragment(fragment) => Some((fragment.name.as_str(), fragment)),
            Definition::Operation(_) => None,
        })
        .collect()
}

pub(crate) fn response_key<'f>(field: &'f Field<'_, String>) -> &'f str {
    field.alias.as_deref().unwrap_or(&field.name)
}

/// Evaluates `@skip` and `@include` against the request variables.
pub(crate) fn is_included(directives: &[Directive<'_, String>], variables: &Map<String, Value>) -> bool {
    directives.iter().all(|directive| {
        let condition = directive
            .arguments
            .iter()
            .find(|(name, _)| name == "if")
            .map(|(_, value)| literal_to_json(value, Some(variables)));
        match (directive.name.as_str(), condition) {
            ("skip", Some(Value::Bool(true))) => false,
            ("include", Some(Value::Bool(false))) => false,
            _ => true,
        }
    })
}

/// Provided variables, completed with the defaults of the operation's
/// variable definitions.
pub(crate) fn coerce_variables(
    definitions: &[VariableDefinition<'_, String>],
    provided: &Map<String, Value>,
) -> Map<String, Value> {
    let mut variables = provided.clone();
    for definition in definitions {
        if let Some(default_value) = &definition.default_value {
            variables
                .entry(definition.name.clone())
                .or_insert_with(|| literal_to_json(default_value, None));
        }
    }
    variables
}
