use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use graphql_parser::parse_query;
use graphql_parser::query::{
    Definition, Directive, Document, Field, FragmentDefinition, Mutation, OperationDefinition, Query,
    Selection, SelectionSet, Subscription, TypeCondition, Value as AstValue, VariableDefinition,
};
use serde_json::{Map, Value};

use crate::GraphQLRequest;
use crate::composer::{ComposedSchema, SubschemaId};
use crate::executor::{ExecutionRequest, OperationKind};
use crate::introspection::{self, Introspector};
use crate::operation::{self, OperationError, response_key, select_operation};
use crate::response::{GraphQLError, codes};
use crate::type_graph::TypeDefinition;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PlanningError {
    #[error("Syntax Error: {0}")]
    Parse(String),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error("Schema is not configured for mutations.")]
    MutationsNotSupported,
    #[error("Cannot query field \"{field}\" on type \"{type_name}\".")]
    UnknownField { type_name: String, field: String },
    #[error("Unknown argument \"{argument}\" on field \"{type_name}.{field}\".")]
    UnknownArgument {
        type_name: String,
        field: String,
        argument: String,
    },
    #[error("Field \"{field}\" of type \"{type_name}\" must have a selection of subfields.")]
    MissingSelection { type_name: String, field: String },
    #[error("Field \"{field}\" must not have a selection since type \"{type_name}\" has no subfields.")]
    SelectionOnLeaf { type_name: String, field: String },
    #[error("Field \"{field}\" argument \"{argument}\" of type \"{ty}\" is required, but it was not provided.")]
    MissingArgument {
        field: String,
        argument: String,
        ty: String,
    },
    #[error("Unknown fragment \"{0}\".")]
    UnknownFragment(String),
    #[error("Fragment on \"{type_condition}\" cannot be spread within type \"{type_name}\".")]
    FragmentTypeMismatch {
        type_condition: String,
        type_name: String,
    },
    #[error("Cannot spread fragment \"{0}\" within itself.")]
    FragmentCycle(String),
    #[error("Fields \"{0}\" conflict because they select different fields or arguments.")]
    ResponseKeyConflict(String),
    #[error(
        "Field \"{type_name}.{field}\" is resolved by \"{owner}\" and cannot be reached through \"{via}\"."
    )]
    UnreachableField {
        type_name: String,
        field: String,
        owner: String,
        via: String,
    },
}

impl PlanningError {
    pub fn graphql_error_code(&self) -> &'static str {
        match self {
            PlanningError::Parse(_) => codes::GRAPHQL_PARSE_FAILED,
            PlanningError::Operation(_) => codes::OPERATION_RESOLUTION_FAILURE,
            _ => codes::GRAPHQL_VALIDATION_FAILED,
        }
    }

    pub fn to_graphql_error(&self) -> GraphQLError {
        GraphQLError::new(self.to_string()).with_code(self.graphql_error_code())
    }
}

/// A delegated call: the sub-request for one subschema and the root response
/// keys it fills.
#[derive(Clone, Debug, PartialEq)]
pub struct Fetch {
    pub subschema: SubschemaId,
    pub request: ExecutionRequest,
    pub response_keys: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RootFieldSource {
    /// `__typename` on the root type, answered by the gateway itself.
    Typename,
    /// `__schema` or `__type`, resolved while planning.
    Introspection(Value),
    Fetch(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RootField {
    pub response_key: String,
    pub source: RootFieldSource,
    pub non_null: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryPlan {
    pub operation_kind: OperationKind,
    pub root_type: String,
    /// One entry per distinct subschema touched, in order of first use.
    pub fetches: Vec<Fetch>,
    /// Root response keys in selection order.
    pub root_fields: Vec<RootField>,
}

#[async_trait]
pub trait QueryPlanner {
    async fn plan_query(
        &self,
        request: &GraphQLRequest,
        schema: &ComposedSchema,
    ) -> Result<QueryPlan, PlanningError>;
}

/// Validates the operation against the composed schema and splits its root
/// selections into one sub-request per owning subschema.
pub struct DelegatingQueryPlanner;

impl DelegatingQueryPlanner {
    pub fn new() -> Self {
        DelegatingQueryPlanner
    }
}

impl Default for DelegatingQueryPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryPlanner for DelegatingQueryPlanner {
    async fn plan_query(
        &self,
        request: &GraphQLRequest,
        schema: &ComposedSchema,
    ) -> Result<QueryPlan, PlanningError> {
        plan(request, schema)
    }
}

pub fn plan(request: &GraphQLRequest, schema: &ComposedSchema) -> Result<QueryPlan, PlanningError> {
    let document =
        parse_query::<String>(&request.query).map_err(|e| PlanningError::Parse(e.to_string()))?;
    let operation = select_operation(&document, request.operation_name.as_deref())?;

    let roots = schema.type_graph().roots();
    let root_type = match operation.kind {
        OperationKind::Query => roots.query.clone(),
        OperationKind::Mutation => roots
            .mutation
            .clone()
            .ok_or(PlanningError::MutationsNotSupported)?,
    };

    let normalizer = Normalizer {
        schema,
        fragments: operation::fragments(&document),
    };
    let mut root_selections = Vec::new();
    normalizer.normalize(
        &root_type,
        operation.selection_set,
        &[],
        &mut root_selections,
        &mut Vec::new(),
    )?;
    check_response_keys(&root_selections)?;

    let root_object = schema
        .type_graph()
        .object(&root_type)
        .ok_or_else(|| PlanningError::UnknownField {
            type_name: root_type.clone(),
            field: String::new(),
        })?;

    let provided = request.variables.clone().unwrap_or_default();
    let variables = operation::coerce_variables(operation.variable_definitions, &provided);
    let introspector = Introspector::new(schema.type_graph(), &normalizer.fragments, &variables);
    let mut groups: Vec<(SubschemaId, Vec<Field<'_, String>>)> = Vec::new();
    let mut root_fields: Vec<RootField> = Vec::new();

    for field in root_selections {
        let key = response_key(&field).to_string();
        let known_key = root_fields.iter().any(|root| root.response_key == key);

        if field.name == "__typename" {
            if !known_key && operation::is_included(&field.directives, &variables) {
                root_fields.push(RootField {
                    response_key: key,
                    source: RootFieldSource::Typename,
                    non_null: true,
                });
            }
            continue;
        }

        if introspection::is_introspection_field(&field.name) {
            let value = introspector.resolve_root(&field)?;
            if !known_key && operation::is_included(&field.directives, &variables) {
                root_fields.push(RootField {
                    response_key: key,
                    source: RootFieldSource::Introspection(value),
                    non_null: field.name == introspection::SCHEMA_FIELD,
                });
            }
            continue;
        }

        let (owner, definition) = schema
            .delegation_plan()
            .owner(&root_type, &field.name)
            .zip(root_object.field(&field.name))
            .ok_or_else(|| PlanningError::UnknownField {
                type_name: root_type.clone(),
                field: field.name.clone(),
            })?;
        normalizer.check_reachable(definition.ty.named_type(), &field.selection_set, owner)?;
        if !operation::is_included(&field.directives, &variables) {
            continue;
        }

        let index = match groups.iter().position(|(subschema, _)| *subschema == owner) {
            Some(index) => index,
            None => {
                groups.push((owner, Vec::new()));
                groups.len() - 1
            }
        };
        groups[index].1.push(field);

        if !known_key {
            root_fields.push(RootField {
                response_key: key,
                source: RootFieldSource::Fetch(index),
                non_null: definition.ty.is_non_null(),
            });
        }
    }

    let fetches = groups
        .into_iter()
        .map(|(subschema, fields)| {
            let response_keys = unique_response_keys(&fields);
            let mut used = HashSet::new();
            for field in &fields {
                collect_field_variables(field, &mut used);
            }
            let variables: Map<String, Value> = provided
                .iter()
                .filter(|(name, _)| used.contains(name.as_str()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();

            Fetch {
                subschema,
                request: ExecutionRequest {
                    document: sub_document(operation.definition, fields, &used),
                    operation_name: operation.name.map(str::to_string),
                    variables,
                    operation_kind: operation.kind,
                },
                response_keys,
            }
        })
        .collect();

    Ok(QueryPlan {
        operation_kind: operation.kind,
        root_type,
        fetches,
        root_fields,
    })
}

struct Normalizer<'s, 'd, 'a> {
    schema: &'s ComposedSchema,
    fragments: HashMap<&'d str, &'d FragmentDefinition<'a, String>>,
}

impl<'s, 'd, 'a> Normalizer<'s, 'd, 'a> {
    /// Flattens `selection_set` into plain fields, inlining fragments and
    /// pushing their directives down onto the inlined fields.
    fn normalize(
        &self,
        type_name: &str,
        selection_set: &'d SelectionSet<'a, String>,
        inherited: &[Directive<'a, String>],
        out: &mut Vec<Field<'a, String>>,
        visited: &mut Vec<&'d str>,
    ) -> Result<(), PlanningError> {
        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => {
                    let mut field = self.normalize_field(type_name, field, visited)?;
                    field.directives.extend(inherited.iter().cloned());
                    out.push(field);
                }
                Selection::InlineFragment(inline) => {
                    if let Some(TypeCondition::On(on)) = &inline.type_condition {
                        check_type_condition(on, type_name)?;
                    }
                    let mut directives = inherited.to_vec();
                    directives.extend(inline.directives.iter().cloned());
                    self.normalize(type_name, &inline.selection_set, &directives, out, visited)?;
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

                    let mut directives = inherited.to_vec();
                    directives.extend(spread.directives.iter().cloned());
                    visited.push(name);
                    self.normalize(type_name, &fragment.selection_set, &directives, out, visited)?;
                    visited.pop();
                }
            }
        }
        Ok(())
    }

    fn normalize_field(
        &self,
        type_name: &str,
        field: &'d Field<'a, String>,
        visited: &mut Vec<&'d str>,
    ) -> Result<Field<'a, String>, PlanningError> {
        let mut items = Vec::new();

        if field.name == "__typename" {
            if !field.selection_set.items.is_empty() {
                return Err(PlanningError::SelectionOnLeaf {
                    type_name: "String".to_string(),
                    field: field.name.clone(),
                });
            }
        } else if introspection::is_introspection_field(&field.name)
            && type_name == self.schema.type_graph().roots().query
        {
            // Validated by the introspector, which knows the meta types.
            items = field.selection_set.items.clone();
        } else {
            let type_graph = self.schema.type_graph();
            let definition = type_graph
                .object(type_name)
                .and_then(|object| object.field(&field.name))
                .ok_or_else(|| PlanningError::UnknownField {
                    type_name: type_name.to_string(),
                    field: field.name.clone(),
                })?;

            if let Some((argument, _)) = field
                .arguments
                .iter()
                .find(|(argument, _)| definition.argument(argument).is_none())
            {
                return Err(PlanningError::UnknownArgument {
                    type_name: type_name.to_string(),
                    field: field.name.clone(),
                    argument: argument.clone(),
                });
            }

            let return_type = definition.ty.named_type();
            match type_graph.get(return_type) {
                Some(TypeDefinition::Object(_)) => {
                    if field.selection_set.items.is_empty() {
                        return Err(PlanningError::MissingSelection {
                            type_name: definition.ty.to_string(),
                            field: field.name.clone(),
                        });
                    }
                    let mut children = Vec::new();
                    self.normalize(return_type, &field.selection_set, &[], &mut children, visited)?;
                    check_response_keys(&children)?;
                    items = children.into_iter().map(Selection::Field).collect();
                }
                _ if !field.selection_set.items.is_empty() => {
                    return Err(PlanningError::SelectionOnLeaf {
                        type_name: definition.ty.to_string(),
                        field: field.name.clone(),
                    });
                }
                _ => {}
            }
        }

        Ok(Field {
            position: field.position,
            alias: field.alias.clone(),
            name: field.name.clone(),
            arguments: field.arguments.clone(),
            directives: field.directives.clone(),
            selection_set: SelectionSet {
                span: field.selection_set.span,
                items,
            },
        })
    }

    /// Nested fields travel with their root field, so they must be owned by
    /// the same subschema; there is no entity lookup to fetch them elsewhere.
    fn check_reachable(
        &self,
        type_name: &str,
        selection_set: &SelectionSet<'a, String>,
        owner: SubschemaId,
    ) -> Result<(), PlanningError> {
        let Some(object) = self.schema.type_graph().object(type_name) else {
            return Ok(());
        };

        for selection in &selection_set.items {
            let Selection::Field(field) = selection else {
                continue;
            };
            if field.name == "__typename" {
                continue;
            }

            let field_owner = self.schema.delegation_plan().owner(type_name, &field.name);
            if field_owner != Some(owner) {
                return Err(PlanningError::UnreachableField {
                    type_name: type_name.to_string(),
                    field: field.name.clone(),
                    owner: field_owner
                        .map(|id| self.schema.subschema(id).name.clone())
                        .unwrap_or_default(),
                    via: self.schema.subschema(owner).name.clone(),
                });
            }
            if let Some(definition) = object.field(&field.name) {
                self.check_reachable(definition.ty.named_type(), &field.selection_set, owner)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn check_type_condition(type_condition: &str, type_name: &str) -> Result<(), PlanningError> {
    if type_condition == type_name {
        Ok(())
    } else {
        Err(PlanningError::FragmentTypeMismatch {
            type_condition: type_condition.to_string(),
            type_name: type_name.to_string(),
        })
    }
}

/// Two selections sharing a response key must name the same field with the
/// same arguments, in any order.
pub(crate) fn same_field<'a>(left: &Field<'a, String>, right: &Field<'a, String>) -> bool {
    left.name == right.name
        && left.arguments.len() == right.arguments.len()
        && left.arguments.iter().all(|(name, value)| {
            right
                .arguments
                .iter()
                .any(|(other_name, other_value)| other_name == name && other_value == value)
        })
}

fn check_response_keys(fields: &[Field<'_, String>]) -> Result<(), PlanningError> {
    let mut seen: HashMap<&str, &Field<'_, String>> = HashMap::new();
    for field in fields {
        let key = response_key(field);
        match seen.get(key) {
            Some(first) if !same_field(first, field) => {
                return Err(PlanningError::ResponseKeyConflict(key.to_string()));
            }
            Some(_) => {}
            None => {
                seen.insert(key, field);
            }
        }
    }
    Ok(())
}

fn unique_response_keys(fields: &[Field<'_, String>]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for field in fields {
        let key = response_key(field);
        if !keys.iter().any(|known| known == key) {
            keys.push(key.to_string());
        }
    }
    keys
}

fn collect_value_variables(value: &AstValue<'_, String>, used: &mut HashSet<String>) {
    match value {
        AstValue::Variable(name) => {
            used.insert(name.clone());
        }
        AstValue::List(items) => {
            for item in items {
                collect_value_variables(item, used);
            }
        }
        AstValue::Object(fields) => {
            for item in fields.values() {
                collect_value_variables(item, used);
            }
        }
        _ => {}
    }
}

fn collect_field_variables(field: &Field<'_, String>, used: &mut HashSet<String>) {
    for (_, value) in &field.arguments {
        collect_value_variables(value, used);
    }
    for directive in &field.directives {
        for (_, value) in &directive.arguments {
            collect_value_variables(value, used);
        }
    }
    for selection in &field.selection_set.items {
        if let Selection::Field(child) = selection {
            collect_field_variables(child, used);
        }
    }
}

/// Prints the operation back with only `fields` selected and only the
/// variable definitions they reference.
fn sub_document<'a>(
    definition: &OperationDefinition<'a, String>,
    fields: Vec<Field<'a, String>>,
    used: &HashSet<String>,
) -> String {
    let items: Vec<Selection<'a, String>> = fields.into_iter().map(Selection::Field).collect();
    let keep = |definitions: &[VariableDefinition<'a, String>]| -> Vec<VariableDefinition<'a, String>> {
        definitions
            .iter()
            .filter(|definition| used.contains(&definition.name))
            .cloned()
            .collect()
    };

    let operation = match definition {
        OperationDefinition::SelectionSet(selection_set) => OperationDefinition::SelectionSet(SelectionSet {
            span: selection_set.span,
            items,
        }),
        OperationDefinition::Query(query) => OperationDefinition::Query(Query {
            position: query.position,
            name: query.name.clone(),
            variable_definitions: keep(&query.variable_definitions),
            directives: query.directives.clone(),
            selection_set: SelectionSet {
                span: query.selection_set.span,
                items,
            },
        }),
        OperationDefinition::Mutation(mutation) => OperationDefinition::Mutation(Mutation {
            position: mutation.position,
            name: mutation.name.clone(),
            variable_definitions: keep(&mutation.variable_definitions),
            directives: mutation.directives.clone(),
            selection_set: SelectionSet {
                span: mutation.selection_set.span,
                items,
            },
        }),
        OperationDefinition::Subscription(subscription) => OperationDefinition::Subscription(Subscription {
            position: subscription.position,
            name: subscription.name.clone(),
            variable_definitions: keep(&subscription.variable_definitions),
            directives: subscription.directives.clone(),
            selection_set: SelectionSet {
                span: subscription.selection_set.span,
                items,
            },
        }),
    };

    Document {
        definitions: vec![Definition::Operation(operation)],
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::composer::SchemaComposer;
    use crate::executor::{ExecutionResult, RemoteExecutor};
    use crate::response::GraphQLResponse;
    use crate::subschema::SubschemaConfig;
    use crate::type_graph::TypeGraph;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Unused;

    #[async_trait]
    impl RemoteExecutor for Unused {
        async fn execute(&self, _request: ExecutionRequest) -> ExecutionResult {
            ExecutionResult::Response(GraphQLResponse::default())
        }
    }

    fn schema() -> ComposedSchema {
        let config = |name: &str, sdl: &str| {
            SubschemaConfig::new(name, TypeGraph::from_sdl(sdl).unwrap(), Arc::new(Unused))
        };
        SchemaComposer::compose(vec![
            config(
                "book-service",
                "type Book { id: ID! title: String! }\ntype Query { bookById(id: ID!): Book }\ntype Mutation { addBook(title: String!): Book! }",
            ),
            config(
                "author-service",
                "type Author { id: ID! fullName: String! }\ntype Book { rating: Int }\ntype Query { authorById(id: ID!): Author }",
            ),
        ])
        .unwrap()
    }

    fn request(query: &str, variables: Value) -> GraphQLRequest {
        GraphQLRequest {
            query: query.to_string(),
            variables: variables.as_object().cloned(),
            operation_name: None,
        }
    }

    fn selected_fields(document: &str) -> Vec<String> {
        let document = parse_query::<String>(document).unwrap();
        let operation = select_operation(&document, None).unwrap();
        operation
            .selection_set
            .items
            .iter()
            .filter_map(|selection| match selection {
                Selection::Field(field) => Some(field.name.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn single_backend_query_yields_one_fetch() {
        let plan = plan(
            &request(
                "query bookById($id: ID!) { bookById(id: $id) { id title } }",
                json!({ "id": "1" }),
            ),
            &schema(),
        )
        .unwrap();

        assert_eq!(plan.fetches.len(), 1);
        let fetch = &plan.fetches[0];
        assert_eq!(fetch.subschema, 0);
        assert_eq!(fetch.response_keys, vec!["bookById".to_string()]);
        assert_eq!(fetch.request.operation_name.as_deref(), Some("bookById"));
        assert_eq!(Value::Object(fetch.request.variables.clone()), json!({ "id": "1" }));
        assert!(fetch.request.document.contains("query bookById($id: ID!)"));
        assert_eq!(selected_fields(&fetch.request.document), vec!["bookById"]);
    }

    #[test]
    fn spanning_query_splits_per_owner_and_keeps_variables_apart() {
        let plan = plan(
            &request(
                "query both($book: ID!, $author: ID!) { a: authorById(id: $author) { fullName } bookById(id: $book) { title } __typename }",
                json!({ "book": "1", "author": "2" }),
            ),
            &schema(),
        )
        .unwrap();

        assert_eq!(plan.fetches.len(), 2);
        assert_eq!(plan.fetches[0].subschema, 1);
        assert_eq!(Value::Object(plan.fetches[0].request.variables.clone()), json!({ "author": "2" }));
        assert!(plan.fetches[0].request.document.contains("$author: ID!"));
        assert!(!plan.fetches[0].request.document.contains("$book"));
        assert_eq!(plan.fetches[1].subschema, 0);
        assert_eq!(Value::Object(plan.fetches[1].request.variables.clone()), json!({ "book": "1" }));

        let keys: Vec<(&str, &RootFieldSource)> = plan
            .root_fields
            .iter()
            .map(|root| (root.response_key.as_str(), &root.source))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("a", &RootFieldSource::Fetch(0)),
                ("bookById", &RootFieldSource::Fetch(1)),
                ("__typename", &RootFieldSource::Typename),
            ]
        );
    }

    #[test]
    fn fragments_are_inlined_into_sub_requests() {
        let plan = plan(
            &request(
                "query { ...Lookups } fragment Lookups on Query { bookById(id: 1) { ... on Book { id } } }",
                json!({}),
            ),
            &schema(),
        )
        .unwrap();

        let document = &plan.fetches[0].request.document;
        assert!(!document.contains("fragment"));
        assert!(!document.contains("..."));
        assert_eq!(selected_fields(document), vec!["bookById"]);
    }

    #[test]
    fn unknown_field_is_rejected_before_delegation() {
        let error = plan(&request("{ bookById(id: 1) { isbn } }", json!({})), &schema()).unwrap_err();

        assert_eq!(
            error,
            PlanningError::UnknownField {
                type_name: "Book".to_string(),
                field: "isbn".to_string()
            }
        );
        assert_eq!(error.graphql_error_code(), codes::GRAPHQL_VALIDATION_FAILED);
    }

    #[test]
    fn nested_field_of_another_owner_is_unreachable() {
        let error = plan(&request("{ bookById(id: 1) { title rating } }", json!({})), &schema()).unwrap_err();

        assert_eq!(
            error,
            PlanningError::UnreachableField {
                type_name: "Book".to_string(),
                field: "rating".to_string(),
                owner: "author-service".to_string(),
                via: "book-service".to_string(),
            }
        );
    }

    #[test]
    fn rejects_malformed_selections() {
        let schema = schema();
        let cases = [
            ("{ bookById(id: 1) }", "MissingSelection"),
            ("{ bookById(id: 1) { id { x } } }", "SelectionOnLeaf"),
            ("{ bookById(isbn: 1) { id } }", "UnknownArgument"),
            ("{ ...Missing }", "UnknownFragment"),
            ("{ ... on Book { id } }", "FragmentTypeMismatch"),
            ("query { ...A } fragment A on Query { ...A }", "FragmentCycle"),
            ("{ x: bookById(id: 1) { id } x: authorById(id: 1) { id } }", "ResponseKeyConflict"),
            ("{ b: bookById(id: 1) { title } b: bookById(id: 2) { id } }", "ResponseKeyConflict"),
            ("{ bookById(id: 1) { id } bookById { id } }", "ResponseKeyConflict"),
            ("{ __type { name } }", "MissingArgument"),
        ];

        for (query, expected) in cases {
            let error = plan(&request(query, json!({})), &schema).unwrap_err();
            assert!(
                format!("{:?}", error).starts_with(expected),
                "{} should fail with {}, got {:?}",
                query,
                expected,
                error
            );
        }
    }

    #[test]
    fn repeated_key_with_equal_arguments_is_merged() {
        let plan = plan(
            &request(
                "query($id: ID!) { b: bookById(id: $id) { title } b: bookById(id: $id) { id } }",
                json!({ "id": "1" }),
            ),
            &schema(),
        )
        .unwrap();

        assert_eq!(plan.fetches.len(), 1);
        assert_eq!(plan.fetches[0].response_keys, vec!["b".to_string()]);
        assert_eq!(plan.root_fields.len(), 1);
    }

    #[test]
    fn skipped_root_fields_are_not_fetched() {
        let plan = plan(
            &request(
                "query($withBook: Boolean!) { bookById(id: 1) @include(if: $withBook) { id } authorById(id: 1) @skip(if: true) { id } __typename }",
                json!({ "withBook": false }),
            ),
            &schema(),
        )
        .unwrap();

        assert!(plan.fetches.is_empty());
        assert_eq!(
            plan.root_fields,
            vec![RootField {
                response_key: "__typename".to_string(),
                source: RootFieldSource::Typename,
                non_null: true,
            }]
        );
    }

    #[test]
    fn skipped_fields_are_still_validated() {
        let error = plan(&request("{ bookById(id: 1) @skip(if: true) { isbn } }", json!({})), &schema()).unwrap_err();

        assert_eq!(
            error,
            PlanningError::UnknownField {
                type_name: "Book".to_string(),
                field: "isbn".to_string()
            }
        );
    }

    #[test]
    fn operation_errors_map_to_codes() {
        let schema = schema();

        let error = plan(&request("{ bookById(id: 1) { id }", json!({})), &schema).unwrap_err();
        assert_eq!(error.graphql_error_code(), codes::GRAPHQL_PARSE_FAILED);

        let mut named = request("query a { bookById(id: 1) { id } }", json!({}));
        named.operation_name = Some("b".to_string());
        let error = plan(&named, &schema).unwrap_err();
        assert_eq!(error.graphql_error_code(), codes::OPERATION_RESOLUTION_FAILURE);
    }

    #[test]
    fn mutations_route_to_mutation_owner() {
        let plan = plan(&request("mutation { addBook(title: \"New\") { id } }", json!({})), &schema()).unwrap();

        assert_eq!(plan.operation_kind, OperationKind::Mutation);
        assert_eq!(plan.root_type, "Mutation");
        assert_eq!(plan.fetches[0].request.operation_kind, OperationKind::Mutation);
        assert!(plan.root_fields[0].non_null);
    }
}
