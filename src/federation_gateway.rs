use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::composer::{ComposedSchema, SchemaComposer};
use crate::error::GatewayInitError;
use crate::executor::{ExecutionResult, HttpRemoteExecutor};
use crate::query_planner::{DelegatingQueryPlanner, Fetch, QueryPlan, QueryPlanner, RootFieldSource};
use crate::response::{GraphQLError, GraphQLResponse};
use crate::server::RequestHandler;
use crate::subschema::SubschemaConfig;
use crate::transform::ProvenanceTransform;
use crate::type_graph::TypeGraph;
use crate::{GraphQLRequest, ServiceConfig};

pub const DEFAULT_SUBGRAPH_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_QUERY: &str = r#"query bookById {
  bookById(id: 1) {
    id
    title
  }
}
"#;

pub struct FederationGateway {
    schema: Arc<ComposedSchema>,
    query_planner: Arc<Box<dyn QueryPlanner + Send + Sync>>,
    subgraph_timeout: Option<Duration>,
}

impl FederationGateway {
    pub fn new(schema: ComposedSchema, query_planner: Box<dyn QueryPlanner + Send + Sync>) -> Self {
        FederationGateway {
            schema: Arc::new(schema),
            query_planner: Arc::new(query_planner),
            subgraph_timeout: Some(DEFAULT_SUBGRAPH_TIMEOUT),
        }
    }

    /// `None` waits on every backend for as long as it takes.
    pub fn with_subgraph_timeout(mut self, subgraph_timeout: Option<Duration>) -> Self {
        self.subgraph_timeout = subgraph_timeout;
        self
    }

    /// Composes a gateway over HTTP backends, tagging every field with the
    /// service that resolves it.
    pub fn from_services(services: Vec<ServiceConfig>) -> Result<Self, GatewayInitError> {
        let client = reqwest::Client::new();
        let mut configs = Vec::with_capacity(services.len());

        for service in services {
            let type_graph = TypeGraph::from_sdl(&service.schema).map_err(|source| GatewayInitError::Schema {
                service: service.name.clone(),
                source,
            })?;
            info!(service = %service.name, url = %service.url, "registering subgraph");

            let executor = HttpRemoteExecutor::with_client(&service.name, &service.url, client.clone());
            configs.push(
                SubschemaConfig::new(&service.name, type_graph, Arc::new(executor))
                    .with_transform(ProvenanceTransform::new(&service.name)),
            );
        }

        let schema = SchemaComposer::compose(configs)?;
        Ok(Self::new(schema, Box::new(DelegatingQueryPlanner::new())))
    }

    pub fn schema(&self) -> &ComposedSchema {
        &self.schema
    }

    pub async fn process_request(&self, request: GraphQLRequest) -> GraphQLResponse {
        debug!(operation_name = ?request.operation_name, "processing request");

        let plan = match self.query_planner.plan_query(&request, &self.schema).await {
            Ok(plan) => plan,
            Err(e) => {
                debug!(error = %e, "request rejected before delegation");
                return GraphQLResponse::from_error(e.to_graphql_error());
            }
        };

        let results = join_all(plan.fetches.iter().map(|fetch| self.dispatch(fetch))).await;
        merge(&plan, results)
    }

    async fn dispatch(&self, fetch: &Fetch) -> ExecutionResult {
        let subschema = self.schema.subschema(fetch.subschema);
        let call = subschema.executor.execute(fetch.request.clone());

        let Some(limit) = self.subgraph_timeout else {
            return call.await;
        };
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(service = %subschema.name, timeout = ?limit, "backend did not respond in time");
                ExecutionResult::unavailable(format!(
                    "{} did not respond within {:?}",
                    subschema.name, limit
                ))
            }
        }
    }
}

/// Assembles the gateway response in selection order. `results` lines up
/// with `plan.fetches`.
fn merge(plan: &QueryPlan, results: Vec<ExecutionResult>) -> GraphQLResponse {
    let mut errors = Vec::new();
    let mut fetched: Vec<Option<Map<String, Value>>> = Vec::with_capacity(results.len());

    for (fetch, result) in plan.fetches.iter().zip(results) {
        match result {
            ExecutionResult::Response(response) => {
                errors.extend(response.errors);
                fetched.push(match response.data {
                    Some(Value::Object(data)) => Some(data),
                    _ => None,
                });
            }
            ExecutionResult::Failure(failure) => {
                errors.extend(fetch.response_keys.iter().map(|key| {
                    GraphQLError::new(failure.message.clone())
                        .with_code(failure.code)
                        .with_path(vec![Value::String(key.clone())])
                }));
                fetched.push(None);
            }
        }
    }

    let mut data = Map::new();
    let mut null_root = false;
    for root in &plan.root_fields {
        let value = match &root.source {
            RootFieldSource::Typename => Value::String(plan.root_type.clone()),
            RootFieldSource::Introspection(value) => value.clone(),
            RootFieldSource::Fetch(index) => match fetched.get_mut(*index) {
                Some(Some(fetched_data)) => match fetched_data.remove(&root.response_key) {
                    Some(value) => value,
                    // Not returned by the backend.
                    None => continue,
                },
                _ => Value::Null,
            },
        };
        null_root |= root.non_null && value.is_null();
        data.insert(root.response_key.clone(), value);
    }

    GraphQLResponse {
        data: Some(if null_root { Value::Null } else { Value::Object(data) }),
        errors,
    }
}

#[async_trait]
impl RequestHandler for FederationGateway {
    fn name(&self) -> &str {
        "Stitchway Gateway"
    }

    fn default_query(&self) -> &str {
        DEFAULT_QUERY
    }

    async fn handle(&self, request: GraphQLRequest) -> GraphQLResponse {
        self.process_request(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::backends::{AuthorService, BookService};
    use crate::executor::{ExecutionRequest, LocalExecutor, RemoteExecutor};
    use crate::response::codes;
    use crate::subschema::ResolverSet;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Runs a local backend after a fixed delay and counts its calls.
    struct Delayed {
        inner: LocalExecutor,
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RemoteExecutor for Delayed {
        async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.inner.execute(request).await
        }
    }

    struct Down;

    #[async_trait]
    impl RemoteExecutor for Down {
        async fn execute(&self, _request: ExecutionRequest) -> ExecutionResult {
            ExecutionResult::unavailable("Failed to send request to author-service: connection refused")
        }
    }

    struct Harness {
        gateway: FederationGateway,
        book_calls: Arc<AtomicUsize>,
        author_calls: Arc<AtomicUsize>,
    }

    fn delayed(name: &str, resolvers: Arc<dyn ResolverSet>, delay_ms: u64, calls: &Arc<AtomicUsize>) -> SubschemaConfig {
        let executor = Delayed {
            inner: LocalExecutor::new(name, Arc::clone(&resolvers)),
            delay: Duration::from_millis(delay_ms),
            calls: Arc::clone(calls),
        };
        SubschemaConfig::new(name, resolvers.type_graph().clone(), Arc::new(executor))
    }

    fn harness(book_delay_ms: u64, author_delay_ms: u64) -> Harness {
        let book_calls = Arc::new(AtomicUsize::new(0));
        let author_calls = Arc::new(AtomicUsize::new(0));
        let books: Arc<dyn ResolverSet> = Arc::new(BookService::new().unwrap());
        let authors: Arc<dyn ResolverSet> = Arc::new(AuthorService::new().unwrap());

        let schema = SchemaComposer::compose(vec![
            delayed("book-service", books, book_delay_ms, &book_calls),
            delayed("author-service", authors, author_delay_ms, &author_calls),
        ])
        .unwrap();

        Harness {
            gateway: FederationGateway::new(schema, Box::new(DelegatingQueryPlanner::new())),
            book_calls,
            author_calls,
        }
    }

    fn request(query: &str, variables: Value) -> GraphQLRequest {
        GraphQLRequest {
            query: query.to_string(),
            variables: variables.as_object().cloned(),
            operation_name: None,
        }
    }

    fn to_json(response: &GraphQLResponse) -> Value {
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn single_backend_query_is_returned_verbatim() {
        let harness = harness(0, 0);
        let response = harness
            .gateway
            .process_request(request(
                "query bookById($id: ID!) { bookById(id: $id) { id title } }",
                json!({ "id": "1" }),
            ))
            .await;

        assert_eq!(
            to_json(&response),
            json!({ "data": { "bookById": { "id": "1", "title": "Book 1" } } })
        );
        assert_eq!(harness.book_calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.author_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_record_keeps_backend_error() {
        let harness = harness(0, 0);
        let response = harness
            .gateway
            .process_request(request("{ bookById(id: \"99\") { id title } }", json!({})))
            .await;

        assert_eq!(
            to_json(&response),
            json!({
                "data": { "bookById": null },
                "errors": [{
                    "message": "Record not found",
                    "path": ["bookById"],
                    "extensions": { "code": "NOT_FOUND" }
                }]
            })
        );
    }

    #[tokio::test]
    async fn merge_order_ignores_completion_order() {
        let query = "{ bookById(id: 2) { title } authorById(id: 1) { fullName } __typename }";
        let expected = json!({
            "data": {
                "bookById": { "title": "Book 2" },
                "authorById": { "fullName": "J Doe" },
                "__typename": "Query"
            }
        });

        for (book_delay, author_delay) in [(40, 0), (0, 40)] {
            let harness = harness(book_delay, author_delay);
            let response = harness.gateway.process_request(request(query, json!({}))).await;

            assert_eq!(to_json(&response), expected);
            assert_eq!(harness.book_calls.load(Ordering::SeqCst), 1);
            assert_eq!(harness.author_calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn sibling_requests_run_concurrently() {
        let harness = harness(200, 200);
        let started = tokio::time::Instant::now();

        harness
            .gateway
            .process_request(request(
                "{ bookById(id: 1) { id } authorById(id: 1) { id } }",
                json!({}),
            ))
            .await;

        assert!(started.elapsed() < Duration::from_millis(390));
    }

    #[tokio::test]
    async fn unknown_field_dispatches_nothing() {
        let harness = harness(0, 0);
        let response = harness
            .gateway
            .process_request(request("{ bookById(id: 1) { id isbn } }", json!({})))
            .await;

        assert_eq!(response.data, None);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].code(), Some(codes::GRAPHQL_VALIDATION_FAILED));
        assert_eq!(harness.book_calls.load(Ordering::SeqCst), 0);
    }

    fn author_down() -> FederationGateway {
        let books: Arc<dyn ResolverSet> = Arc::new(BookService::new().unwrap());
        let authors = AuthorService::new().unwrap();
        let schema = SchemaComposer::compose(vec![
            SubschemaConfig::new(
                "book-service",
                books.type_graph().clone(),
                Arc::new(LocalExecutor::new("book-service", books)),
            ),
            SubschemaConfig::new("author-service", authors.type_graph().clone(), Arc::new(Down)),
        ])
        .unwrap();
        FederationGateway::new(schema, Box::new(DelegatingQueryPlanner::new()))
    }

    #[tokio::test]
    async fn unavailable_backend_only_nulls_its_own_fields() {
        let gateway = author_down();

        let response = gateway
            .process_request(request(
                "{ bookById(id: 1) { title } authorById(id: 1) { fullName } }",
                json!({}),
            ))
            .await;

        assert_eq!(
            to_json(&response),
            json!({
                "data": { "bookById": { "title": "Book 1" }, "authorById": null },
                "errors": [{
                    "message": "Failed to send request to author-service: connection refused",
                    "path": ["authorById"],
                    "extensions": { "code": "SERVICE_UNAVAILABLE" }
                }]
            })
        );
    }

    #[tokio::test]
    async fn skipped_field_of_a_down_backend_is_not_requested() {
        let gateway = author_down();

        let response = gateway
            .process_request(request(
                "{ bookById(id: 1) { title } authorById(id: 1) @skip(if: true) { fullName } }",
                json!({}),
            ))
            .await;

        assert_eq!(to_json(&response), json!({ "data": { "bookById": { "title": "Book 1" } } }));
    }

    #[tokio::test]
    async fn response_keys_serialize_in_selection_order() {
        let harness = harness(0, 0);
        let response = harness
            .gateway
            .process_request(request(
                "{ zeta: bookById(id: 1) { title id } alpha: authorById(id: 1) { fullName } }",
                json!({}),
            ))
            .await;

        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"data":{"zeta":{"title":"Book 1","id":"1"},"alpha":{"fullName":"J Doe"}}}"#
        );
    }

    #[tokio::test]
    async fn introspection_is_answered_without_backends() {
        let harness = harness(0, 0);
        let response = harness
            .gateway
            .process_request(request(
                r#"{ __schema { queryType { name } } book: __type(name: "Book") { name } }"#,
                json!({}),
            ))
            .await;

        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"data":{"__schema":{"queryType":{"name":"Query"}},"book":{"name":"Book"}}}"#
        );
        assert_eq!(harness.book_calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.author_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_backend_hits_the_deadline() {
        let harness = harness(0, 500);
        let gateway = harness.gateway.with_subgraph_timeout(Some(Duration::from_millis(50)));

        let response = gateway
            .process_request(request(
                "{ bookById(id: 1) { id } authorById(id: 2) { fullName } }",
                json!({}),
            ))
            .await;

        assert_eq!(
            response.data,
            Some(json!({ "bookById": { "id": "1" }, "authorById": null }))
        );
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].code(), Some(codes::SERVICE_UNAVAILABLE));
        assert_eq!(response.errors[0].message, "author-service did not respond within 50ms");
    }

    #[test]
    fn null_in_non_null_root_field_nulls_data() {
        let plan = QueryPlan {
            operation_kind: crate::executor::OperationKind::Mutation,
            root_type: "Mutation".to_string(),
            fetches: vec![Fetch {
                subschema: 0,
                request: ExecutionRequest {
                    document: "mutation { addBook { id } }".to_string(),
                    operation_name: None,
                    variables: Map::new(),
                    operation_kind: crate::executor::OperationKind::Mutation,
                },
                response_keys: vec!["addBook".to_string()],
            }],
            root_fields: vec![crate::query_planner::RootField {
                response_key: "addBook".to_string(),
                source: RootFieldSource::Fetch(0),
                non_null: true,
            }],
        };

        let response = merge(&plan, vec![ExecutionResult::unavailable("book-service is down")]);

        assert_eq!(response.data, Some(Value::Null));
        assert_eq!(response.errors.len(), 1);
    }
}
