use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::local_execution;
use crate::response::{GraphQLResponse, codes};
use crate::subschema::ResolverSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
        }
    }
}

/// One delegated sub-request: a printed operation document holding only the
/// selections owned by the target subschema.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionRequest {
    pub document: String,
    pub operation_name: Option<String>,
    pub variables: Map<String, Value>,
    pub operation_kind: OperationKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionFailure {
    pub message: String,
    pub code: &'static str,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionResult {
    /// The backend answered; its payload is passed through untouched,
    /// including any domain errors such as `NOT_FOUND`.
    Response(GraphQLResponse),
    /// The backend could not be reached or did not answer with GraphQL.
    Failure(ExecutionFailure),
}

impl ExecutionResult {
    pub fn unavailable(message: impl Into<String>) -> Self {
        ExecutionResult::Failure(ExecutionFailure {
            message: message.into(),
            code: codes::SERVICE_UNAVAILABLE,
        })
    }
}

/// Sends a sub-request to one backend. Implementations never fail past this
/// contract: every problem is reported as an `ExecutionResult::Failure`.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult;
}

pub struct HttpRemoteExecutor {
    service_name: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpRemoteExecutor {
    pub fn new(service_name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::with_client(service_name, endpoint, reqwest::Client::new())
    }

    pub fn with_client(
        service_name: impl Into<String>,
        endpoint: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        HttpRemoteExecutor {
            service_name: service_name.into(),
            endpoint: endpoint.into(),
            client,
        }
    }
}

#[async_trait]
impl RemoteExecutor for HttpRemoteExecutor {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        debug!(
            service = %self.service_name,
            query = %request.document,
            variables = ?request.variables,
            "executor sending"
        );

        let request_body = json!({
            "query": request.document,
            "variables": request.variables,
            "operationName": request.operation_name,
        });

        let response = match self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(service = %self.service_name, error = %e, "backend request failed");
                return ExecutionResult::unavailable(format!(
                    "Failed to send request to {}: {}",
                    self.service_name, e
                ));
            }
        };

        let status = response.status();
        match response.json::<GraphQLResponse>().await {
            Ok(payload) if !payload.is_empty() => ExecutionResult::Response(payload),
            _ if !status.is_success() => {
                warn!(service = %self.service_name, %status, "backend responded with an error status");
                ExecutionResult::unavailable(format!(
                    "{} responded with HTTP status {}",
                    self.service_name, status
                ))
            }
            Ok(_) => ExecutionResult::unavailable(format!(
                "{} returned neither data nor errors",
                self.service_name
            )),
            Err(e) => ExecutionResult::unavailable(format!(
                "Failed to parse response from {}: {}",
                self.service_name, e
            )),
        }
    }
}

/// Executes sub-requests in process against a co-located backend. The request
/// document goes through the same parser an HTTP backend would use.
pub struct LocalExecutor {
    service_name: String,
    resolvers: Arc<dyn ResolverSet>,
}

impl LocalExecutor {
    pub fn new(service_name: impl Into<String>, resolvers: Arc<dyn ResolverSet>) -> Self {
        LocalExecutor {
            service_name: service_name.into(),
            resolvers,
        }
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        debug!(
            service = %self.service_name,
            query = %request.document,
            variables = ?request.variables,
            "executor sending"
        );
        ExecutionResult::Response(local_execution::execute(self.resolvers.as_ref(), &request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(document: &str) -> ExecutionRequest {
        ExecutionRequest {
            document: document.to_string(),
            operation_name: Some("bookById".to_string()),
            variables: json!({ "id": "1" }).as_object().cloned().unwrap_or_default(),
            operation_kind: OperationKind::Query,
        }
    }

    #[tokio::test]
    async fn http_executor_passes_backend_payload_through() {
        let mut server = mockito::Server::new_async().await;
        let backend = server
            .mock("POST", "/graphql")
            .match_body(mockito::Matcher::PartialJson(json!({
                "operationName": "bookById",
                "variables": { "id": "1" }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "data": { "bookById": null },
                    "errors": [{ "message": "Record not found", "extensions": { "code": "NOT_FOUND" } }]
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let executor = HttpRemoteExecutor::new("book-service", format!("{}/graphql", server.url()));
        let result = executor
            .execute(request("query bookById($id: ID!) { bookById(id: $id) { id } }"))
            .await;

        backend.assert_async().await;
        let ExecutionResult::Response(response) = result else {
            panic!("expected a backend response, got {:?}", result);
        };
        assert_eq!(response.data, Some(json!({ "bookById": null })));
        assert_eq!(response.errors[0].code(), Some(codes::NOT_FOUND));
    }

    #[tokio::test]
    async fn http_executor_reports_unreachable_backend() {
        // Nothing listens on the discard port.
        let executor = HttpRemoteExecutor::new("book-service", "http://127.0.0.1:9/graphql");
        let result = executor.execute(request("{ bookById(id: 1) { id } }")).await;

        let ExecutionResult::Failure(failure) = result else {
            panic!("expected a failure, got {:?}", result);
        };
        assert_eq!(failure.code, codes::SERVICE_UNAVAILABLE);
        assert!(failure.message.starts_with("Failed to send request to book-service"));
    }

    #[tokio::test]
    async fn http_executor_reports_non_graphql_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/graphql")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let executor = HttpRemoteExecutor::new("author-service", format!("{}/graphql", server.url()));
        let result = executor.execute(request("{ authorById(id: 1) { id } }")).await;

        assert_eq!(
            result,
            ExecutionResult::unavailable("author-service responded with HTTP status 502 Bad Gateway")
        );
    }
}
