//! The stitched services: small lookup-by-id backends that own their data.

pub mod authors;
pub mod books;
pub mod publishers;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::GraphQLRequest;
use crate::error::GatewayInitError;
use crate::executor::{ExecutionRequest, OperationKind};
use crate::local_execution;
use crate::response::GraphQLResponse;
use crate::server::RequestHandler;
use crate::subschema::{ResolverSet, Resolution};
use crate::type_graph::{TypeGraph, TypeGraphError};

pub use authors::{Author, AuthorService};
pub use books::{Book, BookService};
pub use publishers::{Publisher, PublisherService};

/// A record served by a [`LookupService`] through a single `<field>(id: ID!)`
/// root query.
pub trait Record: Serialize + Sized + Send + Sync + 'static {
    const SERVICE_NAME: &'static str;
    const LOOKUP_FIELD: &'static str;
    const SDL: &'static str;
    const DEFAULT_PORT: u16;

    fn id(&self) -> &str;

    fn fixtures() -> Vec<Self>;
}

pub struct LookupService<R> {
    type_graph: TypeGraph,
    store: Vec<R>,
}

impl<R: Record> LookupService<R> {
    /// A service seeded with the bundled records.
    pub fn new() -> Result<Self, TypeGraphError> {
        Self::with_store(R::fixtures())
    }

    pub fn with_store(store: Vec<R>) -> Result<Self, TypeGraphError> {
        Ok(LookupService {
            type_graph: TypeGraph::from_sdl(R::SDL)?,
            store,
        })
    }

    pub fn find(&self, id: &str) -> Option<&R> {
        self.store.iter().find(|record| record.id() == id)
    }
}

impl<R: Record> ResolverSet for LookupService<R> {
    fn type_graph(&self) -> &TypeGraph {
        &self.type_graph
    }

    fn resolve(&self, type_name: &str, field_name: &str, args: &Map<String, Value>) -> Option<Resolution> {
        if type_name != self.type_graph.roots().query || field_name != R::LOOKUP_FIELD {
            return None;
        }

        let record = args
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| self.find(id))
            .and_then(|record| serde_json::to_value(record).ok());
        Some(record.map_or(Resolution::NotFound, Resolution::Value))
    }
}

/// Serves one backend over HTTP by running requests in process.
pub struct BackendService {
    name: &'static str,
    default_port: u16,
    default_query: String,
    resolvers: Arc<dyn ResolverSet>,
}

impl BackendService {
    pub fn new<R: Record>(service: LookupService<R>) -> Self {
        BackendService {
            name: R::SERVICE_NAME,
            default_port: R::DEFAULT_PORT,
            default_query: format!("query {{\n  {}(id: 1) {{\n    id\n  }}\n}}\n", R::LOOKUP_FIELD),
            resolvers: Arc::new(service),
        }
    }

    /// The bundled backend registered under `name`, seeded with its fixtures.
    pub fn by_name(name: &str) -> Result<Self, GatewayInitError> {
        if name == Book::SERVICE_NAME {
            Ok(BackendService::new(BookService::new()?))
        } else if name == Author::SERVICE_NAME {
            Ok(BackendService::new(AuthorService::new()?))
        } else if name == Publisher::SERVICE_NAME {
            Ok(BackendService::new(PublisherService::new()?))
        } else {
            Err(GatewayInitError::UnknownBackend(name.to_string()))
        }
    }

    pub fn service_name(&self) -> &str {
        self.name
    }

    pub fn default_port(&self) -> u16 {
        self.default_port
    }
}

#[async_trait]
impl RequestHandler for BackendService {
    fn name(&self) -> &str {
        self.name
    }

    fn default_query(&self) -> &str {
        &self.default_query
    }

    async fn handle(&self, request: GraphQLRequest) -> GraphQLResponse {
        let request = ExecutionRequest {
            document: request.query,
            operation_name: request.operation_name,
            variables: request.variables.unwrap_or_default(),
            // The engine reads the kind from the document itself.
            operation_kind: OperationKind::Query,
        };
        local_execution::execute(self.resolvers.as_ref(), &request)
    }
}
