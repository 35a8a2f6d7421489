pub mod backends;
pub mod composer;
pub mod config;
pub mod error;
pub mod executor;
pub mod federation_gateway;
mod introspection;
pub mod local_execution;
pub mod logger;
pub mod operation;
pub mod query_planner;
pub mod response;
pub mod server;
pub mod subschema;
pub mod transform;
pub mod type_graph;

pub use composer::{ComposedSchema, CompositionError, SchemaComposer};
pub use error::GatewayInitError;
pub use federation_gateway::FederationGateway;
pub use query_planner::DelegatingQueryPlanner;
pub use response::{GraphQLError, GraphQLResponse};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A subgraph as registered with the gateway: its name, endpoint and SDL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub url: String,
    pub schema: String,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
    #[serde(default)]
    pub operation_name: Option<String>,
}
