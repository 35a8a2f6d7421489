use crate::composer::CompositionError;
use crate::config::ConfigError;
use crate::type_graph::TypeGraphError;

/// Everything that can stop a gateway or backend from starting.
#[derive(thiserror::Error, Debug)]
pub enum GatewayInitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Invalid schema for subgraph \"{service}\": {source}")]
    Schema {
        service: String,
        source: TypeGraphError,
    },
    #[error("Invalid bundled schema: {0}")]
    BundledSchema(#[from] TypeGraphError),
    #[error("Schema composition failed: {0}")]
    Composition(#[from] CompositionError),
    #[error("Unknown backend \"{0}\"")]
    UnknownBackend(String),
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: std::net::SocketAddr,
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
