use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::ServiceConfig;
use crate::federation_gateway::DEFAULT_SUBGRAPH_TIMEOUT;

pub const DEFAULT_CONFIG_PATH: &str = "./schemas/supergraph.yaml";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Failed to read schema file {path} of subgraph \"{subgraph}\": {source}")]
    SchemaFile {
        subgraph: String,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0}")]
    InvalidValue(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupergraphConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Deadline for each delegated sub-request.
    #[serde(default = "default_subgraph_timeout", with = "humantime_serde")]
    pub subgraph_timeout: Option<Duration>,
    #[serde(default)]
    pub log: LoggingConfig,
    /// Composition order follows file order.
    pub subgraphs: IndexMap<String, SubgraphConfig>,
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubgraphConfig {
    pub routing_url: String,
    pub schema: SchemaConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    pub file: String,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4000))
}

fn default_subgraph_timeout() -> Option<Duration> {
    Some(DEFAULT_SUBGRAPH_TIMEOUT)
}

impl SupergraphConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading supergraph config");

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    /// Parses a config whose schema paths resolve against the working directory.
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// Reads every subgraph's SDL, in composition order.
    pub fn services(&self) -> Result<Vec<ServiceConfig>, ConfigError> {
        self.subgraphs
            .iter()
            .map(|(name, subgraph)| {
                let path = self.base_dir.join(&subgraph.schema.file);
                debug!(subgraph = %name, path = %path.display(), "reading schema file");
                let schema = fs::read_to_string(&path).map_err(|source| ConfigError::SchemaFile {
                    subgraph: name.clone(),
                    path,
                    source,
                })?;
                Ok(ServiceConfig {
                    name: name.clone(),
                    url: subgraph.routing_url.clone(),
                    schema,
                })
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Applies `LOG_LEVEL` and `LOG_FORMAT` on top of the configured values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.level = level.parse().map_err(ConfigError::InvalidValue)?;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.format = format.parse().map_err(ConfigError::InvalidValue)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bundled_config_lists_subgraphs_in_file_order() {
        let config = SupergraphConfig::load(DEFAULT_CONFIG_PATH).unwrap();

        assert_eq!(config.listen, "0.0.0.0:4000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.subgraph_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.log.level, LogLevel::Info);

        let services = config.services().unwrap();
        let names: Vec<&str> = services.iter().map(|service| service.name.as_str()).collect();
        assert_eq!(names, vec!["book-service", "author-service"]);
        assert_eq!(services[0].url, "http://localhost:4001/graphql");
        assert!(services[0].schema.contains("bookById(id: ID!): Book"));
    }

    #[test]
    fn optional_sections_have_defaults() {
        let config = SupergraphConfig::from_yaml(
            "subgraphs:\n  a:\n    routing_url: http://a/graphql\n    schema:\n      file: a.graphql\n",
        )
        .unwrap();

        assert_eq!(config.listen, default_listen());
        assert_eq!(config.subgraph_timeout, Some(DEFAULT_SUBGRAPH_TIMEOUT));
        assert_eq!(config.log.format, LogFormat::Text);
    }

    #[test]
    fn parses_humantime_and_log_settings() {
        let config = SupergraphConfig::from_yaml(
            "subgraph_timeout: 1500ms\nlog:\n  level: debug\n  format: json\nsubgraphs: {}\n",
        )
        .unwrap();

        assert_eq!(config.subgraph_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn rejects_unknown_keys_and_missing_schema_files() {
        assert!(SupergraphConfig::from_yaml("subgraphs: {}\nlisten_port: 1\n").is_err());

        let config = SupergraphConfig::from_yaml(
            "subgraphs:\n  ghost:\n    routing_url: http://ghost/graphql\n    schema:\n      file: ./does-not-exist.graphql\n",
        )
        .unwrap();
        assert!(matches!(
            config.services(),
            Err(ConfigError::SchemaFile { subgraph, .. }) if subgraph == "ghost"
        ));
    }

    #[test]
    fn log_settings_parse_case_insensitively() {
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("Json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
