use serde::Serialize;

use super::{LookupService, Record};

/// Bundled but left out of the default supergraph.
pub type PublisherService = LookupService<Publisher>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Publisher {
    pub id: String,
    pub name: String,
}

impl Publisher {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Publisher {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl Record for Publisher {
    const SERVICE_NAME: &'static str = "publisher-service";
    const LOOKUP_FIELD: &'static str = "publisherById";
    const SDL: &'static str = include_str!(concat!(env!("OUT_SCHEMAS"), "/publisher-service.graphql"));
    const DEFAULT_PORT: u16 = 4003;

    fn id(&self) -> &str {
        &self.id
    }

    fn fixtures() -> Vec<Self> {
        vec![
            Publisher::new("1", "Green Book"),
            Publisher::new("2", "Yellow Book"),
            Publisher::new("3", "Red Book"),
        ]
    }
}
