use serde::Serialize;

use super::{LookupService, Record};

pub type AuthorService = LookupService<Author>;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: String,
    pub full_name: String,
}

impl Author {
    pub fn new(id: impl Into<String>, full_name: impl Into<String>) -> Self {
        Author {
            id: id.into(),
            full_name: full_name.into(),
        }
    }
}

impl Record for Author {
    const SERVICE_NAME: &'static str = "author-service";
    const LOOKUP_FIELD: &'static str = "authorById";
    const SDL: &'static str = include_str!(concat!(env!("OUT_SCHEMAS"), "/author-service.graphql"));
    const DEFAULT_PORT: u16 = 4002;

    fn id(&self) -> &str {
        &self.id
    }

    fn fixtures() -> Vec<Self> {
        vec![Author::new("1", "J Doe"), Author::new("2", "J Dough")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subschema::{ResolverSet, Resolution};
    use serde_json::json;

    #[test]
    fn resolves_full_name_in_camel_case() {
        let authors = AuthorService::new().unwrap();
        let args = json!({ "id": "2" }).as_object().cloned().unwrap();

        assert_eq!(
            authors.resolve("Query", "authorById", &args),
            Some(Resolution::Value(json!({ "id": "2", "fullName": "J Dough" })))
        );
    }
}
