use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error codes placed under `extensions.code`.
pub mod codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
    pub const GRAPHQL_PARSE_FAILED: &str = "GRAPHQL_PARSE_FAILED";
    pub const GRAPHQL_VALIDATION_FAILED: &str = "GRAPHQL_VALIDATION_FAILED";
    pub const OPERATION_RESOLUTION_FAILURE: &str = "OPERATION_RESOLUTION_FAILURE";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<GraphQLErrorLocation>>,
    /// Response path segments; strings for keys, integers for list indices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GraphQLErrorLocation {
    pub line: usize,
    pub column: usize,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        GraphQLError {
            message: message.into(),
            locations: None,
            path: None,
            extensions: None,
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.extensions
            .get_or_insert_with(Map::new)
            .insert("code".to_string(), Value::String(code.to_string()));
        self
    }

    pub fn with_path(mut self, path: Vec<Value>) -> Self {
        self.path = Some(path);
        self
    }

    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|extensions| extensions.get("code"))
            .and_then(Value::as_str)
    }
}

/// The `{ data, errors }` envelope, used both for backend responses and for
/// the merged gateway response.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct GraphQLResponse {
    /// `None` means the key is absent (request rejected before execution),
    /// `Some(Value::Null)` means execution ran but nulled the whole result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

impl GraphQLResponse {
    pub fn from_data(data: Value) -> Self {
        GraphQLResponse {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn from_error(error: GraphQLError) -> Self {
        GraphQLResponse {
            data: None,
            errors: vec![error],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn error_serializes_with_code_extension() {
        let error = GraphQLError::new("Record not found")
            .with_path(vec![json!("bookById")])
            .with_code(codes::NOT_FOUND);

        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({
                "message": "Record not found",
                "path": ["bookById"],
                "extensions": { "code": "NOT_FOUND" }
            })
        );
        assert_eq!(error.code(), Some("NOT_FOUND"));
    }

    #[test]
    fn response_omits_missing_data_and_empty_errors() {
        let response = GraphQLResponse::from_data(json!({ "bookById": null }));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "data": { "bookById": null } })
        );

        let rejected = GraphQLResponse::from_error(GraphQLError::new("nope"));
        assert_eq!(
            serde_json::to_value(&rejected).unwrap(),
            json!({ "errors": [{ "message": "nope" }] })
        );
    }

    #[test]
    fn response_deserializes_backend_payload() {
        let response: GraphQLResponse = serde_json::from_value(json!({
            "data": { "bookById": null },
            "errors": [{
                "message": "Record not found",
                "locations": [{ "line": 2, "column": 3 }],
                "path": ["bookById"],
                "extensions": { "code": "NOT_FOUND" }
            }]
        }))
        .unwrap();

        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].code(), Some(codes::NOT_FOUND));
        assert!(!response.is_empty());
    }
}
