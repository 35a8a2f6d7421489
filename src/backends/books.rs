use serde::Serialize;

use super::{LookupService, Record};

pub type BookService = LookupService<Book>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Book {
    pub id: String,
    pub title: String,
}

impl Book {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Book {
            id: id.into(),
            title: title.into(),
        }
    }
}

impl Record for Book {
    const SERVICE_NAME: &'static str = "book-service";
    const LOOKUP_FIELD: &'static str = "bookById";
    const SDL: &'static str = include_str!(concat!(env!("OUT_SCHEMAS"), "/book-service.graphql"));
    const DEFAULT_PORT: u16 = 4001;

    fn id(&self) -> &str {
        &self.id
    }

    fn fixtures() -> Vec<Self> {
        (1..=4).map(|n| Book::new(n.to_string(), format!("Book {}", n))).collect()
    }
}
