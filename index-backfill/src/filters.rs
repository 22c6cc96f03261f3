//! Query DSL for the eligibility scan.

use serde_json::{Value, json};

/// Matches every record where `field` does not exist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingFieldQuery {
    pub field: String,
    pub page_size: usize,
}

impl MissingFieldQuery {
    pub fn new(field: impl Into<String>, page_size: usize) -> Self {
        Self {
            field: field.into(),
            page_size: page_size.max(1),
        }
    }

    /// Body of the initial `_search?scroll=` request.
    ///
    /// Sorted by `_doc`, the cheapest order for scrolling.
    pub fn to_search_body(&self) -> Value {
        json!({
            "size": self.page_size,
            "sort": ["_doc"],
            "query": {
                "bool": {
                    "must_not": {
                        "exists": { "field": self.field }
                    }
                }
            }
        })
    }
}
