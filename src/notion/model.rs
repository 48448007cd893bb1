use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::model::Record;

#[derive(Deserialize, Debug)]
pub struct DatabaseProperty {
    pub id: String,
    #[serde(rename = "type")]
    pub typ: String,
}

#[derive(Deserialize, Debug)]
pub struct RetrieveDatabaseResp {
    pub id: String,
    #[serde(default)]
    pub title: Vec<Value>,
    pub properties: std::collections::HashMap<String, DatabaseProperty>,
}

/// One page of `POST v1/databases/{id}/query`.
#[derive(Deserialize, Debug, Default)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<Record>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sort {
    pub property: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn ascending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: SortDirection::Ascending,
        }
    }
}

/// A single filter condition. Opaque to the paginator, which only forwards
/// the conjunction of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Predicate(Value);

impl Predicate {
    pub fn files_is_empty(property: &str) -> Self {
        Self(json!({ "property": property, "files": { "is_empty": true } }))
    }

    pub fn rich_text_is_not_empty(property: &str) -> Self {
        Self(json!({ "property": property, "rich_text": { "is_not_empty": true } }))
    }

    pub fn status_equals(property: &str, value: &str) -> Self {
        Self(json!({ "property": property, "status": { "equals": value } }))
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }
}

/// Inputs of one page request.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseQuery {
    pub database_id: String,
    pub filter: Vec<Predicate>,
    pub sorts: Vec<Sort>,
    pub page_size: usize,
    pub start_cursor: Option<String>,
}
