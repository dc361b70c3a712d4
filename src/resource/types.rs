//! Typed views over resource snapshots
//!
//! Optional: proxies work on raw JSON, and
//! [`LazyResource::to_typed`](super::LazyResource::to_typed) turns a snapshot
//! into one of these when the caller prefers structs. Fields the views do not
//! name end up in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entity header, as returned by search and `entity/guid/{guid}/header`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityHeader {
    pub guid: Option<String>,
    pub type_name: String,
    pub status: Option<String>,
    pub display_text: Option<String>,
    pub attributes: Map<String, Value>,
    pub classification_names: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityHeader {
    /// `qualifiedName` attribute, present on most catalog types
    pub fn qualified_name(&self) -> Option<&str> {
        self.attributes.get("qualifiedName").and_then(Value::as_str)
    }
}

/// Classification attached to an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Classification {
    pub type_name: String,
    pub entity_guid: Option<String>,
    pub entity_status: Option<String>,
    pub propagate: Option<bool>,
    pub attributes: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reference from a glossary to one of its terms
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelatedTermHeader {
    pub term_guid: Option<String>,
    pub relation_guid: Option<String>,
    pub display_text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reference from a glossary to one of its categories
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelatedCategoryHeader {
    pub category_guid: Option<String>,
    pub parent_category_guid: Option<String>,
    pub relation_guid: Option<String>,
    pub display_text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Glossary {
    pub guid: Option<String>,
    pub name: String,
    pub qualified_name: Option<String>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub language: Option<String>,
    pub usage: Option<String>,
    pub terms: Vec<RelatedTermHeader>,
    pub categories: Vec<RelatedCategoryHeader>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The glossary a term or category is anchored to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlossaryAnchor {
    pub glossary_guid: Option<String>,
    pub relation_guid: Option<String>,
    pub display_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlossaryTerm {
    pub guid: Option<String>,
    pub name: String,
    pub qualified_name: Option<String>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub anchor: Option<GlossaryAnchor>,
    pub assigned_entities: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TypeDefHeader {
    pub guid: Option<String>,
    pub name: String,
    pub category: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of a search response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchResult {
    pub query_type: Option<String>,
    pub query_text: Option<String>,
    pub approximate_count: Option<i64>,
    pub entities: Vec<EntityHeader>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
