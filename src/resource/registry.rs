//! Resource Registry - Load resource definitions from JSON
//!
//! Every logical resource name the client understands is declared in the JSON
//! tables under `src/resources/`, embedded at compile time. The tables are
//! parsed into a [`ResourceRegistry`] value once and handed to the client; the
//! registry has no mutation API after that.

use crate::atlas::Method;
use crate::config::compare_versions;
use crate::error::{ClientError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[(&str, &str)] = &[
    ("entity.json", include_str!("../resources/entity.json")),
    ("typedefs.json", include_str!("../resources/typedefs.json")),
    ("search.json", include_str!("../resources/search.json")),
    ("glossary.json", include_str!("../resources/glossary.json")),
    ("admin.json", include_str!("../resources/admin.json")),
];

/// Which proxy variant represents a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Entity,
    Classification,
    Audit,
    TypeDef,
    Relationship,
    Lineage,
    Search,
    Glossary,
    GlossaryTerm,
    GlossaryCategory,
    Admin,
}

/// Whether an endpoint returns one resource or a list of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Single,
    Collection,
}

/// API root a path is relative to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApiRoot {
    #[default]
    V2,
    Admin,
}

impl ApiRoot {
    pub fn prefix(&self) -> &'static str {
        match self {
            ApiRoot::V2 => "api/atlas/v2",
            ApiRoot::Admin => "api/atlas/admin",
        }
    }
}

fn default_limit_param() -> String {
    "limit".to_string()
}

fn default_offset_param() -> String {
    "offset".to_string()
}

fn default_page_size() -> usize {
    100
}

/// Offset/limit pagination for collection endpoints
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaginationDef {
    #[serde(default = "default_limit_param")]
    pub limit_param: String,
    #[serde(default = "default_offset_param")]
    pub offset_param: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Dot path of a total-count field; a page that reaches it ends the
    /// collection without an extra empty fetch
    #[serde(default)]
    pub total_path: Option<String>,
}

/// A named relation from one resource to another.
///
/// With a `segment` the relation lives at the parent's URL plus that segment.
/// Without one, the target's own path template is filled from the parent's
/// fields (`glossary/term/{guid}` -> `glossary/terms/{guid}/assignedEntities`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelationDef {
    pub name: String,
    #[serde(default)]
    pub segment: Option<String>,
    /// Logical name describing what the relation resolves to
    pub target: String,
    /// Segment under the parent URL where individual related items live,
    /// when it differs from `segment` (e.g. `classifications` vs `classification`)
    #[serde(default)]
    pub item_segment: Option<String>,
}

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    /// Logical name; filled in from the table key
    #[serde(skip)]
    pub name: String,
    pub kind: ResourceKind,
    /// Path template relative to the API root, with `{placeholder}`s
    pub path: String,
    pub shape: Shape,
    #[serde(default)]
    pub api: ApiRoot,
    #[serde(default)]
    pub description: String,
    /// Field holding the resource's identity
    #[serde(default)]
    pub primary_key: Option<String>,
    /// Envelope key wrapping the resource fields in responses
    #[serde(default)]
    pub data_key: Option<String>,
    /// Dot path of the item list in collection responses ("" = body is the list)
    #[serde(default)]
    pub items_path: Option<String>,
    /// A response without the item list is an empty page rather than malformed
    #[serde(default)]
    pub items_optional: bool,
    /// Endpoint only accepts list payloads; single `create` is refused
    #[serde(default)]
    pub bulk_only: bool,
    /// Logical name used to proxy each collection item
    #[serde(default)]
    pub item_resource: Option<String>,
    #[serde(default)]
    pub pagination: Option<PaginationDef>,
    #[serde(default = "default_update_method")]
    pub update_method: Method,
    /// Suffix appended to the resource URL for partial updates
    #[serde(default)]
    pub partial_suffix: Option<String>,
    #[serde(default)]
    pub relations: Vec<RelationDef>,
    /// Oldest server version exposing this resource
    #[serde(default)]
    pub min_version: Option<String>,
}

fn default_update_method() -> Method {
    Method::Put
}

impl ResourceDef {
    /// Placeholder names in the path template, in order
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            names.push(&rest[start + 1..start + len]);
            rest = &rest[start + len + 1..];
        }
        names
    }

    /// Fill the path template, asking `lookup` for each placeholder value.
    /// Values are URL-encoded. `None` if any placeholder has no value.
    pub fn fill_path(&self, mut lookup: impl FnMut(&str) -> Option<String>) -> Option<String> {
        let mut out = String::with_capacity(self.path.len());
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            out.push_str(&rest[..start]);
            let value = lookup(&rest[start + 1..start + len])?;
            out.push_str(&urlencoding::encode(&value));
            rest = &rest[start + len + 1..];
        }
        out.push_str(rest);
        Some(out)
    }

    /// Bind positional path arguments to placeholder names
    pub fn bind_args(&self, args: &[&str]) -> Result<Vec<(String, String)>> {
        let names = self.placeholders();
        if names.len() != args.len() {
            return Err(ClientError::PathArguments {
                resource: self.name.clone(),
                expected: names.len(),
                got: args.len(),
            });
        }
        Ok(names
            .into_iter()
            .zip(args)
            .map(|(n, v)| (n.to_string(), (*v).to_string()))
            .collect())
    }

    /// Absolute URL for a path relative to this resource's API root
    pub fn api_url(&self, base_url: &str, path: &str) -> String {
        format!(
            "{}/{}/{}",
            base_url.trim_end_matches('/'),
            self.api.prefix(),
            path.trim_start_matches('/')
        )
    }

    /// Absolute URL with placeholders filled from bound arguments
    pub fn url_for(&self, base_url: &str, bound: &[(String, String)]) -> Option<String> {
        let path = self.fill_path(|name| {
            bound
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        })?;
        Some(self.api_url(base_url, &path))
    }

    /// Absolute URL with placeholders filled from snapshot fields first,
    /// then from `fallback` bindings
    pub fn url_from_fields(
        &self,
        base_url: &str,
        fields: &Map<String, Value>,
        fallback: &[(String, String)],
    ) -> Option<String> {
        let path = self.fill_path(|name| {
            fields
                .get(name)
                .and_then(scalar_to_string)
                .or_else(|| {
                    fallback
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| v.clone())
                })
        })?;
        Some(self.api_url(base_url, &path))
    }

    /// Initial snapshot implied by the path arguments: a placeholder named
    /// after the primary key makes the identity known without a fetch
    pub fn seed_snapshot(&self, bound: &[(String, String)]) -> Map<String, Value> {
        let mut seed = Map::new();
        if let Some(pk) = &self.primary_key {
            if let Some((_, value)) = bound.iter().find(|(n, _)| n == pk) {
                seed.insert(pk.clone(), Value::String(value.clone()));
            }
        }
        seed
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Refuse resources newer than the connected server
    pub fn check_version(&self, server_version: Option<&str>) -> Result<()> {
        let (Some(required), Some(actual)) = (self.min_version.as_deref(), server_version) else {
            return Ok(());
        };
        match compare_versions(actual, required) {
            Some(Ordering::Less) => Err(ClientError::UnsupportedVersion {
                resource: self.name.clone(),
                required: required.to_string(),
                actual: actual.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Render a scalar JSON value for use in a URL
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Deserialize)]
struct ResourceFile {
    #[serde(default)]
    resources: HashMap<String, ResourceDef>,
}

/// Read-only table of every resource the client can construct
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    resources: HashMap<String, Arc<ResourceDef>>,
}

impl ResourceRegistry {
    /// The registry shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_sources(RESOURCE_FILES)
    }

    /// Build a registry from `(label, json)` tables
    pub fn from_sources(sources: &[(&str, &str)]) -> Result<Self> {
        let mut resources: HashMap<String, Arc<ResourceDef>> = HashMap::new();

        for (label, content) in sources {
            let partial: ResourceFile = serde_json::from_str(content)
                .map_err(|e| ClientError::Registry(format!("failed to parse {}: {}", label, e)))?;

            for (name, mut def) in partial.resources {
                if resources.contains_key(&name) {
                    return Err(ClientError::Registry(format!(
                        "duplicate resource '{}' in {}",
                        name, label
                    )));
                }
                def.name = name.clone();
                resources.insert(name, Arc::new(def));
            }
        }

        let registry = Self { resources };
        registry.validate()?;
        Ok(registry)
    }

    /// Cross-check references between definitions
    fn validate(&self) -> Result<()> {
        for def in self.resources.values() {
            if def.path.matches('{').count() != def.path.matches('}').count() {
                return Err(ClientError::Registry(format!(
                    "{}: unbalanced placeholder braces in '{}'",
                    def.name, def.path
                )));
            }

            if let Some(item) = &def.item_resource {
                match self.resources.get(item) {
                    Some(target) if target.shape == Shape::Single => {}
                    Some(_) => {
                        return Err(ClientError::Registry(format!(
                            "{}: item_resource '{}' must be a single resource",
                            def.name, item
                        )))
                    }
                    None => {
                        return Err(ClientError::Registry(format!(
                            "{}: unknown item_resource '{}'",
                            def.name, item
                        )))
                    }
                }
            }

            if def.shape == Shape::Collection && def.items_path.is_none() {
                return Err(ClientError::Registry(format!(
                    "{}: collections need an items_path",
                    def.name
                )));
            }

            if let Some(pagination) = &def.pagination {
                if pagination.page_size == 0 {
                    return Err(ClientError::Registry(format!(
                        "{}: page_size must be > 0",
                        def.name
                    )));
                }
            }

            for relation in &def.relations {
                let Some(target) = self.resources.get(&relation.target) else {
                    return Err(ClientError::Registry(format!(
                        "{}: relation '{}' targets unknown resource '{}'",
                        def.name, relation.name, relation.target
                    )));
                };
                if relation.segment.is_none() && target.placeholders().is_empty() {
                    return Err(ClientError::Registry(format!(
                        "{}: relation '{}' has no segment and '{}' has no placeholders",
                        def.name, relation.name, relation.target
                    )));
                }
            }
        }
        Ok(())
    }

    /// Look up a logical name
    pub fn resolve(&self, name: &str) -> Result<Arc<ResourceDef>> {
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::UnknownResource(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&ResourceDef> {
        self.resources.get(name).map(|d| d.as_ref())
    }

    /// All logical names, sorted (for listings and autocomplete)
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.resources.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
