//! Resource Collections
//!
//! Lazily populated sequences of [`LazyResource`] backed by a list-returning
//! endpoint, fetched in offset/limit batches when the definition declares
//! pagination and in a single request otherwise.

use super::lazy::LazyResource;
use super::registry::{scalar_to_string, ResourceDef};
use super::session::{value_at, Session};
use crate::atlas::{Method, QueryParams};
use crate::error::{ClientError, Result};
use crate::events::Operation;
use serde_json::{Map, Value};
use std::sync::Arc;

/// How collection items get their own URL
#[derive(Debug, Clone)]
pub(crate) enum ItemLocator {
    /// Fill the item resource's path template from item fields, then from
    /// the collection's own path arguments
    Template { bound: Vec<(String, String)> },
    /// `base/<identity key>`
    Segment { base: String },
}

/// Proxy for a list-returning endpoint
#[derive(Debug, Clone)]
pub struct ResourceCollection {
    session: Session,
    def: Arc<ResourceDef>,
    item_def: Option<Arc<ResourceDef>>,
    source_url: String,
    query_params: QueryParams,
    locator: ItemLocator,
    items: Vec<LazyResource>,
    offset: usize,
    exhausted: bool,
    raw_payload: Option<Value>,
}

impl ResourceCollection {
    pub(crate) fn new(
        session: Session,
        def: Arc<ResourceDef>,
        source_url: String,
        query_params: QueryParams,
        locator: ItemLocator,
    ) -> Result<Self> {
        let item_def = def
            .item_resource
            .as_deref()
            .map(|name| session.registry.resolve(name))
            .transpose()?;
        let offset = def
            .pagination
            .as_ref()
            .and_then(|p| query_params.get(&p.offset_param))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Ok(Self {
            session,
            def,
            item_def,
            source_url,
            query_params,
            locator,
            items: Vec::new(),
            offset,
            exhausted: false,
            raw_payload: None,
        })
    }

    /// Collection whose URL repeats `key` once per value, e.g.
    /// `entity/bulk?guid=a&guid=b`
    pub(crate) fn with_repeated_param(
        session: Session,
        name: &str,
        key: &str,
        values: &[&str],
    ) -> Result<Self> {
        let def = session.def(name)?;
        let base = def
            .url_for(&session.base_url, &[])
            .ok_or_else(|| ClientError::Unaddressable {
                resource: def.name.clone(),
                key: "path".to_string(),
            })?;
        let query: Vec<String> = values
            .iter()
            .map(|v| format!("{}={}", urlencoding::encode(key), urlencoding::encode(v)))
            .collect();
        let url = if query.is_empty() {
            base
        } else {
            format!("{}?{}", base, query.join("&"))
        };
        Self::new(
            session,
            def,
            url,
            QueryParams::new(),
            ItemLocator::Template { bound: Vec::new() },
        )
    }

    /// Logical resource name
    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn query_params(&self) -> &QueryParams {
        &self.query_params
    }

    /// Items fetched so far, in server order
    pub fn items(&self) -> &[LazyResource] {
        &self.items
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Last full response body
    pub fn raw_payload(&self) -> Option<&Value> {
        self.raw_payload.as_ref()
    }

    /// A fresh, unfetched collection with extra query parameters
    pub fn with_params<K, V>(&self, params: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut merged = self.query_params.clone();
        merged.extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        Self::new(
            self.session.clone(),
            self.def.clone(),
            self.source_url.clone(),
            merged,
            self.locator.clone(),
        )
    }

    /// Fetch the next batch and append it to `items`.
    ///
    /// Returns the number of new items; a no-op once exhausted. A malformed
    /// page fails without touching the items already fetched.
    pub fn fetch_next_batch(&mut self) -> Result<usize> {
        if self.exhausted {
            return Ok(0);
        }

        let mut params = self.query_params.clone();
        let mut limit = None;
        if let Some(pagination) = &self.def.pagination {
            let page = params
                .get(&pagination.limit_param)
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|l| *l > 0)
                .unwrap_or(pagination.page_size);
            params.insert(pagination.limit_param.clone(), page.to_string());
            params.insert(pagination.offset_param.clone(), self.offset.to_string());
            limit = Some(page);
        }

        let def = self.def.clone();
        let url = self.source_url.clone();
        let events = self.session.events.clone();

        events.track(&def.name, Operation::FetchBatch, Some(&url), || {
            let response = self.session.request(Method::Get, &url, Some(&params), None)?;
            let body = response.body.unwrap_or(Value::Null);
            let raw_items = extract_items(&def, &url, &body)?;
            let count = raw_items.len();

            let batch: Vec<LazyResource> = raw_items
                .into_iter()
                .map(|fields| self.make_item(fields, false))
                .collect();
            self.items.extend(batch);
            self.offset += count;

            let total_reached = def
                .pagination
                .as_ref()
                .and_then(|p| p.total_path.as_deref())
                .and_then(|path| value_at(&body, path))
                .and_then(Value::as_u64)
                .is_some_and(|total| self.offset as u64 >= total);

            self.exhausted = match limit {
                None => true,
                Some(limit) => count == 0 || count < limit || total_reached,
            };
            self.raw_payload = Some(body);

            tracing::debug!(
                resource = %def.name,
                count = count,
                offset = self.offset,
                exhausted = self.exhausted,
                "Fetched batch"
            );
            Ok(count)
        })
    }

    /// Fetch every remaining batch
    pub fn fetch_all(&mut self) -> Result<&[LazyResource]> {
        while !self.exhausted {
            self.fetch_next_batch()?;
        }
        Ok(&self.items)
    }

    /// Collection-level field (e.g. `approximateCount`) from the last
    /// response, fetching the first batch if nothing was fetched yet
    pub fn attribute(&mut self, name: &str) -> Result<Value> {
        if self.raw_payload.is_none() {
            self.fetch_next_batch()?;
        }
        self.raw_payload
            .as_ref()
            .and_then(|payload| payload.get(name))
            .cloned()
            .ok_or_else(|| ClientError::FieldNotFound {
                resource: self.def.name.clone(),
                field: name.to_string(),
            })
    }

    /// Unfetched proxy for the item with the given key
    pub fn get(&self, key: &str) -> Result<LazyResource> {
        let item_def = self.item_def.as_ref().ok_or_else(|| ClientError::Unsupported {
            resource: self.def.name.clone(),
            operation: "get",
        })?;

        let mut fields = Map::new();
        if let Some(pk) = &item_def.primary_key {
            fields.insert(pk.clone(), Value::String(key.to_string()));
        }
        let url = match &self.locator {
            ItemLocator::Segment { base } => Some(format!("{}/{}", base, urlencoding::encode(key))),
            ItemLocator::Template { bound } => {
                item_def.url_from_fields(&self.session.base_url, &fields, bound)
            }
        };
        if url.is_none() {
            return Err(ClientError::Unaddressable {
                resource: item_def.name.clone(),
                key: key.to_string(),
            });
        }

        Ok(LazyResource::new(
            self.session.clone(),
            item_def.clone(),
            url,
            fields,
            false,
        ))
    }

    /// POST one payload to the collection URL
    pub fn create(&self, data: Value) -> Result<LazyResource> {
        if self.def.bulk_only {
            return Err(ClientError::Unsupported {
                resource: self.def.name.clone(),
                operation: "create",
            });
        }
        let def = self.def.clone();
        let url = self.source_url.clone();

        self.session.events.track(&def.name, Operation::Create, Some(&url), || {
            let response = self.session.request(Method::Post, &url, None, Some(&data))?;
            match response.body {
                Some(Value::Object(created)) => Ok(self.make_item(created, true)),
                None => Ok(self.make_item(as_object(&url, data.clone())?, false)),
                Some(_) => Err(ClientError::MalformedResponse {
                    url: url.clone(),
                    reason: "create returned a non-object body".to_string(),
                }),
            }
        })
    }

    /// POST a list payload; returns proxies for the created items
    pub fn create_bulk(&self, items: Vec<Value>) -> Result<Vec<LazyResource>> {
        self.send_bulk(Method::Post, Operation::BulkCreate, items)
    }

    /// PUT a list payload; returns proxies for the updated items
    pub fn update_bulk(&self, items: Vec<Value>) -> Result<Vec<LazyResource>> {
        self.send_bulk(Method::Put, Operation::BulkUpdate, items)
    }

    /// DELETE with a list payload
    pub fn delete_bulk(&self, items: Vec<Value>) -> Result<()> {
        self.send_bulk(Method::Delete, Operation::BulkDelete, items)
            .map(|_| ())
    }

    fn send_bulk(
        &self,
        method: Method,
        operation: Operation,
        items: Vec<Value>,
    ) -> Result<Vec<LazyResource>> {
        let def = self.def.clone();
        let url = self.source_url.clone();
        let payload = Value::Array(items);

        self.session.events.track(&def.name, operation, Some(&url), || {
            let response = self.session.request(method, &url, None, Some(&payload))?;
            let (raw_items, loaded) = match response.body {
                None => (extract_items_from_list(&url, &payload)?, false),
                Some(body @ Value::Array(_)) => (extract_items_from_list(&url, &body)?, true),
                Some(body) => (extract_items(&def, &url, &body)?, true),
            };
            Ok(raw_items
                .into_iter()
                .map(|fields| self.make_item(fields, loaded))
                .collect())
        })
    }

    /// Fill the collection from a value already at hand, without a request
    pub(crate) fn preload(&mut self, payload: Value) -> Result<()> {
        let raw_items = if payload.is_array() {
            extract_items_from_list(&self.source_url, &payload)?
        } else {
            extract_items(&self.def, &self.source_url, &payload)?
        };
        self.items = raw_items
            .into_iter()
            .map(|fields| self.make_item(fields, false))
            .collect();
        self.offset = self.items.len();
        self.exhausted = true;
        self.raw_payload = Some(payload);
        Ok(())
    }

    fn make_item(&self, fields: Map<String, Value>, loaded: bool) -> LazyResource {
        let Some(item_def) = &self.item_def else {
            // Items without a resource of their own are complete as listed.
            return LazyResource::new(self.session.clone(), self.def.clone(), None, fields, true);
        };

        let url = match &self.locator {
            ItemLocator::Segment { base } => item_def
                .primary_key
                .as_deref()
                .and_then(|pk| fields.get(pk))
                .and_then(scalar_to_string)
                .map(|key| format!("{}/{}", base, urlencoding::encode(&key))),
            ItemLocator::Template { bound } => {
                item_def.url_from_fields(&self.session.base_url, &fields, bound)
            }
        };

        LazyResource::new(self.session.clone(), item_def.clone(), url, fields, loaded)
    }
}

/// Iterator over a collection, fetching batches as it goes.
///
/// Fused after the first error.
pub struct IntoIter {
    collection: ResourceCollection,
    position: usize,
    failed: bool,
}

impl Iterator for IntoIter {
    type Item = Result<LazyResource>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.collection.items.get(self.position) {
                self.position += 1;
                return Some(Ok(item.clone()));
            }
            if self.failed || self.collection.exhausted {
                return None;
            }
            if let Err(e) = self.collection.fetch_next_batch() {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }
}

impl IntoIterator for ResourceCollection {
    type Item = Result<LazyResource>;
    type IntoIter = IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            collection: self,
            position: 0,
            failed: false,
        }
    }
}

/// Pull the item list out of a collection response
fn extract_items(def: &ResourceDef, url: &str, body: &Value) -> Result<Vec<Map<String, Value>>> {
    let path = def.items_path.as_deref().unwrap_or("");
    match value_at(body, path) {
        Some(list @ Value::Array(_)) => extract_items_from_list(url, list),
        // An object under a named path is a map keyed by identity
        Some(Value::Object(map)) if !path.is_empty() => map
            .values()
            .cloned()
            .map(|item| as_object(url, item))
            .collect(),
        None | Some(Value::Null) if def.items_optional => Ok(Vec::new()),
        _ => Err(ClientError::MalformedResponse {
            url: url.to_string(),
            reason: if path.is_empty() {
                "expected a JSON list".to_string()
            } else {
                format!("expected a list at '{}'", path)
            },
        }),
    }
}

fn extract_items_from_list(url: &str, list: &Value) -> Result<Vec<Map<String, Value>>> {
    list.as_array()
        .into_iter()
        .flatten()
        .cloned()
        .map(|item| as_object(url, item))
        .collect()
}

fn as_object(url: &str, value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ClientError::MalformedResponse {
            url: url.to_string(),
            reason: format!("expected an object item, got {}", type_name(&other)),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
