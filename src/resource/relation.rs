//! Relationship accessors
//!
//! A relation is reached by appending a path segment to the parent's URL, or
//! by filling the target's own path template from the parent's fields when
//! the server files it elsewhere. Accessors never cache: every [`RelationshipAccessor::resolve`] builds new,
//! unfetched proxies, so traversing a relation twice fetches twice.

use super::collection::{ItemLocator, ResourceCollection};
use super::lazy::LazyResource;
use super::registry::{RelationDef, Shape};
use super::session::Session;
use super::Proxy;
use crate::error::{ClientError, Result};
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct RelationshipAccessor {
    session: Session,
    parent: String,
    relation: RelationDef,
    parent_url: String,
    url: String,
    preloaded: Option<Value>,
}

impl RelationshipAccessor {
    pub(crate) fn new(
        session: Session,
        parent: String,
        relation: RelationDef,
        parent_url: String,
        url: String,
        preloaded: Option<Value>,
    ) -> Self {
        Self {
            session,
            parent,
            relation,
            parent_url,
            url,
            preloaded,
        }
    }

    pub fn name(&self) -> &str {
        &self.relation.name
    }

    /// Logical name of what the relation resolves to
    pub fn target(&self) -> &str {
        &self.relation.target
    }

    /// URL of the related resource or collection
    pub fn url(&self) -> String {
        self.url.clone()
    }

    /// Build a fresh proxy for the related resource or collection.
    ///
    /// No request is made here; the proxy fetches on first use.
    pub fn resolve(&self) -> Result<Proxy> {
        let def = self.session.def(&self.relation.target)?;
        match def.shape {
            Shape::Single => Ok(Proxy::Resource(LazyResource::new(
                self.session.clone(),
                def,
                Some(self.url()),
                Map::new(),
                false,
            ))),
            Shape::Collection => Ok(Proxy::Collection(ResourceCollection::new(
                self.session.clone(),
                def,
                self.url(),
                Default::default(),
                self.item_locator(),
            )?)),
        }
    }

    /// Unfetched proxy for one related item, addressed by its key
    pub fn resolve_one(&self, key: &str) -> Result<LazyResource> {
        self.collection("resolve_one")?.get(key)
    }

    /// Post a list of items to the relation and return proxies for them
    pub fn create(&self, items: Vec<Value>) -> Result<Vec<LazyResource>> {
        self.collection("create")?.create_bulk(items)
    }

    /// Proxy over the value the parent snapshot already held under the
    /// relation name, without a request
    pub fn preloaded(&self) -> Result<Option<Proxy>> {
        let Some(value) = self.preloaded.clone() else {
            return Ok(None);
        };
        let def = self.session.def(&self.relation.target)?;
        match def.shape {
            Shape::Single => {
                let Value::Object(fields) = value else {
                    return Err(ClientError::MalformedResponse {
                        url: self.url(),
                        reason: format!("preloaded '{}' is not an object", self.relation.name),
                    });
                };
                Ok(Some(Proxy::Resource(LazyResource::new(
                    self.session.clone(),
                    def,
                    Some(self.url()),
                    fields,
                    true,
                ))))
            }
            Shape::Collection => {
                let mut collection = ResourceCollection::new(
                    self.session.clone(),
                    def,
                    self.url(),
                    Default::default(),
                    self.item_locator(),
                )?;
                collection.preload(value)?;
                Ok(Some(Proxy::Collection(collection)))
            }
        }
    }

    fn collection(&self, operation: &'static str) -> Result<ResourceCollection> {
        match self.resolve()? {
            Proxy::Collection(collection) => Ok(collection),
            Proxy::Resource(_) => Err(ClientError::Unsupported {
                resource: format!("{}.{}", self.parent, self.relation.name),
                operation,
            }),
        }
    }

    fn item_locator(&self) -> ItemLocator {
        match &self.relation.item_segment {
            Some(segment) => ItemLocator::Segment {
                base: format!("{}/{}", self.parent_url, segment),
            },
            None => ItemLocator::Template { bound: Vec::new() },
        }
    }
}
