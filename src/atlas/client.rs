//! Atlas Client
//!
//! Entry point binding a [`ResourceRegistry`] to a [`Transport`]. Every
//! proxy it hands out shares the same transport, registry and event
//! subscribers.

use super::http::HttpTransport;
use super::transport::Transport;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{EventHub, EventHubBuilder, EventState, Operation, OperationEvent};
use crate::resource::{
    ItemLocator, LazyResource, Proxy, ResourceCollection, ResourceRegistry, Session, Shape,
};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Main Atlas client
#[derive(Debug, Clone)]
pub struct Client {
    session: Session,
}

impl Client {
    /// Create a client talking HTTP to `config.base_url`
    pub fn new(config: ClientConfig, registry: ResourceRegistry) -> Result<Self> {
        Self::builder(config).registry(registry).build()
    }

    /// Create a client over an explicit transport
    pub fn with_transport(
        config: ClientConfig,
        registry: ResourceRegistry,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        Self::builder(config)
            .registry(registry)
            .transport(transport)
            .build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.session.registry
    }

    pub fn base_url(&self) -> &str {
        &self.session.base_url
    }

    /// Build the proxy for a logical name.
    ///
    /// `path_args` fill the path template in order. For single resources,
    /// `initial` must be an object and seeds the snapshot; for collections it
    /// is taken as an already-received payload (a bare list or an object
    /// holding one) and no request will be made.
    pub fn construct(
        &self,
        name: &str,
        path_args: &[&str],
        initial: Option<Value>,
    ) -> Result<Proxy> {
        let def = self.session.def(name)?;
        let bound = def.bind_args(path_args)?;
        let url = def
            .url_for(&self.session.base_url, &bound)
            .ok_or_else(|| ClientError::Unaddressable {
                resource: def.name.clone(),
                key: "path".to_string(),
            })?;

        tracing::debug!(resource = name, url = %url, "Constructing proxy");

        match def.shape {
            Shape::Single => {
                let mut snapshot = match initial {
                    None => Map::new(),
                    Some(Value::Object(fields)) => fields,
                    Some(_) => {
                        return Err(ClientError::MalformedResponse {
                            url,
                            reason: "initial snapshot must be a JSON object".to_string(),
                        })
                    }
                };
                for (key, value) in def.seed_snapshot(&bound) {
                    snapshot.entry(key).or_insert(value);
                }
                Ok(Proxy::Resource(LazyResource::new(
                    self.session.clone(),
                    def,
                    Some(url),
                    snapshot,
                    false,
                )))
            }
            Shape::Collection => {
                let mut collection = ResourceCollection::new(
                    self.session.clone(),
                    def,
                    url,
                    Default::default(),
                    ItemLocator::Template { bound },
                )?;
                if let Some(payload) = initial {
                    collection.preload(payload)?;
                }
                Ok(Proxy::Collection(collection))
            }
        }
    }

    /// Single-resource proxy for a logical name
    pub fn resource(&self, name: &str, path_args: &[&str]) -> Result<LazyResource> {
        self.construct(name, path_args, None)?
            .into_resource()
            .ok_or_else(|| ClientError::Unsupported {
                resource: name.to_string(),
                operation: "resource",
            })
    }

    /// Collection proxy for a logical name
    pub fn collection(&self, name: &str, path_args: &[&str]) -> Result<ResourceCollection> {
        self.construct(name, path_args, None)?
            .into_collection()
            .ok_or_else(|| ClientError::Unsupported {
                resource: name.to_string(),
                operation: "collection",
            })
    }

    // =========================================================================
    // Entities
    // =========================================================================

    pub fn entity_guid(&self, guid: &str) -> Result<LazyResource> {
        self.resource("entity_guid", &[guid])
    }

    /// Entity identified by a unique attribute, e.g. `qualifiedName`
    pub fn entity_unique_attribute(
        &self,
        type_name: &str,
        attribute: &str,
        value: &str,
    ) -> Result<LazyResource> {
        Ok(self
            .resource("entity_unique_attribute", &[type_name])?
            .with_param(format!("attr:{}", attribute), value))
    }

    /// Several entities in one request (`entity/bulk?guid=..&guid=..`)
    pub fn entity_bulk(&self, guids: &[&str]) -> Result<ResourceCollection> {
        ResourceCollection::with_repeated_param(self.session.clone(), "entity_bulk", "guid", guids)
    }

    pub fn relationship(&self) -> Result<ResourceCollection> {
        self.collection("relationship", &[])
    }

    pub fn relationship_guid(&self, guid: &str) -> Result<LazyResource> {
        self.resource("relationship_guid", &[guid])
    }

    /// Lineage graph; `direction` is INPUT, OUTPUT or BOTH
    pub fn lineage(&self, guid: &str, direction: &str, depth: u32) -> Result<LazyResource> {
        Ok(self
            .resource("lineage_guid", &[guid])?
            .with_param("direction", direction)
            .with_param("depth", depth.to_string()))
    }

    // =========================================================================
    // Type definitions
    // =========================================================================

    pub fn typedefs(&self) -> Result<LazyResource> {
        self.resource("typedefs", &[])
    }

    pub fn typedef_name(&self, name: &str) -> Result<LazyResource> {
        self.resource("typedef_name", &[name])
    }

    // =========================================================================
    // Search
    // =========================================================================

    fn search(&self, name: &str, params: &[(&str, &str)]) -> Result<ResourceCollection> {
        self.collection(name, &[])?
            .with_params(params.iter().map(|(k, v)| (*k, *v)))
    }

    pub fn search_basic(&self, params: &[(&str, &str)]) -> Result<ResourceCollection> {
        self.search("search_basic", params)
    }

    pub fn search_dsl(&self, query: &str) -> Result<ResourceCollection> {
        self.search("search_dsl", &[("query", query)])
    }

    pub fn search_fulltext(&self, query: &str) -> Result<ResourceCollection> {
        self.search("search_fulltext", &[("query", query)])
    }

    pub fn search_attribute(&self, params: &[(&str, &str)]) -> Result<ResourceCollection> {
        self.search("search_attribute", params)
    }

    // =========================================================================
    // Glossary
    // =========================================================================

    pub fn glossaries(&self) -> Result<ResourceCollection> {
        self.collection("glossary", &[])
    }

    pub fn glossary(&self, guid: &str) -> Result<LazyResource> {
        self.resource("glossary_guid", &[guid])
    }

    pub fn glossary_term(&self, guid: &str) -> Result<LazyResource> {
        self.resource("glossary_term", &[guid])
    }

    pub fn glossary_category(&self, guid: &str) -> Result<LazyResource> {
        self.resource("glossary_category", &[guid])
    }

    /// Create one term; `data` must carry its glossary `anchor`
    pub fn create_glossary_term(&self, data: Value) -> Result<LazyResource> {
        self.collection("glossary_term_new", &[])?.create(data)
    }

    /// Create one category; `data` must carry its glossary `anchor`
    pub fn create_glossary_category(&self, data: Value) -> Result<LazyResource> {
        self.collection("glossary_category_new", &[])?.create(data)
    }

    // =========================================================================
    // Admin
    // =========================================================================

    pub fn admin_metrics(&self) -> Result<LazyResource> {
        self.resource("admin_metrics", &[])
    }
}

/// Builder for [`Client`], for swapping the transport or subscribing to
/// operation events
pub struct ClientBuilder {
    config: ClientConfig,
    registry: Option<ResourceRegistry>,
    transport: Option<Arc<dyn Transport>>,
    events: EventHubBuilder,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            registry: None,
            transport: None,
            events: EventHub::builder(),
        }
    }

    /// Use this registry instead of the built-in one
    pub fn registry(mut self, registry: ResourceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use this transport instead of HTTP
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Receive operation events. `None` matches anything.
    pub fn subscribe<F>(
        mut self,
        resource: Option<&str>,
        operation: Option<Operation>,
        state: Option<EventState>,
        callback: F,
    ) -> Self
    where
        F: Fn(&OperationEvent) + Send + Sync + 'static,
    {
        self.events = self.events.subscribe(resource, operation, state, callback);
        self
    }

    pub fn build(self) -> Result<Client> {
        self.config.validate()?;

        let registry = match self.registry {
            Some(registry) => registry,
            None => ResourceRegistry::builtin()?,
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config)?),
        };

        tracing::debug!(
            base_url = %self.config.base_url,
            resources = registry.len(),
            "Atlas client ready"
        );

        Ok(Client {
            session: Session::new(
                transport,
                Arc::new(registry),
                self.config.trimmed_base_url(),
                self.events.build(),
                self.config.server_version.clone(),
            ),
        })
    }
}
