//! Resource abstraction layer
//!
//! This module provides the lazy resource model: local proxies for remote
//! catalog resources that fetch only when a field they do not hold is asked for.
//! Resource definitions are loaded from JSON files at compile time, so new
//! endpoints can be added without code changes.
//!
//! # Architecture
//!
//! - [`registry`] - Parses resource definitions from embedded JSON
//! - [`LazyResource`] - Proxy for one resource (snapshot, refresh, update, delete)
//! - [`ResourceCollection`] - Paginated, lazily populated list of proxies
//! - [`RelationshipAccessor`] - Named link from a resource to related resources
//! - [`types`] - Optional typed views over snapshots
//!
//! # Resource Definitions
//!
//! Resources are defined in JSON files under `src/resources/`:
//! - `entity.json` - Entities, classifications, relationships, lineage
//! - `typedefs.json` - Type definitions
//! - `search.json` - Basic, DSL, full-text, attribute and relationship search
//! - `glossary.json` - Glossaries, terms, categories
//! - `admin.json` - Admin API (metrics, version, status)
//!
//! # Example
//!
//! ```no_run
//! use atlasclient::{Client, ClientConfig, ResourceRegistry};
//!
//! fn owner(guid: &str) -> atlasclient::Result<serde_json::Value> {
//!     let config = ClientConfig::builder("http://localhost:21000")
//!         .basic_auth("admin", "admin")
//!         .build()?;
//!     let client = Client::new(config, ResourceRegistry::builtin()?)?;
//!     let mut entity = client.entity_guid(guid)?;
//!     entity.get_value("attributes")
//! }
//! ```

mod collection;
mod lazy;
mod relation;
pub mod registry;
mod session;
pub mod types;

pub use collection::{IntoIter, ResourceCollection};
pub(crate) use collection::ItemLocator;
pub use lazy::{FieldValue, LazyResource, PollStatus};
pub use registry::{ResourceDef, ResourceKind, ResourceRegistry, Shape};
pub use relation::RelationshipAccessor;
pub(crate) use session::Session;

/// What constructing a logical name yields
#[derive(Debug, Clone)]
pub enum Proxy {
    Resource(LazyResource),
    Collection(ResourceCollection),
}

impl Proxy {
    pub fn into_resource(self) -> Option<LazyResource> {
        match self {
            Proxy::Resource(resource) => Some(resource),
            Proxy::Collection(_) => None,
        }
    }

    pub fn into_collection(self) -> Option<ResourceCollection> {
        match self {
            Proxy::Collection(collection) => Some(collection),
            Proxy::Resource(_) => None,
        }
    }

    /// Logical resource name
    pub fn name(&self) -> &str {
        match self {
            Proxy::Resource(resource) => resource.name(),
            Proxy::Collection(collection) => collection.name(),
        }
    }
}
