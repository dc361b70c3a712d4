//! Lazy, object-style client for the Apache Atlas metadata catalog.
//!
//! Resources are local proxies over the REST API: constructing one costs
//! nothing, and a request is only made when a field is asked for that the
//! proxy does not hold yet.
//!
//! ```no_run
//! use atlasclient::{Client, ClientConfig, ResourceRegistry};
//!
//! # fn main() -> atlasclient::Result<()> {
//! let config = ClientConfig::builder("http://localhost:21000")
//!     .basic_auth("admin", "admin")
//!     .build()?;
//! let client = Client::new(config, ResourceRegistry::builtin()?)?;
//!
//! for entity in client.search_dsl("hive_table where name = 'orders'")? {
//!     let mut entity = entity?;
//!     println!("{}", entity.get_value("typeName")?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod atlas;
pub mod config;
pub mod error;
pub mod events;
pub mod resource;

pub use atlas::{Client, ClientBuilder, HttpTransport, MemoryTransport, Method, RawResponse, Transport};
pub use config::ClientConfig;
pub use error::{ClientError, Result, TransportError};
pub use events::{EventState, Operation, OperationEvent};
pub use resource::{
    FieldValue, LazyResource, PollStatus, Proxy, RelationshipAccessor, ResourceCollection,
    ResourceRegistry,
};
