//! Atlas API plumbing: the transport seam and the client entry point

pub mod client;
pub mod http;
pub mod memory;
pub mod transport;

pub use client::{Client, ClientBuilder};
pub use http::HttpTransport;
pub use memory::{MemoryTransport, RecordedCall};
pub use transport::{Method, QueryParams, RawResponse, Transport};
