//! Shared state behind every proxy created by one client

use super::registry::{ResourceDef, ResourceRegistry};
use crate::atlas::{Method, QueryParams, RawResponse, Transport};
use crate::error::{ClientError, Result};
use crate::events::EventHub;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Transport, registry and event hub, cloned into each proxy.
///
/// Proxies keep their own snapshots; nothing in here is mutated after the
/// client is built.
#[derive(Clone)]
pub struct Session {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registry: Arc<ResourceRegistry>,
    pub(crate) base_url: String,
    pub(crate) events: EventHub,
    pub(crate) server_version: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("resources", &self.registry.len())
            .field("server_version", &self.server_version)
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<ResourceRegistry>,
        base_url: impl Into<String>,
        events: EventHub,
        server_version: Option<String>,
    ) -> Self {
        Self {
            transport,
            registry,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            events,
            server_version,
        }
    }

    /// Resolve a logical name, refusing resources the server is too old for
    pub(crate) fn def(&self, name: &str) -> Result<Arc<ResourceDef>> {
        let def = self.registry.resolve(name)?;
        def.check_version(self.server_version.as_deref())?;
        Ok(def)
    }

    /// Perform a request; non-2xx answers become [`ClientError::Server`]
    pub(crate) fn request(
        &self,
        method: Method,
        url: &str,
        params: Option<&QueryParams>,
        data: Option<&Value>,
    ) -> Result<RawResponse> {
        let response = self.transport.perform_request(method, url, params, data)?;
        if !response.is_success() {
            return Err(ClientError::Server {
                status: response.status,
                message: response.error_message(),
            });
        }
        Ok(response)
    }
}

/// Follow a dot path into a JSON value; the empty path is the value itself
pub(crate) fn value_at<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, part| match part.parse::<usize>() {
        Ok(idx) if current.is_array() => current.get(idx),
        _ => current.get(part),
    })
}
