//! In-memory transport
//!
//! Serves scripted responses keyed by method and URL and records every call,
//! so request counts can be asserted. Useful for tests and offline fixtures.

use super::transport::{Method, QueryParams, RawResponse, Transport};
use crate::error::TransportError;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// A request observed by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub params: QueryParams,
    pub data: Option<Value>,
}

#[derive(Debug, Clone)]
enum Reply {
    Response(RawResponse),
    Timeout,
    Connect(String),
}

/// Scripted transport.
///
/// Replies queued for a route are served in order; the last one is repeated
/// once the queue is down to a single entry. Unscripted routes answer 404.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `method url`
    pub fn respond(&self, method: Method, url: &str, response: RawResponse) -> &Self {
        self.push(method, url, Reply::Response(response))
    }

    /// Queue a 200 JSON response for `method url`
    pub fn respond_json(&self, method: Method, url: &str, body: Value) -> &Self {
        self.respond(method, url, RawResponse::ok(body))
    }

    /// Queue a timeout for `method url`
    pub fn fail_timeout(&self, method: Method, url: &str) -> &Self {
        self.push(method, url, Reply::Timeout)
    }

    /// Queue a connection failure for `method url`
    pub fn fail_connect(&self, method: Method, url: &str, reason: &str) -> &Self {
        self.push(method, url, Reply::Connect(reason.to_string()))
    }

    fn push(&self, method: Method, url: &str, reply: Reply) -> &Self {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        routes
            .entry((method, url.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Total number of calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of calls made to `method url`
    pub fn count(&self, method: Method, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.method == method && c.url == url)
            .count()
    }
}

impl Transport for MemoryTransport {
    fn perform_request(
        &self,
        method: Method,
        url: &str,
        params: Option<&QueryParams>,
        data: Option<&Value>,
    ) -> Result<RawResponse, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                method,
                url: url.to_string(),
                params: params.cloned().unwrap_or_default(),
                data: data.cloned(),
            });

        let reply = {
            let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
            match routes.get_mut(&(method, url.to_string())) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Timeout) => Err(TransportError::Timeout),
            Some(Reply::Connect(reason)) => Err(TransportError::Connect(reason)),
            None => Ok(RawResponse::new(
                404,
                Some(serde_json::json!({
                    "errorCode": "ATLAS-404-00-000",
                    "errorMessage": format!("no route for {method} {url}")
                })),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_replies_in_order_then_repeats_last() {
        let transport = MemoryTransport::new();
        transport
            .respond_json(Method::Get, "http://x/a", json!({"n": 1}))
            .respond_json(Method::Get, "http://x/a", json!({"n": 2}));

        let first = transport.perform_request(Method::Get, "http://x/a", None, None).unwrap();
        let second = transport.perform_request(Method::Get, "http://x/a", None, None).unwrap();
        let third = transport.perform_request(Method::Get, "http://x/a", None, None).unwrap();

        assert_eq!(first.body, Some(json!({"n": 1})));
        assert_eq!(second.body, Some(json!({"n": 2})));
        assert_eq!(third.body, Some(json!({"n": 2})));
        assert_eq!(transport.count(Method::Get, "http://x/a"), 3);
    }

    #[test]
    fn test_unscripted_route_is_404() {
        let transport = MemoryTransport::new();
        let response = transport
            .perform_request(Method::Delete, "http://x/missing", None, None)
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn test_scripted_timeout() {
        let transport = MemoryTransport::new();
        transport.fail_timeout(Method::Get, "http://x/slow");
        let err = transport
            .perform_request(Method::Get, "http://x/slow", None, None)
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
    }
}
