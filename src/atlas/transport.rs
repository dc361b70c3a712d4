//! Transport abstraction
//!
//! The lazy resource model only needs one capability from the network layer:
//! send a request, get back a status and a decoded JSON body. Everything else
//! (auth, TLS, timeouts) belongs to the implementation.

use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Query parameters, kept sorted so URLs and logs are deterministic
pub type QueryParams = BTreeMap<String, String>;

/// HTTP methods used by the catalog API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response that made it back from the server, whatever its status
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// Decoded JSON body; `None` when the server sent nothing
    pub body: Option<Value>,
}

impl RawResponse {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self { status, body }
    }

    /// 200 with a JSON body
    pub fn ok(body: Value) -> Self {
        Self::new(200, Some(body))
    }

    /// 204 with no body
    pub fn no_content() -> Self {
        Self::new(204, None)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Best-effort error message from a structured error body.
    ///
    /// Atlas reports `{"errorCode": "...", "errorMessage": "..."}`; other
    /// proxies in front of it tend to use `message` or `error`.
    pub fn error_message(&self) -> String {
        let from_body = self.body.as_ref().and_then(|body| {
            ["errorMessage", "message", "error"]
                .iter()
                .find_map(|key| body.get(*key))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
        });

        from_body.unwrap_or_else(|| match &self.body {
            Some(Value::String(s)) => s.clone(),
            _ => format!("HTTP {}", self.status),
        })
    }
}

/// The request capability the lazy resource model is built on.
///
/// Implementations block the calling thread until the request completes,
/// fails or times out. They must not retry on their own behalf unless that is
/// an explicit policy of the implementation; the resource layer never retries.
pub trait Transport: Send + Sync {
    fn perform_request(
        &self,
        method: Method,
        url: &str,
        params: Option<&QueryParams>,
        data: Option<&Value>,
    ) -> Result<RawResponse, TransportError>;
}
