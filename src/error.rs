//! Error types for the Atlas client.

use std::time::Duration;

/// Network-level failures raised by a [`Transport`](crate::atlas::Transport).
///
/// These never carry an HTTP status: a response that arrived, whatever its
/// status, is a [`RawResponse`](crate::atlas::RawResponse), not an error.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established (DNS, refused, TLS handshake)
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request did not complete within the transport's timeout
    #[error("request timed out")]
    Timeout,

    /// The response body could not be read
    #[error("failed to read response body: {0}")]
    Body(String),

    /// Anything else the HTTP stack reported
    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Errors that can occur when using the Atlas client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Network/timeout failure, surfaced unchanged
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Non-2xx response from the server
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Error message extracted from the response body
        message: String,
    },

    /// Field absent after a refresh (or absent from an already loaded snapshot)
    #[error("field '{field}' not found on {resource}")]
    FieldNotFound { resource: String, field: String },

    /// Response shape does not match the resource or collection definition
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// Logical name not present in the registry
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// Operation attempted on a resource already deleted through this proxy
    #[error("resource at {url} has been deleted")]
    DeletedResource { url: String },

    /// Server accepted an update but returned a body that is not a resource
    #[error("ambiguous update response ({status}) from {url}")]
    AmbiguousUpdate { status: u16, url: String },

    /// No URL could be derived for the resource (no href and no identity key)
    #[error("cannot determine URL for {resource}: missing '{key}'")]
    Unaddressable { resource: String, key: String },

    /// Wrong number of path arguments for a path template
    #[error("{resource} expects {expected} path argument(s), got {got}")]
    PathArguments {
        resource: String,
        expected: usize,
        got: usize,
    },

    /// Resource was added in a newer server version than the one configured
    #[error("{resource} requires server version {required}, connected to {actual}")]
    UnsupportedVersion {
        resource: String,
        required: String,
        actual: String,
    },

    /// Relation name not declared on the resource definition
    #[error("{resource} has no relation '{relation}'")]
    UnknownRelation { resource: String, relation: String },

    /// Operation not declared on the resource definition
    #[error("{resource} does not support {operation}")]
    Unsupported {
        resource: String,
        operation: &'static str,
    },

    /// Embedded resource definitions failed to parse or cross-reference
    #[error("registry error: {0}")]
    Registry(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Polling gave up before the resource reached the expected state
    #[error("polling {url} timed out after {timeout:?}")]
    PollTimeout { url: String, timeout: Duration },

    /// Polling observed a failed terminal state
    #[error("resource at {url} reached a failed state")]
    PollFailed { url: String },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Returns true for failures a caller may reasonably retry.
    ///
    /// The client itself never retries.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(TransportError::Timeout | TransportError::Connect(_)) => true,
            ClientError::Server { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// HTTP status for server errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Server { status, .. } | ClientError::AmbiguousUpdate { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// True when the server answered 404.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(ClientError::Transport(TransportError::Timeout).is_transient());

        let unavailable = ClientError::Server {
            status: 503,
            message: "Service unavailable".to_string(),
        };
        assert!(unavailable.is_transient());

        let throttled = ClientError::Server {
            status: 429,
            message: "slow down".to_string(),
        };
        assert!(throttled.is_transient());

        let missing = ClientError::FieldNotFound {
            resource: "entity_guid".to_string(),
            field: "owner".to_string(),
        };
        assert!(!missing.is_transient());
    }

    #[test]
    fn test_status_extraction() {
        let not_found = ClientError::Server {
            status: 404,
            message: "Given instance guid abc is invalid/not found".to_string(),
        };
        assert_eq!(not_found.status(), Some(404));
        assert!(not_found.is_not_found());

        let unknown = ClientError::UnknownResource("nope".to_string());
        assert_eq!(unknown.status(), None);
    }
}
