//! HTTP transport for Atlas REST API calls

use super::transport::{Method, QueryParams, RawResponse, Transport};
use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// Decode a response body; empty bodies become `None`, non-JSON text is kept
/// as a JSON string so error messages survive
fn decode_body(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

/// Blocking HTTP transport with basic auth
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    username: Option<String>,
    password: Option<String>,
}

impl HttpTransport {
    /// Create a new transport from client configuration
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.tls_verify)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn to_reqwest(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl Transport for HttpTransport {
    fn perform_request(
        &self,
        method: Method,
        url: &str,
        params: Option<&QueryParams>,
        data: Option<&Value>,
    ) -> Result<RawResponse, TransportError> {
        let request_id = Uuid::new_v4().to_string();
        let start = Instant::now();

        tracing::debug!(
            method = %method,
            url = %url,
            request_id = %request_id,
            "Sending request"
        );

        let mut request = self
            .client
            .request(Self::to_reqwest(method), url)
            .header(REQUEST_ID_HEADER, request_id.as_str());

        if let Some(params) = params.filter(|p| !p.is_empty()) {
            request = request.query(params);
        }
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }
        if let Some(body) = data {
            request = request.json(body);
        }

        let response = request.send()?;
        let status = response.status().as_u16();
        let text = response.text()?;

        tracing::debug!(
            method = %method,
            url = %url,
            status = status,
            duration_ms = %start.elapsed().as_millis(),
            request_id = %request_id,
            "Received response"
        );

        if !(200..300).contains(&status) {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::warn!(
                method = %method,
                url = %url,
                status = status,
                request_id = %request_id,
                body = %sanitize_for_log(&text),
                "Request failed"
            );
        }

        Ok(RawResponse::new(status, decode_body(&text)))
    }
}
