//! # HTTP Transport
//!
//! Transport abstraction used by the dispatcher and every provider adapter.
//!
//! Production code injects [`ReqwestTransport`]; tests substitute a
//! recording fake so signed payload bytes and provider request shapes can be
//! asserted without network access.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Default per-request timeout when a caller does not override it
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Request / Response Types
// ============================================================================

/// HTTP methods the engine issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Get wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// A fully-described outbound HTTP request
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub basic_auth: Option<(String, String)>,
    pub timeout: Duration,
}

impl OutboundRequest {
    /// Create new request with the given method
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            basic_auth: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Create POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Create PUT request
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, url)
    }

    /// Create PATCH request
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, url)
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a bearer-token Authorization header
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token))
    }

    /// Use HTTP basic authentication
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((username.into(), password.into()));
        self
    }

    /// Attach a JSON body (sets Content-Type)
    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, TransportError> {
        let bytes = serde_json::to_vec(body).map_err(|e| TransportError::InvalidRequest {
            message: format!("JSON serialization failed: {}", e),
        })?;
        self.body = Some(Bytes::from(bytes));
        Ok(self.with_header("Content-Type", "application/json"))
    }

    /// Attach pre-serialized JSON bytes (sets Content-Type)
    ///
    /// Used by the dispatcher, which must sign and send the exact same byte
    /// sequence.
    pub fn with_json_bytes(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self.with_header("Content-Type", "application/json")
    }

    /// Attach a form-urlencoded body (sets Content-Type)
    pub fn with_form(mut self, params: &[(&str, &str)]) -> Self {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in params {
            serializer.append_pair(name, value);
        }
        self.body = Some(Bytes::from(serializer.finish().into_bytes()));
        self.with_header("Content-Type", "application/x-www-form-urlencoded")
    }

    /// Override the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Response to an outbound request
///
/// Non-2xx statuses are data, not errors; callers classify them.
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    pub status: u16,
    pub body: Bytes,
}

impl OutboundResponse {
    /// Create new response
    pub fn new(status: u16, body: Bytes) -> Self {
        Self { status, body }
    }

    /// Check for a 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body).map_err(|e| TransportError::InvalidResponse {
            message: format!("JSON deserialization failed: {}", e),
        })
    }

    /// Parse the body as a JSON value, tolerating empty bodies
    pub fn json_value(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }

    /// Body as lossy UTF-8 text
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Transport-level failures (the request never produced an HTTP status)
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Connection failed: {message}")]
    Connect { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Transport failure: {message}")]
    Other { message: String },
}

impl TransportError {
    /// Check if error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Connect { .. } => true,
            Self::Other { .. } => true,
            Self::InvalidRequest { .. } => false,
            Self::InvalidResponse { .. } => false,
        }
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Interface for issuing outbound HTTP requests
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute one request, returning the raw response
    ///
    /// Implementations must honor `request.timeout` and must not treat
    /// non-2xx statuses as errors.
    async fn execute(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError>;
}

// ============================================================================
// Reqwest Implementation
// ============================================================================

/// Production transport backed by a shared [`reqwest::Client`]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build the shared client
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("form-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Other {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if let Some((username, password)) = &request.basic_auth {
            builder = builder.basic_auth(username, Some(password));
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let timeout = request.timeout;
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout { timeout }
            } else if e.is_connect() {
                TransportError::Connect {
                    message: e.to_string(),
                }
            } else if e.is_builder() || e.is_request() {
                TransportError::InvalidRequest {
                    message: e.to_string(),
                }
            } else {
                TransportError::Other {
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| TransportError::Other {
            message: format!("failed to read response body: {}", e),
        })?;

        Ok(OutboundResponse::new(status, body))
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
