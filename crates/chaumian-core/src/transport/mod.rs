//! Backend transport abstraction layer.
//!
//! Defines the [`BackendTransport`] trait used by every client in this crate
//! and provides an HTTP implementation ([`HttpTransport`]) plus a test mock
//! (`mock::MockTransport`).

mod http_adapter;
#[cfg(test)]
pub mod mock;

pub use http_adapter::{HttpTransport, HttpTransportConfig};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, RemoteError};

// ==============================================================================
// Request / Response
// ==============================================================================

/// One backend call: method, path relative to the backend root (including
/// the query string), and an optional JSON body.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    /// Lets the transport abandon the call once the caller gives up.
    pub cancel: Option<CancellationToken>,
}

impl BackendRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
            cancel: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
            cancel: None,
        }
    }

    /// POST with `payload` serialized as the JSON body.
    pub fn post_json<T: Serialize>(path: impl Into<String>, payload: &T) -> Result<Self, CoreError> {
        let body = serde_json::to_value(payload).map_err(|e| CoreError::Encode(e.to_string()))?;
        Ok(Self::post(path, body))
    }

    pub fn with_cancel(mut self, cancel: &CancellationToken) -> Self {
        self.cancel = Some(cancel.clone());
        self
    }
}

/// Status and raw body of a backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub body: String,
}

impl BackendResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        serde_json::from_str(&self.body).map_err(|e| {
            CoreError::InvalidResponse(format!("decode backend response: {e}; body={}", self.body))
        })
    }

    /// Return `self` if the status is `expected`, otherwise the backend
    /// failure it describes.
    pub fn expect_status(self, expected: StatusCode) -> Result<Self, CoreError> {
        if self.status == expected {
            Ok(self)
        } else {
            Err(self.into_remote_error())
        }
    }

    pub fn into_remote_error(self) -> CoreError {
        let detail = error_detail(self.status, &self.body);
        CoreError::Remote(RemoteError {
            status: self.status,
            detail,
        })
    }
}

/// Extract a human-readable failure detail from a response body.
///
/// The backend reports errors either as a bare JSON string, as an object with
/// an `error` or `message` field, or as plain text. An empty body falls back
/// to the status reason phrase.
fn error_detail(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("no detail provided")
            .to_owned();
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::String(message)) => message,
        Ok(serde_json::Value::Object(fields)) => ["error", "message", "Message"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(serde_json::Value::as_str))
            .map(str::to_owned)
            .unwrap_or_else(|| trimmed.to_owned()),
        _ => trimmed.to_owned(),
    }
}

// ==============================================================================
// Transport Trait
// ==============================================================================

/// Minimal request/response channel to the coordinator backend.
///
/// Implementations own connection handling, anonymization, and timeouts.
/// Any response that arrives is returned as `Ok`, whatever its status; `Err`
/// is reserved for failures below the HTTP status level.
#[async_trait]
pub trait BackendTransport: Send + Sync {
    /// Send the request exactly once.
    async fn send(&self, request: BackendRequest) -> Result<BackendResponse, CoreError>;

    /// Send a request that is safe to repeat. Implementations may retry
    /// transient failures; the default sends once.
    async fn send_and_retry(&self, request: BackendRequest) -> Result<BackendResponse, CoreError> {
        self.send(request).await
    }
}
