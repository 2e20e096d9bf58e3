//! HTTP client for the coordinator backend.
//!
//! Implements [`BackendTransport`](super::BackendTransport) using `reqwest`,
//! with optional request rate limiting and bounded retries for requests that
//! are safe to repeat.

mod client;
mod connection;

pub use client::{HttpTransport, HttpTransportConfig};
