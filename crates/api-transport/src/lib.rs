//! Transport seam for the authenticated API client
//!
//! Defines the `Transport` trait that the auth pipeline drives. The pipeline
//! never talks to reqwest directly: it builds an `ApiRequest`, hands it to a
//! transport and inspects the `ApiResponse`. `ReqwestTransport` is the real
//! implementation; tests substitute scripted transports.
//!
//! A response with any HTTP status is a successful transport result. Only
//! network-level failures (connect, timeout, malformed request) surface as
//! `TransportError`, and the pipeline passes those through untouched.

pub mod request;
pub mod response;
pub mod reqwest_transport;

pub use request::ApiRequest;
pub use reqwest_transport::ReqwestTransport;
pub use response::ApiResponse;

pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, StatusCode};

use std::future::Future;
use std::pin::Pin;

/// Network-level failures. HTTP error statuses are not transport errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Boxed future returned by `Transport::send`.
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;

/// Sends a fully prepared request and returns the raw response.
///
/// Implementations must not add authentication headers or retry on their
/// own; that is the pipeline's job. Uses `Pin<Box<dyn Future>>` so the
/// transport can be shared as `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    /// Base URL relative request paths are resolved against (used in diagnostics).
    fn base_url(&self) -> &str;

    /// Send one request. Exactly one network exchange per call.
    fn send<'a>(&'a self, request: &'a ApiRequest) -> SendFuture<'a>;
}
