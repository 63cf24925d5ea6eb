use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

use crate::core::backend::BackendUrl;

/// Custom error type for HTTP client operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HttpClientError {
    /// The connection could not be established (refused, DNS failure, TLS handshake).
    #[error("Connection error: {0}")]
    Unreachable(String),

    /// No response head arrived before the deadline.
    #[error("Timed out after {}s waiting for the upstream response", .0.as_secs_f64())]
    Timeout(Duration),

    /// The upstream answered with something that is not valid HTTP, or closed early.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The outgoing request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for making HTTP requests to backends
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send an already rewritten request to `target` and return the streaming response.
    ///
    /// Implementations must bound the call with a timeout and must not retry.
    async fn send_request(
        &self,
        target: &BackendUrl,
        req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>>;
}
