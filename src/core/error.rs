use std::time::Duration;

use hyper::StatusCode;
use thiserror::Error;

use crate::ports::http_client::HttpClientError;

/// Per-request failures. None of these is fatal: each one becomes a well-formed
/// response for the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("No route matches path {path}")]
    NoRouteMatch { path: String },

    #[error("Upstream {target} is unreachable: {reason}")]
    UpstreamUnreachable { target: String, reason: String },

    #[error("Upstream {target} did not respond within {}s", .timeout.as_secs_f64())]
    UpstreamTimeout { target: String, timeout: Duration },

    #[error("Upstream {target} sent an invalid response: {reason}")]
    UpstreamProtocolError { target: String, reason: String },
}

impl ProxyError {
    /// Classify a transport failure for the given target.
    pub fn from_client_error(target: &str, error: HttpClientError) -> Self {
        let target = target.to_string();
        match error {
            HttpClientError::Unreachable(reason) => ProxyError::UpstreamUnreachable { target, reason },
            HttpClientError::Timeout(timeout) => ProxyError::UpstreamTimeout { target, timeout },
            HttpClientError::Protocol(reason) | HttpClientError::InvalidRequest(reason) => {
                ProxyError::UpstreamProtocolError { target, reason }
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::NoRouteMatch { .. } => StatusCode::NOT_FOUND,
            ProxyError::UpstreamUnreachable { .. }
            | ProxyError::UpstreamTimeout { .. }
            | ProxyError::UpstreamProtocolError { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Attempted target URL, for upstream failures.
    pub fn target(&self) -> Option<&str> {
        match self {
            ProxyError::NoRouteMatch { .. } => None,
            ProxyError::UpstreamUnreachable { target, .. }
            | ProxyError::UpstreamTimeout { target, .. }
            | ProxyError::UpstreamProtocolError { target, .. } => Some(target),
        }
    }

    /// Underlying failure reason without the target prefix.
    pub fn reason(&self) -> String {
        match self {
            ProxyError::NoRouteMatch { path } => format!("No route matches path {path}"),
            ProxyError::UpstreamUnreachable { reason, .. }
            | ProxyError::UpstreamProtocolError { reason, .. } => reason.clone(),
            ProxyError::UpstreamTimeout { timeout, .. } => format!(
                "Timed out after {}s waiting for the upstream response",
                timeout.as_secs_f64()
            ),
        }
    }

    /// Short machine-friendly label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::NoRouteMatch { .. } => "no_route_match",
            ProxyError::UpstreamUnreachable { .. } => "upstream_unreachable",
            ProxyError::UpstreamTimeout { .. } => "upstream_timeout",
            ProxyError::UpstreamProtocolError { .. } => "upstream_protocol_error",
        }
    }
}
