//! Request rewrite and relay.
//!
//! `ForwardingEngine::forward` turns one inbound request plus its
//! [`Resolution`] into exactly one outbound call and reports a tagged
//! [`ForwardOutcome`]: the rewrite is the pre-send stage, `Relayed` is the
//! post-receive stage and `Failed` is the failure stage. The caller decides how
//! a failure is rendered. The engine keeps no per-request state of its own.
use std::{net::SocketAddr, sync::Arc};

use axum::body::Body as AxumBody;
use hyper::{
    HeaderMap, Request, Response, Uri,
    header::{self, HeaderName, HeaderValue},
};
use tracing::Instrument;

use crate::{
    core::{error::ProxyError, route_table::Resolution},
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
    tracing_setup,
};

/// Connection-scoped headers that must not cross the proxy.
pub const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Outcome of a single forwarding attempt.
#[derive(Debug)]
pub enum ForwardOutcome {
    /// The upstream answered; its response is relayed as-is (body still streaming).
    Relayed(Response<AxumBody>),
    /// The upstream could not be reached or answered badly.
    Failed(ProxyError),
}

#[derive(Clone)]
pub struct ForwardingEngine {
    client: Arc<dyn HttpClient>,
}

impl ForwardingEngine {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }

    /// Forward `req` to the target chosen by `resolution`. Never retries.
    pub async fn forward(
        &self,
        req: Request<AxumBody>,
        resolution: Resolution<'_>,
        client_addr: Option<SocketAddr>,
    ) -> ForwardOutcome {
        let target = resolution.target();
        let method = req.method().clone();
        let original_path = req.uri().path().to_string();

        let outbound = match Self::rewrite_request(req, &resolution, client_addr) {
            Ok(outbound) => outbound,
            Err(e) => {
                let error = ProxyError::from_client_error(target.as_str(), e);
                tracing::error!(
                    method = %method,
                    path = %original_path,
                    upstream = %target,
                    reason = %error.reason(),
                    "Failed to build upstream request"
                );
                return ForwardOutcome::Failed(error);
            }
        };

        tracing::info!(
            method = %method,
            path = %original_path,
            matched_prefix = resolution.matched_prefix().unwrap_or("<fallback>"),
            upstream = %target,
            upstream_uri = %outbound.uri(),
            "Forwarding request"
        );

        let span = tracing_setup::create_backend_span(
            target.as_str(),
            method.as_str(),
            resolution.upstream_path(),
        );
        match self
            .client
            .send_request(target, outbound)
            .instrument(span.clone())
            .await
        {
            Ok(mut response) => {
                span.record("http.status_code", response.status().as_u16());
                strip_hop_by_hop(response.headers_mut());
                tracing::debug!(
                    upstream = %target,
                    status = response.status().as_u16(),
                    "Relaying upstream response"
                );
                ForwardOutcome::Relayed(response)
            }
            Err(e) => {
                let error = ProxyError::from_client_error(target.as_str(), e);
                tracing::error!(
                    method = %method,
                    path = %original_path,
                    upstream = %target,
                    error_kind = error.kind(),
                    reason = %error.reason(),
                    "Upstream request failed"
                );
                ForwardOutcome::Failed(error)
            }
        }
    }

    /// Point `req` at the resolved target: same method and body, upstream path plus
    /// original query on the target base, `Host` set to the target authority,
    /// hop-by-hop headers dropped and `X-Forwarded-*` added.
    pub fn rewrite_request(
        req: Request<AxumBody>,
        resolution: &Resolution<'_>,
        client_addr: Option<SocketAddr>,
    ) -> HttpClientResult<Request<AxumBody>> {
        let target = resolution.target();
        let (mut parts, body) = req.into_parts();

        let original_host = parts.headers.get(header::HOST).cloned().or_else(|| {
            parts
                .uri
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        });

        let upstream_uri = target.join(resolution.upstream_path(), parts.uri.query());
        parts.uri = upstream_uri
            .parse::<Uri>()
            .map_err(|e| HttpClientError::InvalidRequest(format!("{upstream_uri}: {e}")))?;

        strip_hop_by_hop(&mut parts.headers);

        let host = HeaderValue::from_str(target.authority())
            .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;
        parts.headers.insert(header::HOST, host);

        if let Some(addr) = client_addr {
            append_forwarded_for(&mut parts.headers, addr)?;
        }
        if let Some(original_host) = original_host {
            if !parts.headers.contains_key(X_FORWARDED_HOST) {
                parts.headers.insert(X_FORWARDED_HOST, original_host);
            }
        }
        if !parts.headers.contains_key(X_FORWARDED_PROTO) {
            parts
                .headers
                .insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
        }

        Ok(Request::from_parts(parts, body))
    }
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) -> HttpClientResult<()> {
    let client_ip = addr.ip().to_string();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}, {client_ip}"),
        _ => client_ip,
    };
    let value =
        HeaderValue::from_str(&value).map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;
    headers.insert(X_FORWARDED_FOR, value);
    Ok(())
}
