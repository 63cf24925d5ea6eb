use std::{
    collections::HashMap,
    error::Error as StdError,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use axum::{BoxError, body::Body as AxumBody};
use eyre::{Result, ensure};
use hyper::{
    Request, Response, Version,
    body::{Body, Frame, SizeHint},
    header,
};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    time::{Instant, Sleep, sleep, timeout},
};

use crate::{
    config::UpstreamConfig,
    core::backend::BackendUrl,
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
};

/// HTTP client adapter using Hyper with Rustls.
///
/// Responsibilities:
/// * Plain HTTP and HTTPS targets through one pooled client
/// * A connect timeout on the connector, a request timeout covering the wait for
///   the response head, and the same bound on every gap between body frames
/// * A bounded number of in-flight requests per target, so one slow target cannot
///   starve requests bound for another
/// * Classification of transport failures into [`HttpClientError`] variants
///
/// Requests are never retried.
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
    /// One semaphore per target base URL, created up front.
    limiters: HashMap<String, Arc<Semaphore>>,
    request_timeout: Duration,
}

impl HttpClientAdapter {
    /// Create a client with per-target concurrency limits for `targets`.
    ///
    /// Targets not listed here are sent without a concurrency limit.
    pub fn new<'a>(
        upstream: &UpstreamConfig,
        targets: impl IntoIterator<Item = &'a BackendUrl>,
    ) -> Result<Self> {
        ensure!(
            (1..=Semaphore::MAX_PERMITS).contains(&upstream.max_connections_per_target),
            "max_connections_per_target must be between 1 and {}",
            Semaphore::MAX_PERMITS
        );

        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs
        http_connector.set_nodelay(true);
        http_connector.set_connect_timeout(Some(Duration::from_secs(
            upstream.connect_timeout_secs,
        )));

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::debug!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build::<_, AxumBody>(https_connector);

        let limiters: HashMap<String, Arc<Semaphore>> = targets
            .into_iter()
            .map(|target| {
                (
                    target.as_str().to_string(),
                    Arc::new(Semaphore::new(upstream.max_connections_per_target)),
                )
            })
            .collect();

        tracing::info!(
            targets = limiters.len(),
            max_connections_per_target = upstream.max_connections_per_target,
            request_timeout_secs = upstream.request_timeout_secs,
            connect_timeout_secs = upstream.connect_timeout_secs,
            "Created upstream HTTP client"
        );

        Ok(Self {
            client,
            limiters,
            request_timeout: Duration::from_secs(upstream.request_timeout_secs),
        })
    }

    fn classify(error: &hyper_util::client::legacy::Error) -> HttpClientError {
        let reason = error_chain(error);
        if error.is_connect() {
            HttpClientError::Unreachable(reason)
        } else {
            HttpClientError::Protocol(reason)
        }
    }
}

/// Render an error and all of its sources as one line.
fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut reason = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !reason.contains(&cause_text) {
            reason.push_str(": ");
            reason.push_str(&cause_text);
        }
        source = cause.source();
    }
    reason
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        target: &BackendUrl,
        req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        if req.uri().host().is_none() {
            tracing::error!("Outgoing URI has no host: {}", req.uri());
            return Err(HttpClientError::InvalidRequest(
                "Outgoing URI has no host".to_string(),
            ));
        }

        let (mut parts, axum_body) = req.into_parts();
        parts.version = Version::HTTP_11;
        tracing::debug!("Outgoing request headers: {:?}", parts.headers);
        let outgoing_request = Request::from_parts(parts, axum_body);

        let limiter = self.limiters.get(target.as_str()).cloned();
        let client = self.client.clone();

        let exchange = async move {
            let permit = match limiter {
                Some(limiter) => Some(limiter.acquire_owned().await.map_err(|_| {
                    HttpClientError::Unreachable("Upstream limiter closed".to_string())
                })?),
                None => None,
            };
            let response = client
                .request(outgoing_request)
                .await
                .map_err(|e| Self::classify(&e))?;
            Ok::<_, HttpClientError>((response, permit))
        };

        let (response, permit) = match timeout(self.request_timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => return Err(HttpClientError::Timeout(self.request_timeout)),
        };

        let (mut parts, hyper_body) = response.into_parts();

        // The body is re-framed by the downstream server.
        parts.headers.remove(header::TRANSFER_ENCODING);

        let body = IdleTimeoutBody::new(hyper_body, self.request_timeout, permit);
        Ok(Response::from_parts(parts, AxumBody::new(body)))
    }
}

/// Relays an upstream body, failing it once `idle` passes without a frame.
///
/// The per-target permit rides along, so the slot stays taken until the body
/// has been fully relayed, has failed, or was dropped by the caller.
struct IdleTimeoutBody<B> {
    inner: B,
    idle: Duration,
    deadline: Pin<Box<Sleep>>,
    timed_out: bool,
    _permit: Option<OwnedSemaphorePermit>,
}

impl<B> IdleTimeoutBody<B> {
    fn new(inner: B, idle: Duration, permit: Option<OwnedSemaphorePermit>) -> Self {
        Self {
            inner,
            idle,
            deadline: Box::pin(sleep(idle)),
            timed_out: false,
            _permit: permit,
        }
    }
}

impl<B> Body for IdleTimeoutBody<B>
where
    B: Body + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = B::Data;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        if this.timed_out {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(frame) => {
                if let Some(next) = Instant::now().checked_add(this.idle) {
                    this.deadline.as_mut().reset(next);
                }
                Poll::Ready(frame.map(|result| result.map_err(Into::into)))
            }
            Poll::Pending => match this.deadline.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    this.timed_out = true;
                    tracing::warn!(
                        idle_secs = this.idle.as_secs(),
                        "Upstream body stalled, aborting relay"
                    );
                    let error: BoxError = Box::new(HttpClientError::Timeout(this.idle));
                    Poll::Ready(Some(Err(error)))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        self.timed_out || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
