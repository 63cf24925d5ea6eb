//! Inbound HTTP surface: the axum router, its tower-http layers and the serve loop.
use std::{
    convert::Infallible,
    future::{Future, IntoFuture},
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware,
    response::Response,
    routing::any,
};
use eyre::{Result, WrapErr};
use tokio::{net::TcpListener, sync::oneshot};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    adapters::{HttpHandler, middleware::request_timing_middleware},
    tracing_setup,
};

pub struct ProxyServer {
    handler: Arc<HttpHandler>,
    grace_period: Duration,
}

impl ProxyServer {
    pub fn new(handler: HttpHandler, grace_period: Duration) -> Self {
        Self {
            handler: Arc::new(handler),
            grace_period,
        }
    }

    /// Every path, including `/`, goes to the handler.
    pub fn router(&self) -> Router {
        let make_request_route = |handler: Arc<HttpHandler>| {
            any(move |req: Request| {
                let handler = handler.clone();
                async move {
                    let client_addr = req
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| *addr);
                    match handler.handle_request(req, client_addr).await {
                        Ok(response) => Ok::<Response<Body>, Infallible>(response),
                        Err(e) => {
                            tracing::error!("Request handling error: {:?}", e);
                            let mut response = Response::new(Body::from("Internal Server Error"));
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                            Ok(response)
                        }
                    }
                }
            })
        };

        Router::new()
            .route("/{*path}", make_request_route(self.handler.clone()))
            .route("/", make_request_route(self.handler.clone()))
            .layer(middleware::from_fn(request_timing_middleware))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &Request| tracing_setup::make_request_span(req))
                    .on_response(
                        |response: &Response, latency: Duration, span: &tracing::Span| {
                            tracing_setup::record_response(response, latency, span)
                        },
                    ),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve on `listener` until `shutdown` resolves, then stop accepting and give
    /// in-flight requests up to the grace period to finish.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener
            .local_addr()
            .wrap_err("Failed to read listener address")?;
        let app = self.router();
        let grace_period = self.grace_period;

        for binding in self.handler.route_table().bindings() {
            tracing::info!(
                prefix = binding.prefix(),
                upstream = %binding.target(),
                "Configured route"
            );
        }
        if let Some(fallback) = self.handler.route_table().fallback() {
            tracing::info!(upstream = %fallback.target(), "Configured fallback");
        }
        tracing::info!("Proxy listening on {}", local_addr);

        let (drain_tx, drain_rx) = oneshot::channel::<()>();
        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Shutdown signal received, draining in-flight requests");
            let _ = drain_tx.send(());
        })
        .into_future();

        let grace_timer = async move {
            if drain_rx.await.is_ok() {
                tokio::time::sleep(grace_period).await;
            } else {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            result = server => {
                result.wrap_err("Server error")?;
                tracing::info!("Graceful shutdown completed");
            }
            _ = grace_timer => {
                tracing::warn!(
                    grace_secs = grace_period.as_secs_f64(),
                    "Grace period elapsed with requests still in flight, shutting down"
                );
            }
        }

        Ok(())
    }
}
