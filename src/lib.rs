//! Switchyard - a path-based HTTP reverse proxy.
//!
//! Switchyard exposes several independent backend services under one public
//! origin. Each registered path prefix is bound to one backend target; a request
//! under that prefix is forwarded with the prefix stripped, the query string kept
//! and the `Host` header rewritten to the target. Everything else either goes to an
//! optional fallback target or receives a JSON `404` listing the available
//! endpoints. `/health` and `/` are always answered by the proxy itself.
//!
//! # Features
//! - Segment-aware longest-prefix routing with an optional fallback
//! - Streaming relay over HTTP/1.1 to `http` and `https` targets
//! - Connect and request timeouts with a per-target concurrency cap
//! - JSON `502` responses that name the failed target and the reason
//! - Layered configuration (file + environment) validated before binding
//! - Structured logging via `tracing` with request ids
//! - Graceful shutdown on SIGINT / SIGTERM with a bounded drain
//!
//! # Quick Example
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use switchyard::{HttpClientAdapter, HttpHandler, ProxyServer, config::ProxyConfig, core::RouteTable};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = ProxyConfig::builder()
//!     .target("network", "http://127.0.0.1:4001")
//!     .route("/network", "network")
//!     .build();
//! let table = Arc::new(RouteTable::build(&config)?);
//! let client = Arc::new(HttpClientAdapter::new(&config.upstream, table.targets())?);
//! let handler = HttpHandler::new(table, client, config.service_name.clone());
//! let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
//! ProxyServer::new(handler, Duration::from_secs(config.shutdown_grace_secs))
//!     .run(listener, async { let _ = tokio::signal::ctrl_c().await; })
//!     .await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! routing and forwarding logic inside `core`.
//!
//! # Error Handling
//! Per-request failures are [`core::ProxyError`] values rendered as HTTP responses.
//! Configuration problems are [`config::ConfigError`] values and stop the process
//! before it binds. Application plumbing returns `eyre::Result<T>` with context.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HttpClientAdapter, HttpHandler, ProxyServer},
    core::{RouteTable, forwarder::ForwardingEngine},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
