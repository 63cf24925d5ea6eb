//! Shared harness: real axum mock backends and a real proxy on ephemeral ports.
#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
};
use serde_json::{Map, Value, json};
use switchyard::{
    adapters::{HttpClientAdapter, HttpHandler, ProxyServer},
    config::ProxyConfig,
    core::RouteTable,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::oneshot,
    task::JoinHandle,
};

/// Request header asking the echo backend to answer with this status code.
pub const ECHO_STATUS_HEADER: &str = "x-echo-status";

pub struct MockBackend {
    pub addr: SocketAddr,
    pub url: String,
}

impl MockBackend {
    /// `Host` value the proxy must send to this backend.
    pub fn authority(&self) -> String {
        self.addr.to_string()
    }
}

async fn spawn_router(router: Router) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    MockBackend {
        addr,
        url: format!("http://{addr}"),
    }
}

/// Backend that describes the request it received as JSON.
pub async fn spawn_echo_backend() -> MockBackend {
    spawn_router(
        Router::new()
            .route("/", any(echo))
            .route("/{*path}", any(echo)),
    )
    .await
}

/// Backend that waits `delay` before answering `slow`.
pub async fn spawn_slow_backend(delay: Duration) -> MockBackend {
    let handler = move || async move {
        tokio::time::sleep(delay).await;
        "slow"
    };
    spawn_router(
        Router::new()
            .route("/", any(handler))
            .route("/{*path}", any(handler)),
    )
    .await
}

async fn echo(req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();

    let status = parts
        .headers
        .get(ECHO_STATUS_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK);

    let headers: Map<String, Value> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                Value::from(value.to_str().unwrap_or_default()),
            )
        })
        .collect();

    let description = json!({
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "host": parts.headers.get("host").and_then(|v| v.to_str().ok()),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    });

    let mut response = (status, Json(description)).into_response();
    response.headers_mut().insert(
        HeaderName::from_static("x-backend"),
        HeaderValue::from_static("echo"),
    );
    response
}

/// Backend speaking raw TCP: reads the request, writes `reply` verbatim, then
/// keeps the socket open when `hold` is set or drops it otherwise.
pub async fn spawn_raw_backend(reply: &'static [u8], hold: bool) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(reply).await;
            if hold {
                held.push(socket);
            }
        }
    });
    MockBackend {
        addr,
        url: format!("http://{addr}"),
    }
}

/// An address nothing is listening on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub struct TestProxy {
    pub base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<eyre::Result<()>>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), &mut self.handle).await;
    }
}

pub async fn spawn_proxy(config: ProxyConfig) -> TestProxy {
    let table = Arc::new(RouteTable::build(&config).expect("test config must be valid"));
    let client = Arc::new(HttpClientAdapter::new(&config.upstream, table.targets()).unwrap());
    let handler = HttpHandler::new(table, client, config.service_name.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(
        ProxyServer::new(handler, Duration::from_secs(1)).run(listener, async move {
            let _ = rx.await;
        }),
    );

    TestProxy {
        base_url: format!("http://{addr}"),
        shutdown: Some(tx),
        handle,
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
