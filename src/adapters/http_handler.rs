use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Body as AxumBody,
    http::{Method, StatusCode, header},
};
use eyre::{Result, WrapErr};
use hyper::{Request, Response};
use serde_json::{Map, Value, json};

use crate::{
    adapters::landing_page,
    core::{
        error::ProxyError,
        forwarder::{ForwardOutcome, ForwardingEngine},
        route_table::{Resolution, RouteTable},
    },
    ports::http_client::HttpClient,
};

/// HTTP handler for the proxy: answers the reserved paths itself and forwards
/// everything else through the [`ForwardingEngine`].
#[derive(Clone)]
pub struct HttpHandler {
    route_table: Arc<RouteTable>,
    engine: ForwardingEngine,
    service_name: Arc<str>,
}

impl HttpHandler {
    pub fn new(
        route_table: Arc<RouteTable>,
        http_client: Arc<dyn HttpClient>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            route_table,
            engine: ForwardingEngine::new(http_client),
            service_name: Arc::from(service_name.into()),
        }
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.route_table
    }

    /// Main request handler that routes requests appropriately
    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<AxumBody>> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        tracing::debug!("Handling {} request to {}", method, path);

        match path.as_str() {
            "/health" if is_read(&method) => self.handle_health_check(),
            "/" if is_read(&method) => self.handle_landing_page(),
            "/health" | "/" => method_not_allowed(&method, &path),
            _ => self.handle_proxy_request(req, &path, client_addr).await,
        }
    }

    /// Handle health check endpoint
    fn handle_health_check(&self) -> Result<Response<AxumBody>> {
        let routes: Map<String, Value> = self
            .route_table
            .route_map()
            .into_iter()
            .map(|(prefix, target)| (prefix.to_string(), Value::from(target)))
            .collect();
        let fallback = self
            .route_table
            .fallback()
            .map(|b| Value::from(b.target().as_str()))
            .unwrap_or(Value::Null);

        let health_data = json!({
            "status": "ok",
            "message": format!("{} is running", self.service_name),
            "routes": routes,
            "fallback": fallback,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        });

        json_response(StatusCode::OK, &health_data).wrap_err("Failed to build health check response")
    }

    fn handle_landing_page(&self) -> Result<Response<AxumBody>> {
        let html = landing_page::render(&self.service_name, &self.route_table);
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .body(AxumBody::from(html))
            .wrap_err("Failed to build landing page response")
    }

    async fn handle_proxy_request(
        &self,
        req: Request<AxumBody>,
        path: &str,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<AxumBody>> {
        let Some(resolution) = self.route_table.resolve(path) else {
            let error = ProxyError::NoRouteMatch {
                path: path.to_string(),
            };
            tracing::warn!(method = %req.method(), path = %path, "No route matches request");
            return self.not_found(&error);
        };

        match self.engine.forward(req, resolution, client_addr).await {
            ForwardOutcome::Relayed(response) => Ok(response),
            ForwardOutcome::Failed(error) => bad_gateway(&resolution, &error),
        }
    }

    fn not_found(&self, error: &ProxyError) -> Result<Response<AxumBody>> {
        let body = json!({
            "error": "Not Found",
            "message": "Endpoint not found",
            "availableEndpoints": self.route_table.prefixes(),
        });
        json_response(error.status_code(), &body).wrap_err("Failed to build 404 response")
    }
}

fn is_read(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

fn bad_gateway(resolution: &Resolution<'_>, error: &ProxyError) -> Result<Response<AxumBody>> {
    let body = json!({
        "error": "Bad Gateway",
        "message": format!(
            "Failed to connect to {} upstream",
            resolution.binding().target_name()
        ),
        "reason": error.reason(),
        "target": error.target().unwrap_or(resolution.target().as_str()),
    });
    json_response(error.status_code(), &body).wrap_err("Failed to build bad gateway response")
}

fn method_not_allowed(method: &Method, path: &str) -> Result<Response<AxumBody>> {
    let body = json!({
        "error": "Method Not Allowed",
        "message": format!("{method} is not supported on {path}"),
    });
    let mut response = json_response(StatusCode::METHOD_NOT_ALLOWED, &body)
        .wrap_err("Failed to build method not allowed response")?;
    response
        .headers_mut()
        .insert(header::ALLOW, header::HeaderValue::from_static("GET, HEAD"));
    Ok(response)
}

fn json_response(status: StatusCode, body: &Value) -> Result<Response<AxumBody>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(AxumBody::from(body.to_string()))
        .wrap_err("Failed to build JSON response")
}
