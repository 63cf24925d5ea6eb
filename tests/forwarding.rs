//! End-to-end forwarding through a real proxy to real mock backends.
mod common;

use std::time::{Duration, Instant};

use common::{
    ECHO_STATUS_HEADER, http_client, spawn_echo_backend, spawn_proxy, spawn_raw_backend,
    spawn_slow_backend, unused_addr,
};
use reqwest::StatusCode;
use serde_json::{Value, json};
use switchyard::config::ProxyConfig;

fn two_target_config(network: &str, fogochain: &str) -> ProxyConfig {
    ProxyConfig::builder()
        .target("network", network)
        .target("fogochain", fogochain)
        .route("/network", "network")
        .route("/fogochain", "fogochain")
        .build()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_prefix_is_stripped_and_query_preserved() {
    let network = spawn_echo_backend().await;
    let fogochain = spawn_echo_backend().await;
    let proxy = spawn_proxy(two_target_config(&network.url, &fogochain.url)).await;

    let response = http_client()
        .get(proxy.url("/network/status?x=1&y=a%20b"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-backend"], "echo");

    let echoed: Value = response.json().await.unwrap();
    assert_eq!(echoed["method"], "GET");
    assert_eq!(echoed["path"], "/status");
    assert_eq!(echoed["query"], "x=1&y=a%20b");
    assert_eq!(echoed["host"], network.authority());

    proxy.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_each_prefix_reaches_its_own_target() {
    let network = spawn_echo_backend().await;
    let fogochain = spawn_echo_backend().await;
    let proxy = spawn_proxy(two_target_config(&network.url, &fogochain.url)).await;
    let client = http_client();

    let echoed: Value = client
        .get(proxy.url("/fogochain/api/blocks/7"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(echoed["path"], "/api/blocks/7");
    assert_eq!(echoed["host"], fogochain.authority());

    let echoed: Value = client
        .get(proxy.url("/network"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(echoed["path"], "/");
    assert_eq!(echoed["host"], network.authority());

    proxy.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_method_body_and_headers_are_forwarded() {
    let network = spawn_echo_backend().await;
    let fogochain = spawn_echo_backend().await;
    let proxy = spawn_proxy(two_target_config(&network.url, &fogochain.url)).await;

    let response = http_client()
        .post(proxy.url("/network/items"))
        .header("authorization", "Bearer token")
        .header("content-type", "application/json")
        .header(ECHO_STATUS_HEADER, "201")
        .body(r#"{"name":"widget"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let echoed: Value = response.json().await.unwrap();
    assert_eq!(echoed["method"], "POST");
    assert_eq!(echoed["body"], r#"{"name":"widget"}"#);
    assert_eq!(echoed["headers"]["authorization"], "Bearer token");
    assert_eq!(echoed["headers"]["content-type"], "application/json");
    assert_eq!(echoed["headers"]["x-forwarded-for"], "127.0.0.1");
    assert_eq!(echoed["headers"]["x-forwarded-proto"], "http");
    assert!(echoed["headers"]["x-request-id"].is_string());

    proxy.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unmatched_path_without_fallback_is_404() {
    let network = spawn_echo_backend().await;
    let fogochain = spawn_echo_backend().await;
    let proxy = spawn_proxy(two_target_config(&network.url, &fogochain.url)).await;

    for path in ["/unknown", "/networkx", "/api/network"] {
        let response = http_client().get(proxy.url(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "path {path}");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Not Found");
        assert_eq!(body["message"], "Endpoint not found");
        assert_eq!(body["availableEndpoints"], json!(["/network", "/fogochain"]));
    }

    proxy.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unmatched_path_goes_to_fallback_unchanged() {
    let network = spawn_echo_backend().await;
    let fogochain = spawn_echo_backend().await;
    let mut config = two_target_config(&network.url, &fogochain.url);
    config.fallback = Some("fogochain".to_string());
    let proxy = spawn_proxy(config).await;

    let echoed: Value = http_client()
        .get(proxy.url("/dashboard/assets/app.js?v=3"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(echoed["path"], "/dashboard/assets/app.js");
    assert_eq!(echoed["query"], "v=3");
    assert_eq!(echoed["host"], fogochain.authority());

    proxy.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health_is_answered_by_the_proxy() {
    let network = spawn_echo_backend().await;
    let fogochain = spawn_echo_backend().await;
    let mut config = two_target_config(&network.url, &fogochain.url);
    config.fallback = Some("network".to_string());
    let proxy = spawn_proxy(config).await;

    let response = http_client().get(proxy.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-backend").is_none());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["routes"]["/network"], network.url.as_str());
    assert_eq!(body["routes"]["/fogochain"], fogochain.url.as_str());
    assert_eq!(body["fallback"], network.url.as_str());
    assert!(body["timestamp"].is_i64());

    let landing = http_client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(landing.status(), StatusCode::OK);
    assert!(landing.headers().get("x-backend").is_none());
    let html = landing.text().await.unwrap();
    assert!(html.contains("href=\"/network\""));
    assert!(html.contains("href=\"/health\""));

    proxy.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_target_is_502() {
    let network = spawn_echo_backend().await;
    let dead = format!("http://{}", unused_addr().await);
    let proxy = spawn_proxy(two_target_config(&network.url, &dead)).await;

    let response = http_client()
        .get(proxy.url("/fogochain/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Bad Gateway");
    assert_eq!(body["target"], dead.as_str());
    assert!(!body["reason"].as_str().unwrap().is_empty());
    assert!(body["message"].as_str().unwrap().contains("fogochain"));

    // The healthy target is unaffected.
    let response = http_client()
        .get(proxy.url("/network/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    proxy.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slow_target_times_out_with_502() {
    let network = spawn_echo_backend().await;
    let slow = spawn_slow_backend(Duration::from_secs(10)).await;
    let mut config = two_target_config(&network.url, &slow.url);
    config.upstream.request_timeout_secs = 1;
    let proxy = spawn_proxy(config).await;

    let started = Instant::now();
    let response = http_client()
        .get(proxy.url("/fogochain/anything"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(started.elapsed() < Duration::from_secs(5));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["target"], slow.url.as_str());
    assert!(body["reason"].as_str().unwrap().contains("Timed out"));

    proxy.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_closed_before_response_is_502() {
    let network = spawn_echo_backend().await;
    let closing = spawn_raw_backend(b"", false).await;
    let proxy = spawn_proxy(two_target_config(&network.url, &closing.url)).await;

    let response = http_client()
        .post(proxy.url("/fogochain/submit"))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Bad Gateway");
    assert_eq!(body["target"], closing.url.as_str());
    assert!(!body["reason"].as_str().unwrap().is_empty());
    assert!(body["message"].as_str().unwrap().contains("fogochain"));

    proxy.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stalled_response_body_is_cut_off() {
    let network = spawn_echo_backend().await;
    let stalled = spawn_raw_backend(
        b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\nhello",
        true,
    )
    .await;
    let mut config = two_target_config(&network.url, &stalled.url);
    config.upstream.request_timeout_secs = 1;
    let proxy = spawn_proxy(config).await;

    let started = Instant::now();
    let response = http_client()
        .get(proxy.url("/fogochain/stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = tokio::time::timeout(Duration::from_secs(5), response.bytes())
        .await
        .expect("the proxy must end a stalled body");
    assert!(body.is_err(), "a truncated body must not look complete");
    assert!(started.elapsed() < Duration::from_secs(4));

    // The other target keeps working.
    let response = http_client()
        .get(proxy.url("/network/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    proxy.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slow_target_does_not_delay_other_prefixes() {
    let network = spawn_echo_backend().await;
    let slow = spawn_slow_backend(Duration::from_secs(3)).await;
    let proxy = spawn_proxy(two_target_config(&network.url, &slow.url)).await;

    let client = http_client();
    let slow_request = {
        let client = client.clone();
        let url = proxy.url("/fogochain/wait");
        tokio::spawn(async move { client.get(url).send().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let response = client.get(proxy.url("/network/fast")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!slow_request.is_finished());

    let slow_response = slow_request.await.unwrap().unwrap();
    assert_eq!(slow_response.status(), StatusCode::OK);
    assert_eq!(slow_response.text().await.unwrap(), "slow");

    proxy.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrency_cap_queues_instead_of_failing() {
    let slow = spawn_slow_backend(Duration::from_millis(300)).await;
    let mut config = ProxyConfig::builder()
        .target("slow", &slow.url)
        .route("/slow", "slow")
        .build();
    config.upstream.max_connections_per_target = 1;
    let proxy = spawn_proxy(config).await;

    let client = http_client();
    let started = Instant::now();
    let requests: Vec<_> = (0..3)
        .map(|i| {
            let client = client.clone();
            let url = proxy.url(&format!("/slow/{i}"));
            tokio::spawn(async move { client.get(url).send().await })
        })
        .collect();

    for request in requests {
        let response = request.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    // One at a time: three sequential round trips.
    assert!(started.elapsed() >= Duration::from_millis(850));

    proxy.stop().await;
}
