//! HTTP-level tests for the gateway router
//!
//! The router is driven with `tower::ServiceExt::oneshot`; backends are small
//! axum apps on an ephemeral port that echo what they received.

mod common;

use api_gateway::config::RouteConfig;
use api_gateway::gateway::Gateway;
use api_gateway::x509::PeerCertificates;
use axum::{
    Json, Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, Uri},
    routing::any,
};
use common::{
    DEVICE_MRN, DEVICE_ORG, FORWARDING_HOST, PROXY_MRN, device_cert, gateway_config, proxy_cert,
};
use gateway_core::ContextSource;
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;

const ALLOWED_ORG: &str = "urn:mrn:mcp:org:mcc:grad";

/// Spawn a backend echoing path, query and identity headers.
async fn spawn_echo_backend() -> String {
    async fn echo(uri: Uri, headers: HeaderMap) -> Json<Value> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
        Json(json!({
            "path": uri.path(),
            "query": uri.query(),
            "mrn": header("x-secom-mrn"),
            "cert": header("x-secom-cert"),
            "ssl_cert": header("x-ssl-cert"),
            "connection": header("connection"),
            "prefix": header("x-forwarded-prefix"),
        }))
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(any(echo));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn route(uri: &str) -> RouteConfig {
    RouteConfig {
        id: "secom".to_string(),
        path: "/api/secom".to_string(),
        uri: uri.to_string(),
        strip_parts: 2,
        context_source: ContextSource::Original,
        require_authentication: true,
    }
}

fn router(allowed_org: &str, backend: &str) -> Router {
    Gateway::new(gateway_config(allowed_org, route(backend)))
        .unwrap()
        .router()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn forwarded_request(uri: &str) -> Request<Body> {
    let cert = device_cert(DEVICE_ORG);
    Request::builder()
        .uri(uri)
        .header("host", FORWARDING_HOST)
        .header("x-ssl-verify", "SUCCESS")
        .header("x-ssl-cert", cert.escaped_pem())
        .header("x-secom-mrn", "urn:mrn:forged")
        .body(Body::empty())
        .unwrap()
}

/// Health endpoint answers without any client identity.
#[tokio::test]
async fn test_health_is_public() {
    let app = router(ALLOWED_ORG, "http://127.0.0.1:9");
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}

/// Forwarded certificate → authenticated, path stripped, identity propagated,
/// forged and consumed headers removed.
#[tokio::test]
async fn test_forwarded_request_reaches_backend_with_identity() {
    let backend = spawn_echo_backend().await;
    let app = router(ALLOWED_ORG, &backend);

    let response = app
        .oneshot(forwarded_request("/api/secom/v1/object?id=42"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let echoed = body_json(response).await;
    assert_eq!(echoed["path"], "/v1/object");
    assert_eq!(echoed["query"], "id=42");
    assert_eq!(echoed["mrn"], DEVICE_MRN);
    assert!(echoed["cert"].as_str().is_some_and(|c| !c.is_empty()));
    assert_eq!(echoed["ssl_cert"], Value::Null);
    assert_eq!(echoed["prefix"], "/v1/object");
}

/// Organisation mismatch is refused before the backend is contacted.
#[tokio::test]
async fn test_other_organisation_is_forbidden() {
    let app = router("urn:mrn:mcp:org:other", "http://127.0.0.1:9");
    let response = app
        .oneshot(forwarded_request("/api/secom/v1/object"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["status"], 403);
}

/// Malformed forwarded certificates answer 401.
#[tokio::test]
async fn test_malformed_forwarded_certificate_is_unauthorized() {
    let app = router(ALLOWED_ORG, "http://127.0.0.1:9");
    let request = Request::builder()
        .uri("/api/secom/v1/object")
        .header("host", FORWARDING_HOST)
        .header("x-ssl-cert", "garbage")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// No identity at all on a protected route: 401 from the proxy.
#[tokio::test]
async fn test_anonymous_request_to_protected_route_is_unauthorized() {
    let app = router(ALLOWED_ORG, "http://127.0.0.1:9");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/secom/v1/object")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Anonymous requests pass on routes that do not require authentication,
/// and never carry identity headers.
#[tokio::test]
async fn test_open_route_forwards_without_identity() {
    let backend = spawn_echo_backend().await;
    let mut open = route(&backend);
    open.require_authentication = false;
    let app = Gateway::new(gateway_config(ALLOWED_ORG, open)).unwrap().router();

    let request = Request::builder()
        .uri("/api/secom/public/")
        .header("x-secom-mrn", "urn:mrn:forged")
        .header("connection", "keep-alive")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let echoed = body_json(response).await;
    assert_eq!(echoed["path"], "/public/");
    assert_eq!(echoed["mrn"], Value::Null);
}

/// Direct TLS peer certificate (request extension) authenticates too.
#[tokio::test]
async fn test_peer_certificate_authenticates() {
    let backend = spawn_echo_backend().await;
    let app = router(ALLOWED_ORG, &backend);

    let mut request = Request::builder()
        .uri("/api/secom/v1/object")
        .body(Body::empty())
        .unwrap();
    request
        .extensions_mut()
        .insert(PeerCertificates::new(vec![device_cert(DEVICE_ORG).der]));

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["mrn"], DEVICE_MRN);
}

/// Unknown paths answer 404.
#[tokio::test]
async fn test_unmatched_path_is_not_found() {
    let mut config = gateway_config(ALLOWED_ORG, route("http://127.0.0.1:9"));
    config.routes[0].require_authentication = false;
    let app = Gateway::new(config).unwrap().router();

    let response = app
        .oneshot(Request::builder().uri("/elsewhere").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Unreachable backend answers 502.
#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut open = route(&format!("http://{addr}"));
    open.require_authentication = false;
    let app = Gateway::new(gateway_config(ALLOWED_ORG, open)).unwrap().router();

    let response = app
        .oneshot(Request::builder().uri("/api/secom/x").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

/// Slow backend answers 504 after the request timeout.
#[tokio::test]
async fn test_slow_backend_is_gateway_timeout() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let slow = Router::new().fallback(any(|| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        "late"
    }));
    tokio::spawn(async move {
        axum::serve(listener, slow).await.unwrap();
    });

    let mut open = route(&format!("http://{addr}"));
    open.require_authentication = false;
    let mut config = gateway_config(ALLOWED_ORG, open);
    config.server.request_timeout = Duration::from_millis(100);
    let app = Gateway::new(config).unwrap().router();

    let response = app
        .oneshot(Request::builder().uri("/api/secom/x").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

/// Rewritten context source: the prefix header is derived from the stripped
/// path, and a client-supplied prefix is replaced.
#[tokio::test]
async fn test_context_path_follows_rewritten_source() {
    let backend = spawn_echo_backend().await;
    let mut rewritten = route(&backend);
    rewritten.require_authentication = false;
    rewritten.strip_parts = 1;
    rewritten.context_source = ContextSource::Rewritten;
    let app = Gateway::new(gateway_config(ALLOWED_ORG, rewritten)).unwrap().router();

    let request = Request::builder()
        .uri("/api/secom/v1/object")
        .header("x-forwarded-prefix", "/forged")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let echoed = body_json(response).await;
    assert_eq!(echoed["path"], "/secom/v1/object");
    assert_eq!(echoed["prefix"], "/v1/object");
}

/// Traversal from an open route into a protected one is refused with 400 and
/// never reaches the backend.
#[tokio::test]
async fn test_dot_segments_are_rejected_before_routing() {
    let backend = spawn_echo_backend().await;
    let mut open = route(&backend);
    open.id = "open".to_string();
    open.path = "/api".to_string();
    open.strip_parts = 1;
    open.require_authentication = false;
    let mut protected = route(&backend);
    protected.id = "admin".to_string();
    protected.path = "/api/admin".to_string();
    protected.strip_parts = 1;

    let mut config = gateway_config(ALLOWED_ORG, open);
    config.routes.push(protected);
    let app = Gateway::new(config).unwrap().router();

    for uri in [
        "/api/x/../admin/secret",
        "/api/x/%2e%2e/admin/secret",
        "/health/../api/admin/secret",
    ] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/admin/secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Proxy's own TLS certificate plus a forwarded device certificate: the
/// device is authenticated and its MRN reaches the backend.
#[tokio::test]
async fn test_forwarded_device_identity_wins_over_proxy_peer() {
    let backend = spawn_echo_backend().await;
    let app = router(ALLOWED_ORG, &backend);

    let device = device_cert(DEVICE_ORG);
    let mut request = Request::builder()
        .uri("/api/secom/v1/object")
        .header("host", FORWARDING_HOST)
        .header("x-ssl-forwarded", "true")
        .header("x-ssl-cert", device.escaped_pem())
        .body(Body::empty())
        .unwrap();
    request
        .extensions_mut()
        .insert(PeerCertificates::new(vec![proxy_cert().der]));

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let echoed = body_json(response).await;
    assert_eq!(echoed["mrn"], DEVICE_MRN);
    assert_ne!(echoed["mrn"], PROXY_MRN);
    let expected_cert = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&device.der)
    };
    assert_eq!(echoed["cert"], expected_cert.as_str());
}

