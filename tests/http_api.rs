//! HTTP API tests
//!
//! Drives the full application router with `tower::ServiceExt::oneshot`.
//! Remote tiers and the health endpoint are one wiremock server.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use hybridroute::config::Config;
use hybridroute::handlers::{self, AppState};
use hybridroute::middleware::REQUEST_ID_HEADER;
use hybridroute::models::DetachedRunner;
use hybridroute::shared::{HttpTransport, ReqwestTransport};
use serde_json::{Value, json};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_state(server: &MockServer) -> AppState {
    let config = Config::from_str(&format!(
        r#"
[server]
host = "127.0.0.1"
port = 3000
request_timeout_seconds = 5

[endpoints]
on_premise = "{uri}"
cloud = "{uri}"
health = "{uri}"
"#,
        uri = server.uri()
    ))
    .expect("should parse test config");
    let transport: Arc<dyn HttpTransport> =
        Arc::new(ReqwestTransport::new(Duration::from_secs(1)).unwrap());
    AppState::new(Arc::new(config), transport, Arc::new(DetachedRunner))
        .expect("should create AppState")
}

fn create_test_app(server: &MockServer) -> Router {
    handlers::app(create_test_state(server))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn send_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn mount_health(server: &MockServer, on_premise: bool, cloud: bool) {
    Mock::given(method("GET"))
        .and(path("/v1/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "on_premise": {"healthy": on_premise},
            "cloud": {"healthy": cloud}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = MockServer::start().await;
    let app = create_test_app(&server);

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "OK");
    assert_eq!(body["metrics_status"], "operational");
    assert!(body["local_model"].is_null());
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = MockServer::start().await;
    let app = create_test_app(&server);
    let id = "0b6f2f4e-8c2e-4d8a-9f0e-3f1d2c4b5a69";

    let request = Request::builder()
        .uri("/health")
        .header(REQUEST_ID_HEADER, id)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()[REQUEST_ID_HEADER], id);

    let response = app.oneshot(get("/health")).await.unwrap();
    let generated = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
    assert_ne!(generated, id);
    assert_eq!(generated.len(), 36);
}

#[tokio::test]
async fn test_preferences_round_trip_through_session() {
    let server = MockServer::start().await;
    let app = create_test_app(&server);

    let response = app.clone().oneshot(get("/v1/preferences")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["preferred_tier"], "auto");
    assert_eq!(body["fallback_enabled"], true);

    let response = app
        .clone()
        .oneshot(send_json(
            "PUT",
            "/v1/preferences",
            json!({"privacy_level": "high", "cost_optimization": true}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(app.oneshot(get("/v1/preferences")).await.unwrap()).await;
    assert_eq!(body["privacy_level"], "high");
    assert_eq!(body["cost_optimization"], true);
    assert_eq!(body["latency_requirement"], "medium");
}

#[tokio::test]
async fn test_invalid_preferences_are_rejected() {
    let server = MockServer::start().await;
    let app = create_test_app(&server);

    let response = app
        .oneshot(send_json(
            "PUT",
            "/v1/preferences",
            json!({"preferred_tier": "mainframe"}),
        ))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_probe_updates_cached_availability() {
    let server = MockServer::start().await;
    mount_health(&server, true, false).await;
    let app = create_test_app(&server);

    let body = body_json(app.clone().oneshot(get("/v1/availability")).await.unwrap()).await;
    assert_eq!(body["connected"], false);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/availability/probe")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["connected"], true);
    assert_eq!(body["on_premise_reachable"], true);
    assert_eq!(body["cloud_reachable"], false);
    assert_eq!(body["browser_ready"], false);

    let cached = body_json(app.oneshot(get("/v1/availability")).await.unwrap()).await;
    assert_eq!(cached, body);
}

#[tokio::test]
async fn test_route_preview_does_not_record_a_decision() {
    let server = MockServer::start().await;
    let state = create_test_state(&server);
    state.session().write().await.availability.on_premise_reachable = true;
    let app = handlers::app(state);

    let response = app
        .clone()
        .oneshot(send_json(
            "POST",
            "/v1/route",
            json!({"messages": [{"role": "user", "content": "What is Rust?"}]}),
        ))
        .await
        .unwrap();
    let decision = body_json(response).await;
    assert_eq!(decision["tier"], "on_premise");
    assert_eq!(decision["rule"], "default");
    assert_eq!(decision["estimated_cost"], 0.0);

    let last = body_json(app.oneshot(get("/v1/decision")).await.unwrap()).await;
    assert!(last.is_null());
}

#[tokio::test]
async fn test_generate_rejects_empty_messages() {
    let server = MockServer::start().await;
    let app = create_test_app(&server);

    let response = app
        .oneshot(send_json("POST", "/v1/generate", json!({"messages": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("messages"));
}

#[tokio::test]
async fn test_generate_returns_response_and_decision() {
    let server = MockServer::start().await;
    mount_health(&server, true, true).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"tier": "on_premise"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Rust is a systems language."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let state = create_test_state(&server);
    state.refresh_availability().await;
    let app = handlers::app(state);

    let response = app
        .clone()
        .oneshot(send_json(
            "POST",
            "/v1/generate",
            json!({"messages": [{"role": "user", "content": "What is Rust?"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["response"], "Rust is a systems language.");
    assert_eq!(body["decision"]["tier"], "on_premise");

    let last = body_json(app.oneshot(get("/v1/decision")).await.unwrap()).await;
    assert_eq!(last, body["decision"]);
}

#[tokio::test]
async fn test_generate_failure_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let app = create_test_app(&server);

    // Nothing is known to be available, so there is no fallback candidate
    let response = app
        .oneshot(send_json(
            "POST",
            "/v1/generate",
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert!(
        body["error"].as_str().unwrap().contains("all tiers exhausted"),
        "got: {body}"
    );
}

#[tokio::test]
async fn test_streaming_generate_emits_deltas_then_done() {
    let server = MockServer::start().await;
    let sse = [
        json!({"choices": [{"delta": {"content": "Hel"}}]}),
        json!({"choices": [{"delta": {"content": "lo"}}]}),
    ]
    .iter()
    .map(|fragment| format!("data: {fragment}\n\n"))
    .collect::<String>()
        + "data: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&server)
        .await;
    let app = create_test_app(&server);

    let response = app
        .oneshot(send_json(
            "POST",
            "/v1/generate",
            json!({
                "messages": [{"role": "user", "content": "say hello"}],
                "config": {"stream": true}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let first = text.find(r#"data: {"content":"Hel"}"#).expect("first delta");
    let second = text.find(r#"data: {"content":"lo"}"#).expect("second delta");
    let done = text.find("event: done").expect("done event");
    assert!(first < second && second < done, "events out of order:\n{text}");
    assert!(text.contains(r#""response":"Hello""#));
    assert!(!text.contains("event: error"));
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_decisions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "ok"}}]
        })))
        .mount(&server)
        .await;
    let app = create_test_app(&server);

    app.clone()
        .oneshot(send_json(
            "POST",
            "/v1/generate",
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(
        text.contains(r#"hybridroute_decisions_total{rule="default",tier="cloud"} 1"#),
        "decision counter missing:\n{text}"
    );
}
