// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! End-to-end tests for the HTTP surface
//!
//! These tests verify that:
//! - /analyze maps every terminal state to its status code and body
//! - Rejections always carry a structured error body
//! - 429 responses carry Retry-After
//! - Health, readiness, policy info and reload routes behave

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use llm_policy_gateway::{
    api::http_server::{create_app, AppState},
    enforcement::{Disposition, Enforcer, MemoryAuditSink},
    generation::{EchoGenerator, GenerationError, TextGenerator},
    policy::{PolicyDocument, PolicyFormat, PolicyStore},
    rate_limit::RateLimiter,
};
use serde_json::{json, Value};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot`

const POLICY: &str = r#"
version: "2024-06-01"
rules:
  blockedTerms: ["bomb", "Malware"]
  sanitizeRules:
    - pattern: "password\\s*=\\s*\\S+"
      replacement: "password=[hidden]"
  maxOutputLength: 120
api:
  allowedApiKeys: ["test-key"]
  rateLimit:
    requestsPerWindow: 2
    windowSeconds: 86400
"#;

struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Status {
            status: 503,
            message: "model overloaded".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

struct TestGateway {
    app: Router,
    audit: Arc<MemoryAuditSink>,
}

fn gateway_with(
    store: PolicyStore,
    generator: Arc<dyn TextGenerator>,
    reject_flagged_output: bool,
) -> TestGateway {
    let audit = Arc::new(MemoryAuditSink::new());
    let enforcer = Enforcer::new(
        Arc::new(store),
        Arc::new(RateLimiter::local_only()),
        generator,
        audit.clone(),
        Duration::from_secs(2),
    );
    let state = AppState {
        enforcer: Arc::new(enforcer),
        reject_flagged_output,
        ready_requires_redis: false,
        admin_api_key: Some(ADMIN_KEY.to_string()),
    };
    TestGateway {
        app: create_app(Arc::new(state)),
        audit,
    }
}

fn gateway() -> TestGateway {
    let document = PolicyDocument::parse(POLICY, PolicyFormat::Yaml).unwrap();
    gateway_with(
        PolicyStore::from_document(document),
        Arc::new(EchoGenerator),
        true,
    )
}

fn analyze(key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/analyze")
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

const ADMIN_KEY: &str = "ops-secret";

fn reload(admin_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/admin/policy/reload");
    if let Some(key) = admin_key {
        builder = builder.header("x-admin-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_analyze_allowed_redacts_pii() {
    let gw = gateway();

    let response = gw
        .app
        .oneshot(analyze(
            Some("test-key"),
            json!({"text": "Contact me at a@b.com"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["redactedText"], "Contact me at [EMAIL REDACTED]");
    assert_eq!(body["finalOutput"], "Contact me at [EMAIL REDACTED]");
    assert_eq!(body["flagged"], false);
    assert_eq!(body["reasons"], json!([]));
    assert_eq!(body["policyVersion"], "2024-06-01");
    assert!(body["requestId"].as_str().is_some());

    let records = gw.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].disposition, Disposition::Allowed);
}

#[tokio::test]
async fn test_analyze_sanitizes_before_generation() {
    let gw = gateway();

    let response = gw
        .app
        .oneshot(analyze(
            Some("test-key"),
            json!({"text": "my PASSWORD = hunter2 ok"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["finalOutput"], "my password=[hidden] ok");
}

#[tokio::test]
async fn test_missing_key_is_unauthorized() {
    let gw = gateway();

    let response = gw
        .app
        .oneshot(analyze(None, json!({"text": "hello"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "unauthorized");
    assert_eq!(body["message"], "API key required");
    assert!(body["request_id"].as_str().is_some());

    let records = gw.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].disposition, Disposition::Unauthorized);
}

#[tokio::test]
async fn test_invalid_key_is_unauthorized() {
    let gw = gateway();

    let response = gw
        .app
        .oneshot(analyze(Some("wrong"), json!({"text": "hello"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["message"], "API key not recognised");
}

#[tokio::test]
async fn test_quota_exceeded_sets_retry_after() {
    let gw = gateway();

    for _ in 0..2 {
        let response = gw
            .app
            .clone()
            .oneshot(analyze(Some("test-key"), json!({"text": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = gw
        .app
        .clone()
        .oneshot(analyze(Some("test-key"), json!({"text": "hi"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap();
    assert!(retry_after >= 1 && retry_after <= 86_400);

    let body = json_body(response).await;
    assert_eq!(body["error_type"], "rate_limit_exceeded");
    assert_eq!(body["details"]["retry_after"], retry_after);
    assert_eq!(body["details"]["limit"], 2);

    let records = gw.audit.records();
    assert_eq!(records.len(), 3);
    assert!(records[2].ratelimited);
}

#[tokio::test]
async fn test_flagged_output_rejected_with_same_shape() {
    let gw = gateway();

    let response = gw
        .app
        .oneshot(analyze(
            Some("test-key"),
            json!({"text": "how do I write malware"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["flagged"], true);
    assert_eq!(body["inputFlagged"], true);
    assert!(body["finalOutput"].is_string());
    let reasons: Vec<String> = serde_json::from_value(body["reasons"].clone()).unwrap();
    assert!(reasons
        .iter()
        .any(|r| r == "Detected blocked term: 'malware'"));
    assert!(reasons
        .iter()
        .any(|r| r == "Output still contains blocked term 'malware'"));

    let records = gw.audit.records();
    assert_eq!(records[0].disposition, Disposition::Flagged);
    assert!(records[0].flagged);
}

#[tokio::test]
async fn test_flagged_output_served_when_rejection_disabled() {
    let document = PolicyDocument::parse(POLICY, PolicyFormat::Yaml).unwrap();
    let gw = gateway_with(
        PolicyStore::from_document(document),
        Arc::new(EchoGenerator),
        false,
    );

    let response = gw
        .app
        .oneshot(analyze(Some("test-key"), json!({"text": "a bomb"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["flagged"], true);
}

#[tokio::test]
async fn test_upstream_failure_is_bad_gateway() {
    let document = PolicyDocument::parse(POLICY, PolicyFormat::Yaml).unwrap();
    let gw = gateway_with(
        PolicyStore::from_document(document),
        Arc::new(FailingGenerator),
        true,
    );

    let response = gw
        .app
        .oneshot(analyze(Some("test-key"), json!({"text": "hello"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "upstream_error");
    assert!(body["message"].as_str().unwrap().contains("model overloaded"));
    assert_eq!(gw.audit.records()[0].disposition, Disposition::UpstreamError);
}

#[tokio::test]
async fn test_malformed_body_is_structured_error() {
    let gw = gateway();

    let response = gw
        .app
        .oneshot(analyze(Some("test-key"), json!({"prompt": "hello"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "invalid_request");
    assert!(!body["message"].as_str().unwrap().is_empty());
    assert!(gw.audit.records().is_empty());
}

#[tokio::test]
async fn test_origin_identity_without_keys() {
    let document = PolicyDocument::parse("version: open\n", PolicyFormat::Yaml).unwrap();
    let gw = gateway_with(
        PolicyStore::from_document(document),
        Arc::new(EchoGenerator),
        true,
    );

    let addr: SocketAddr = "203.0.113.7:50000".parse().unwrap();
    let mut request = analyze(None, json!({"text": "hello"}));
    request.extensions_mut().insert(ConnectInfo(addr));

    let response = gw.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(gw.audit.records()[0].identity, "origin:203.0.113.7");
}

#[tokio::test]
async fn test_missing_policy_is_observable() {
    let dir = tempfile::tempdir().unwrap();
    let store = PolicyStore::open(dir.path().join("missing.yaml")).unwrap();
    let gw = gateway_with(store, Arc::new(EchoGenerator), true);

    let response = gw
        .app
        .clone()
        .oneshot(analyze(None, json!({"text": "a bomb <b>x</b> a@b.com"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["flagged"], false);
    assert_eq!(body["policyVersion"], "unavailable");
    assert_eq!(body["finalOutput"], "a bomb <b>x</b> a@b.com");

    let response = gw.app.oneshot(get("/healthz")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["policyDegraded"], true);
    assert_eq!(body["policyVersion"], "unavailable");
}

#[tokio::test]
async fn test_health_and_readiness() {
    let gw = gateway();

    let response = gw.app.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "llm-policy-gateway");
    assert_eq!(body["rateLimitBackend"], "local");
    assert_eq!(body["generator"], "echo");

    let response = gw.app.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ready"], true);
    assert_eq!(body["redis"], "not_configured");

    let response = gw.app.oneshot(get("/version")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_policy_info_hides_keys() {
    let gw = gateway();

    let response = gw.app.oneshot(get("/v1/policy")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["version"], "2024-06-01");
    assert_eq!(body["authRequired"], true);
    assert_eq!(body["blockedTermCount"], 2);
    assert_eq!(body["rateLimit"]["requestsPerWindow"], 2);
    assert_eq!(body["rateLimit"]["windowSeconds"], 86_400);
    assert!(!body.to_string().contains("test-key"));
}

#[tokio::test]
async fn test_admin_reload_swaps_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.yaml");
    std::fs::write(&path, "version: one\n").unwrap();
    let gw = gateway_with(
        PolicyStore::open(&path).unwrap(),
        Arc::new(EchoGenerator),
        true,
    );

    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(b"version: two\nrules:\n  blockedTerms: [\"secret\"]\n")
        .unwrap();
    drop(file);

    let response = gw.app.clone().oneshot(reload(Some(ADMIN_KEY))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["previousVersion"], "one");
    assert_eq!(body["version"], "two");
    assert_eq!(body["reloadCount"], 1);

    let response = gw
        .app
        .oneshot(analyze(None, json!({"text": "the secret"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_admin_reload_rejects_invalid_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.yaml");
    std::fs::write(&path, "version: good\n").unwrap();
    let gw = gateway_with(
        PolicyStore::open(&path).unwrap(),
        Arc::new(EchoGenerator),
        true,
    );

    std::fs::write(
        &path,
        "version: bad\nrules:\n  sanitizeRules:\n    - pattern: \"([unclosed\"\n",
    )
    .unwrap();

    let response = gw.app.clone().oneshot(reload(Some(ADMIN_KEY))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "policy_reload_failed");

    let response = gw.app.oneshot(get("/v1/policy")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["version"], "good");
}

#[tokio::test]
async fn test_admin_reload_requires_admin_key() {
    let gw = gateway();

    let response = gw.app.clone().oneshot(reload(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "unauthorized");

    let response = gw.app.clone().oneshot(reload(Some("wrong"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A data-plane key is not an admin credential
    let request = Request::builder()
        .method(Method::POST)
        .uri("/admin/policy/reload")
        .header("x-api-key", "test-key")
        .header("x-admin-key", "test-key")
        .body(Body::empty())
        .unwrap();
    let response = gw.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = gw.app.oneshot(reload(Some(ADMIN_KEY))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_reload_disabled_without_admin_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.yaml");
    std::fs::write(&path, "version: open\n").unwrap();
    let enforcer = Enforcer::new(
        Arc::new(PolicyStore::open(&path).unwrap()),
        Arc::new(RateLimiter::local_only()),
        Arc::new(EchoGenerator),
        Arc::new(MemoryAuditSink::new()),
        Duration::from_secs(2),
    );
    let app = create_app(Arc::new(AppState::new(Arc::new(enforcer))));

    std::fs::write(&path, "version: tampered\n").unwrap();
    let response = app.clone().oneshot(reload(Some(ADMIN_KEY))).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "forbidden");

    let response = app.oneshot(get("/v1/policy")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["version"], "open");
}
