// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Json, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::{future::Future, net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::errors::ApiError;
use super::handlers::{
    AnalyzeRequest, AnalyzeResponse, HealthResponse, PolicyInfo, ReadyResponse, ReloadResponse,
};
use crate::enforcement::{EnforcementRequest, Enforcer, Verdict};
use crate::version;

/// Header carrying the caller's API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the operator key for admin routes
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Shared state behind every route
pub struct AppState {
    pub enforcer: Arc<Enforcer>,
    /// Serve FLAGGED results with 422 instead of 200
    pub reject_flagged_output: bool,
    /// Fail readiness when the shared rate-limit backend is down
    pub ready_requires_redis: bool,
    /// Operator key for admin routes; admin routes are disabled when unset
    pub admin_api_key: Option<String>,
}

impl AppState {
    pub fn new(enforcer: Arc<Enforcer>) -> Self {
        Self {
            enforcer,
            reject_flagged_output: true,
            ready_requires_redis: false,
            admin_api_key: None,
        }
    }
}

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/analyze", post(analyze_handler))
        .route("/healthz", get(health_handler))
        .route("/readyz", get(ready_handler))
        .route("/version", get(version_handler))
        .route("/v1/policy", get(policy_handler))
        .route("/admin/policy/reload", post(reload_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn start_server(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Policy gateway listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return ApiErrorResponse::new(ApiError::InvalidRequest(rejection.body_text()), None)
                .into_response()
        }
    };

    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let origin = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let enforcement = state
        .enforcer
        .enforce(EnforcementRequest {
            api_key,
            origin,
            text: request.text,
        })
        .await;
    let request_id = enforcement.request_id;

    match enforcement.verdict {
        Verdict::Allowed(report) => {
            Json(AnalyzeResponse::from_report(request_id, &report)).into_response()
        }
        Verdict::Flagged(report) => {
            let status = if state.reject_flagged_output {
                StatusCode::UNPROCESSABLE_ENTITY
            } else {
                StatusCode::OK
            };
            (status, Json(AnalyzeResponse::from_report(request_id, &report))).into_response()
        }
        Verdict::RateLimited(quota) => {
            ApiErrorResponse::new(quota.into(), Some(request_id)).into_response()
        }
        Verdict::Unauthorized(e) => ApiErrorResponse::new(e.into(), Some(request_id)).into_response(),
        Verdict::UpstreamError(e) => ApiErrorResponse::new(e.into(), Some(request_id)).into_response(),
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let policy = state.enforcer.policies().current();
    let limiter = state.enforcer.limiter();
    let rate_limit_backend = if !limiter.has_shared_backend() {
        "local"
    } else if limiter.is_degraded() {
        "local-fallback"
    } else {
        "shared"
    };
    let degraded = policy.is_degraded() || limiter.is_degraded();

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "ok" }.to_string(),
        service: "llm-policy-gateway".to_string(),
        version: version::VERSION.to_string(),
        policy_version: policy.version.clone(),
        policy_degraded: policy.is_degraded(),
        rate_limit_backend: rate_limit_backend.to_string(),
        generator: state.enforcer.generator_name().to_string(),
    })
}

async fn ready_handler(State(state): State<Arc<AppState>>) -> Response {
    let (ready, redis) = match state.enforcer.limiter().shared_backend_healthy().await {
        None => (true, "not_configured"),
        Some(true) => (true, "ok"),
        Some(false) => (!state.ready_requires_redis, "unavailable"),
    };
    debug!(ready, redis, "Readiness probe");

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyResponse {
            ready,
            redis: redis.to_string(),
        }),
    )
        .into_response()
}

async fn version_handler() -> Json<serde_json::Value> {
    Json(version::get_version_info())
}

async fn policy_handler(State(state): State<Arc<AppState>>) -> Json<PolicyInfo> {
    let store = state.enforcer.policies();
    let policy = store.current();
    Json(PolicyInfo {
        version: policy.version.clone(),
        degraded: policy.is_degraded(),
        reload_count: store.reload_count(),
        auth_required: policy.requires_api_key(),
        rate_limit: policy.rate_limit,
        blocked_term_count: policy.blocked_terms.len(),
        sanitize_rule_count: policy.sanitize_rules.len(),
        redact_pii: policy.redact_pii,
        max_output_length: policy.max_output_length,
        block_flagged_input: policy.block_flagged_input,
    })
}

async fn reload_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ReloadResponse>, ApiErrorResponse> {
    authorize_admin(&state, &headers).map_err(|e| ApiErrorResponse::new(e, None))?;

    let store = state.enforcer.policies();
    let previous_version = store.version();
    let document = store
        .reload()
        .map_err(|e| ApiErrorResponse::new(e.into(), None))?;

    Ok(Json(ReloadResponse {
        previous_version,
        version: document.version.clone(),
        reload_count: store.reload_count(),
    }))
}

/// Admin routes accept only the operator key, never a data-plane API key
fn authorize_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.admin_api_key.as_deref() else {
        return Err(ApiError::Forbidden(
            "Admin routes are disabled; set ADMIN_API_KEY to enable them".to_string(),
        ));
    };
    match headers.get(ADMIN_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        Some(key) if key == expected => Ok(()),
        Some(_) => Err(ApiError::Unauthorized("Admin key not recognised".to_string())),
        None => Err(ApiError::Unauthorized("Admin key required".to_string())),
    }
}

// Error response wrapper
pub struct ApiErrorResponse {
    error: ApiError,
    request_id: Option<String>,
}

impl ApiErrorResponse {
    pub fn new(error: ApiError, request_id: Option<String>) -> Self {
        Self { error, request_id }
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after = self.error.retry_after();
        let error_response = self.error.to_response(self.request_id);

        let mut response = (status, Json(error_response)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
