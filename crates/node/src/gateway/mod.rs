// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP/WS gateway: the node's REST control plane and chat WebSocket.
//!
//! Bearer auth (constant-time, length-padded) guards everything except
//! `/health`, `/status`, and `/ws` (which authenticates its own upgrade);
//! the fixed-window rate limiter applies to `/api/*` only.

mod api;
mod chat;
mod files;
mod ws;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use sc_broker::{RateDecision, RateLimiter};
use sc_core::auth::{bearer_token, tokens_match};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::runtime::Runtime;

pub struct Gateway {
    pub runtime: Arc<Runtime>,
    pub rate: RateLimiter,
    pub started: Instant,
}

pub type AppState = Arc<Gateway>;

/// JSON error body with a status code; no stack traces reach clients.
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(error: impl std::fmt::Display) -> Self {
        warn!(error = %error, "internal gateway error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

impl From<crate::error::NodeError> for ApiError {
    fn from(e: crate::error::NodeError) -> Self {
        use crate::error::NodeError;
        match e {
            NodeError::Invalid(message) => ApiError::bad_request(message),
            NodeError::ScheduledJobNotFound(id) => {
                ApiError::not_found(format!("schedule {id} not found"))
            }
            NodeError::Broker(sc_broker::BrokerError::ActiveJob(id)) => {
                ApiError::conflict(format!("job {id} is active"))
            }
            NodeError::Broker(sc_broker::BrokerError::JobNotFound(id)) => {
                ApiError::not_found(format!("job {id} not found"))
            }
            other => ApiError::internal(other),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/chat", post(chat::chat))
        .route("/messages", get(api::messages_list).delete(api::messages_clear))
        .route("/scheduler", get(api::scheduler_list))
        .route("/scheduler/reminder", post(api::scheduler_create_reminder))
        .route(
            "/scheduler/recurrent-reminder",
            post(api::scheduler_create_recurrent_reminder),
        )
        .route("/scheduler/task", post(api::scheduler_create_task))
        .route("/scheduler/recurrent-task", post(api::scheduler_create_recurrent_task))
        .route("/scheduler/{id}", delete(api::scheduler_cancel))
        .route("/scheduler/{id}/purge", delete(api::scheduler_purge))
        .route("/scheduler/{id}/complete", post(api::scheduler_complete))
        .route("/vault", get(api::vault_list).post(api::vault_store))
        .route("/vault/rotate", post(api::vault_rotate))
        .route("/vault/{name}", delete(api::vault_delete))
        .route("/vault/{name}/reveal", get(api::vault_reveal))
        .route("/jobs", get(api::jobs_counts))
        .route("/jobs/counts", get(api::jobs_counts))
        .route("/jobs/{id}", get(api::job_get).delete(api::job_remove))
        .route("/jobs/{id}/retry", post(api::job_retry))
        .route("/jobs/{id}/cancel", post(api::job_cancel))
        .route("/jobs/{id}/complete", post(api::job_complete))
        .route("/jobs/{id}/fail", post(api::job_fail))
        .route("/usage", get(api::usage))
        .route("/budget", get(api::budget))
        .route("/workers", get(api::workers))
        .route("/pending", get(api::pending))
        .route("/memory/search", get(api::memory_search))
        .route("/mcp", get(api::mcp_list).post(api::mcp_add))
        .route("/mcp/{id}", delete(api::mcp_remove))
        .route("/mcp/{id}/reconnect", post(api::mcp_reconnect))
        .route("/workspace/files", get(files::workspace_list))
        .route(
            "/workspace/file",
            get(files::workspace_read)
                .post(files::workspace_write)
                .patch(files::workspace_append),
        )
        .route("/mind", get(files::mind_list))
        .route("/mind/{name}", get(files::mind_read).put(files::mind_write))
        .route("/files", get(files::binary_file))
        .route("/skills/{id}/zip", get(files::skill_zip))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/ws", get(ws::upgrade))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state.clone(), cors_middleware))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn status(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let processes = state.runtime.registry.list().await.map_err(ApiError::internal)?;
    Ok(Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.started.elapsed().as_secs(),
        "processes": processes,
    })))
}

/// Bearer auth with constant-time comparison.
async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let expected = state.runtime.config.read().auth_token.clone();
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    match presented {
        Some(token) if tokens_match(token, &expected) => next.run(request).await,
        _ => ApiError::new(StatusCode::UNAUTHORIZED, "invalid or missing token")
            .into_response(),
    }
}

/// Fixed window per client IP, `/api/*` only (this middleware is layered
/// on the nested api router).
async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    match state.rate.check(&addr.ip().to_string()).await {
        Ok(RateDecision::Allowed) => next.run(request).await,
        Ok(RateDecision::Limited { retry_after_secs }) => {
            let mut response =
                ApiError::new(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded")
                    .into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
        Err(e) => {
            // A broken limiter must not take the API down.
            warn!(error = %e, "rate limiter unavailable, allowing request");
            next.run(request).await
        }
    }
}

/// CORS evaluated per request from the current config.
async fn cors_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let allowed = origin.as_deref().is_some_and(|origin| {
        let config = state.runtime.config.read();
        config.cors_origins.iter().any(|o| o == origin || o == "*")
    });

    let mut response = if request.method() == Method::OPTIONS && allowed {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    if allowed {
        if let Some(origin) = origin {
            if let Ok(value) = HeaderValue::from_str(&origin) {
                let headers = response.headers_mut();
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
                );
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static("authorization, content-type"),
                );
            }
        }
    }
    response
}
