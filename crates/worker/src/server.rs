// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker HTTP surface: workspace-scoped file serving for the node's
//! file-transfer endpoint.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use sc_core::auth::{bearer_token, tokens_match};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use sc_core::paths::{resolve_file, PathError};

pub struct ServerState {
    pub workspace: PathBuf,
    pub auth_token: String,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/worker/workspace", get(workspace_file))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct FileQuery {
    path: String,
}

async fn workspace_file(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Query(query): Query<FileQuery>,
) -> Response {
    if !authorized(&headers, &state.auth_token) {
        return error_response(StatusCode::UNAUTHORIZED, "invalid or missing token");
    }

    let path = match resolve_file(&state.workspace, &query.path) {
        Ok(path) => path,
        Err(PathError::NotAFile(_)) => {
            return error_response(StatusCode::NOT_FOUND, "no such file");
        }
        Err(_) => return error_response(StatusCode::FORBIDDEN, "path rejected"),
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!(path = %path.display(), size = bytes.len(), "serving workspace file");
            ([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response()
        }
        Err(_) => error_response(StatusCode::NOT_FOUND, "no such file"),
    }
}

fn authorized(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .is_some_and(|token| tokens_match(token, expected))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
