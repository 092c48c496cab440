// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `POST /api/chat`: enqueue a message-processing job and wait for its
//! terminal progress event.

use axum::extract::State;
use axum::Json;
use sc_core::job::{JobPayload, JobSpec};
use sc_core::ProgressKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ApiError, AppState};
use crate::waiters::wait_terminal;

/// The gateway's own channel id.
pub const GATEWAY_CHANNEL: &str = "gateway";
/// Terminal wait budget for a chat request.
const CHAT_WAIT: Duration = Duration::from_secs(120);

#[derive(Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(ApiError::bad_request("text must not be empty"));
    }

    let payload = JobPayload::MessageProcessing {
        channel_id: GATEWAY_CHANNEL.to_string(),
        text: request.text,
        attachments: vec![],
        reply_to: None,
    };
    let enqueued = state
        .runtime
        .broker
        .enqueue(JobSpec::new(payload))
        .await
        .map_err(ApiError::internal)?;
    let job_id = enqueued.id().to_string();

    let event = wait_terminal(
        &state.runtime.waiters,
        &state.runtime.progress,
        GATEWAY_CHANNEL,
        &job_id,
        CHAT_WAIT,
    )
    .await;

    Ok(Json(match event {
        Some(event) if event.kind == ProgressKind::Complete => ChatResponse {
            job_id,
            response: event.result,
            error: None,
            file_path: event.file_path,
            caption: event.caption,
        },
        Some(event) => ChatResponse {
            job_id,
            response: None,
            error: event.error.or(Some("processing failed".into())),
            file_path: None,
            caption: None,
        },
        None => ChatResponse {
            job_id,
            response: None,
            error: Some("timed out waiting for a response".into()),
            file_path: None,
            caption: None,
        },
    }))
}
