// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/ws`: duplex chat. Inbound `message` frames enqueue jobs; progress
//! events for those jobs stream back as JSON frames.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::StreamExt;
use sc_core::auth::tokens_match;
use sc_core::job::{JobPayload, JobSpec};
use sc_core::{ProgressEvent, ProgressKind};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, warn};

use super::chat::GATEWAY_CHANNEL;
use super::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub async fn upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle(state, query.token, socket))
}

async fn handle(state: AppState, token: Option<String>, mut socket: WebSocket) {
    // The socket authenticates via query token or an initial auth frame.
    let expected = state.runtime.config.read().auth_token.clone();
    let mut authed = token.as_deref().is_some_and(|t| tokens_match(t, &expected));
    if !authed {
        match socket.recv().await {
            Some(Ok(Message::Text(raw))) => {
                let presented = serde_json::from_str::<serde_json::Value>(&raw)
                    .ok()
                    .and_then(|v| v.get("token").and_then(|t| t.as_str()).map(String::from));
                authed = presented.is_some_and(|t| tokens_match(&t, &expected));
            }
            _ => {}
        }
        if !authed {
            let _ = socket
                .send(Message::Text(
                    json!({ "type": "error", "error": "unauthorized" }).to_string().into(),
                ))
                .await;
            return;
        }
    }

    let mut progress = match state.runtime.progress.subscribe_pattern().await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "ws progress subscription failed");
            return;
        }
    };

    // Only events for jobs submitted on this socket stream back.
    let mut my_jobs: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            frame = socket.recv() => {
                let Some(Ok(frame)) = frame else { break };
                match frame {
                    Message::Text(raw) => {
                        let Ok(inbound) = serde_json::from_str::<InboundFrame>(&raw) else {
                            continue;
                        };
                        match inbound.kind.as_str() {
                            "ping" => {
                                let _ = socket
                                    .send(Message::Text(json!({ "type": "pong" }).to_string().into()))
                                    .await;
                            }
                            "message" => {
                                let text = inbound.text.unwrap_or_default();
                                if text.trim().is_empty() {
                                    continue;
                                }
                                match submit(&state, text).await {
                                    Ok(job_id) => {
                                        debug!(job = %job_id, "ws message enqueued");
                                        my_jobs.insert(job_id);
                                    }
                                    Err(e) => {
                                        let _ = socket
                                            .send(Message::Text(
                                                json!({ "type": "error", "error": e }).to_string().into(),
                                            ))
                                            .await;
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            event = progress.next() => {
                let Some((channel_id, event)) = event else { break };
                if channel_id != GATEWAY_CHANNEL || !my_jobs.contains(&event.job_id) {
                    continue;
                }
                if event.is_terminal() {
                    my_jobs.remove(&event.job_id);
                }
                if let Some(frame) = outbound_frame(&event) {
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

async fn submit(state: &AppState, text: String) -> Result<String, String> {
    let payload = JobPayload::MessageProcessing {
        channel_id: GATEWAY_CHANNEL.to_string(),
        text,
        attachments: vec![],
        reply_to: None,
    };
    state
        .runtime
        .broker
        .enqueue(JobSpec::new(payload))
        .await
        .map(|enqueued| enqueued.id().to_string())
        .map_err(|e| e.to_string())
}

/// Map progress events to wire frames; narration shows as typing.
fn outbound_frame(event: &ProgressEvent) -> Option<String> {
    let frame = match event.kind {
        ProgressKind::Complete => json!({
            "type": "response",
            "text": event.result,
            "jobId": event.job_id,
        }),
        ProgressKind::Error => json!({
            "type": "error",
            "error": event.error,
            "jobId": event.job_id,
        }),
        ProgressKind::Typing | ProgressKind::Progress => json!({
            "type": "typing",
            "jobId": event.job_id,
        }),
        ProgressKind::File => json!({
            "type": "file",
            "filePath": event.file_path,
            "caption": event.caption,
            "jobId": event.job_id,
        }),
    };
    Some(frame.to_string())
}
