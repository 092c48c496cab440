// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST control plane: scheduler, vault, jobs, usage, workers, memory, MCP.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use sc_core::job::{JobPayload, JobSpec};
use sc_core::keyspace;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::chat::GATEWAY_CHANNEL;
use super::{ApiError, AppState};
use crate::scheduler::RecurrenceSpec;

// --- messages ---

#[derive(Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn messages_list(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let turns = state
        .runtime
        .deps
        .store
        .recent(GATEWAY_CHANNEL, query.limit.min(500))
        .await?;
    Ok(Json(json!({ "messages": turns })))
}

pub async fn messages_clear(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let removed = state.runtime.deps.store.clear(GATEWAY_CHANNEL).await?;
    Ok(Json(json!({ "removed": removed })))
}

// --- scheduler ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOneShot {
    pub description: String,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

impl CreateOneShot {
    fn delay(&self) -> Result<u64, ApiError> {
        if let Some(delay_ms) = self.delay_ms {
            return Ok(delay_ms);
        }
        if let Some(run_at) = self.run_at {
            let delta = run_at.signed_duration_since(Utc::now()).num_milliseconds();
            return Ok(delta.max(0) as u64);
        }
        Err(ApiError::bad_request("delayMs or runAt is required"))
    }

    fn channel(&self) -> &str {
        self.channel_id.as_deref().unwrap_or(GATEWAY_CHANNEL)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecurrent {
    pub description: String,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub interval_ms: Option<u64>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

impl CreateRecurrent {
    fn recurrence(&self) -> Result<RecurrenceSpec, ApiError> {
        if self.cron.is_none() && self.interval_ms.is_none() {
            return Err(ApiError::bad_request("cron or intervalMs is required"));
        }
        Ok(RecurrenceSpec {
            cron: self.cron.clone(),
            interval_ms: self.interval_ms,
            timezone: self.timezone.clone(),
        })
    }

    fn channel(&self) -> &str {
        self.channel_id.as_deref().unwrap_or(GATEWAY_CHANNEL)
    }
}

pub async fn scheduler_list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let rows = state.runtime.scheduler.list_all().await?;
    Ok(Json(json!({ "scheduled": rows })))
}

pub async fn scheduler_create_reminder(
    State(state): State<AppState>,
    Json(body): Json<CreateOneShot>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = state
        .runtime
        .scheduler
        .create_reminder(body.channel(), &body.description, body.delay()?)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn scheduler_create_task(
    State(state): State<AppState>,
    Json(body): Json<CreateOneShot>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = state
        .runtime
        .scheduler
        .create_task(body.channel(), &body.description, body.delay()?)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn scheduler_create_recurrent_reminder(
    State(state): State<AppState>,
    Json(body): Json<CreateRecurrent>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = state
        .runtime
        .scheduler
        .create_recurrent_reminder(body.channel(), &body.description, body.recurrence()?)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn scheduler_create_recurrent_task(
    State(state): State<AppState>,
    Json(body): Json<CreateRecurrent>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = state
        .runtime
        .scheduler
        .create_recurrent_task(body.channel(), &body.description, body.recurrence()?)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

fn parse_schedule_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| ApiError::bad_request("invalid schedule id"))
}

pub async fn scheduler_cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.runtime.scheduler.cancel(parse_schedule_id(&id)?).await?;
    Ok(Json(json!({ "cancelled": id })))
}

pub async fn scheduler_complete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.runtime.scheduler.complete(parse_schedule_id(&id)?).await?;
    Ok(Json(json!({ "completed": id })))
}

pub async fn scheduler_purge(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.runtime.scheduler.purge(parse_schedule_id(&id)?).await?;
    Ok(Json(json!({ "purged": id })))
}

// --- vault ---

#[derive(Deserialize)]
pub struct VaultStore {
    pub name: String,
    pub value: String,
}

pub async fn vault_list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let names = state.runtime.vault.list().await.map_err(ApiError::internal)?;
    Ok(Json(json!({ "secrets": names })))
}

pub async fn vault_store(
    State(state): State<AppState>,
    Json(body): Json<VaultStore>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    state
        .runtime
        .vault
        .store(body.name.trim(), &body.value)
        .await
        .map_err(ApiError::internal)?;
    Ok((StatusCode::CREATED, Json(json!({ "stored": body.name.trim() }))))
}

pub async fn vault_delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.runtime.vault.delete(&name).await.map_err(ApiError::internal)?;
    if !removed {
        return Err(ApiError::not_found(format!("secret '{name}' not found")));
    }
    Ok(Json(json!({ "deleted": name })))
}

pub async fn vault_reveal(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.runtime.vault.resolve(&name).await.map_err(ApiError::internal)? {
        Some(value) => Ok(Json(json!({ "name": name, "value": value }))),
        None => Err(ApiError::not_found(format!("secret '{name}' not found"))),
    }
}

/// Rotation runs as a system-queue job so it survives gateway restarts.
pub async fn vault_rotate(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let enqueued = state
        .runtime
        .broker
        .enqueue(JobSpec::new(JobPayload::VaultKeyRotation {}))
        .await
        .map_err(ApiError::internal)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "jobId": enqueued.id() }))))
}

// --- jobs ---

pub async fn jobs_counts(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let counts = state.runtime.broker.counts().await.map_err(ApiError::internal)?;
    let by_queue: serde_json::Map<String, Value> = counts
        .into_iter()
        .map(|(queue, c)| (queue.to_string(), json!(c)))
        .collect();
    Ok(Json(Value::Object(by_queue)))
}

pub async fn job_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.runtime.broker.job(&id).await.map_err(ApiError::internal)? {
        Some(record) => Ok(Json(serde_json::to_value(record).map_err(ApiError::internal)?)),
        None => Err(ApiError::not_found(format!("job {id} not found"))),
    }
}

pub async fn job_remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let removed = state
        .runtime
        .broker
        .remove(&id)
        .await
        .map_err(crate::error::NodeError::from)?;
    if !removed {
        return Err(ApiError::not_found(format!("job {id} not found")));
    }
    Ok(Json(json!({ "removed": id })))
}

pub async fn job_retry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .runtime
        .broker
        .retry(&id)
        .await
        .map_err(crate::error::NodeError::from)?;
    Ok(Json(json!({ "retried": id })))
}

/// Best-effort cancellation: abort signal, poll flag, and PID kill.
pub async fn job_cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .runtime
        .cancel
        .request_job_cancel(&id)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "cancelRequested": id })))
}

pub async fn job_complete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .runtime
        .broker
        .force_complete(&id)
        .await
        .map_err(crate::error::NodeError::from)?;
    Ok(Json(json!({ "completed": id })))
}

pub async fn job_fail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .runtime
        .broker
        .force_fail(&id, "failed by operator")
        .await
        .map_err(crate::error::NodeError::from)?;
    Ok(Json(json!({ "failed": id })))
}

pub async fn pending(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let counts = state.runtime.broker.counts().await.map_err(ApiError::internal)?;
    let waiting: u64 = counts.values().map(|c| c.waiting + c.prioritized + c.delayed).sum();
    let active: u64 = counts.values().map(|c| c.active).sum();
    Ok(Json(json!({ "waiting": waiting, "active": active })))
}

// --- usage / budget / workers ---

pub async fn usage(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let totals = state.runtime.budget.totals().await?;
    Ok(Json(serde_json::to_value(totals).map_err(ApiError::internal)?))
}

pub async fn budget(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let totals = state.runtime.budget.totals().await?;
    Ok(Json(json!({
        "limits": state.runtime.budget.config(),
        "usage": totals,
    })))
}

pub async fn workers(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let processes = state.runtime.registry.list().await.map_err(ApiError::internal)?;
    let counts = state.runtime.broker.counts().await.map_err(ApiError::internal)?;
    let tools = counts.get(&sc_core::job::QueueName::Tools).cloned().unwrap_or_default();
    Ok(Json(json!({
        "processes": processes,
        "toolsQueue": tools,
    })))
}

// --- memory ---

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

pub async fn memory_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let hits = state.runtime.deps.memory.search(&query.q, query.limit.min(100)).await?;
    Ok(Json(json!({ "results": hits })))
}

// --- mcp ---

#[derive(Deserialize)]
pub struct McpAdd {
    pub id: String,
    pub url: String,
}

pub async fn mcp_list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let servers = state.runtime.config.read().mcp_servers.clone();
    Ok(Json(json!({ "servers": servers })))
}

pub async fn mcp_add(
    State(state): State<AppState>,
    Json(body): Json<McpAdd>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let updated = {
        let mut config = state.runtime.config.write();
        config.mcp_servers.retain(|s| s.id != body.id);
        config.mcp_servers.push(crate::runtime::McpServer {
            id: body.id.clone(),
            url: body.url,
        });
        config.clone()
    };
    persist_config_and_reload(&state, &updated).await?;
    Ok((StatusCode::CREATED, Json(json!({ "added": body.id }))))
}

pub async fn mcp_remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let updated = {
        let mut config = state.runtime.config.write();
        let before = config.mcp_servers.len();
        config.mcp_servers.retain(|s| s.id != id);
        if config.mcp_servers.len() == before {
            return Err(ApiError::not_found(format!("mcp server '{id}' not found")));
        }
        config.clone()
    };
    persist_config_and_reload(&state, &updated).await?;
    Ok(Json(json!({ "removed": id })))
}

pub async fn mcp_reconnect(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    publish_reload(&state, keyspace::MCP_RELOAD_CHANNEL).await?;
    Ok(Json(json!({ "reconnecting": id })))
}

async fn persist_config_and_reload(
    state: &AppState,
    config: &crate::runtime::NodeConfig,
) -> Result<(), ApiError> {
    let mut conn = state.runtime.conn.clone();
    conn.set::<_, _, ()>(
        keyspace::config_key(),
        serde_json::to_string(config).map_err(ApiError::internal)?,
    )
    .await
    .map_err(ApiError::internal)?;
    publish_reload(state, keyspace::MCP_RELOAD_CHANNEL).await?;
    state.runtime.prompt.invalidate();
    Ok(())
}

async fn publish_reload(state: &AppState, channel: &str) -> Result<(), ApiError> {
    let mut conn = state.runtime.conn.clone();
    conn.publish::<_, _, ()>(channel, "reload").await.map_err(ApiError::internal)?;
    Ok(())
}
