// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File surfaces: workspace read/write, identity (mind) files, binary file
//! serving with MIME sniffing rules, and skill bundle zips for workers.

use axum::extract::{Path as RoutePath, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sc_core::paths::{resolve_file, resolve_under, PathError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;

use super::{ApiError, AppState};
use crate::orchestrator::prompt::IDENTITY_FILES;

#[derive(Deserialize)]
pub struct PathQuery {
    pub path: String,
}

fn path_error(e: PathError) -> ApiError {
    match e {
        PathError::NotAFile(_) => ApiError::not_found("no such file"),
        _ => ApiError::forbidden("path rejected"),
    }
}

// --- workspace ---

pub async fn workspace_list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let root = state.runtime.setup.workspace_dir();
    let mut files = Vec::new();
    collect_files(&root, &root, &mut files)?;
    files.sort();
    Ok(Json(json!({ "files": files })))
}

fn collect_files(
    root: &Path,
    dir: &Path,
    out: &mut Vec<String>,
) -> Result<(), ApiError> {
    let Ok(entries) = std::fs::read_dir(dir) else { return Ok(()) };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_string_lossy().into_owned());
        }
    }
    Ok(())
}

pub async fn workspace_read(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Json<Value>, ApiError> {
    let root = state.runtime.setup.workspace_dir();
    let path = resolve_file(&root, &query.path).map_err(path_error)?;
    let content = std::fs::read_to_string(&path)
        .map_err(|_| ApiError::bad_request("file is not valid UTF-8"))?;
    Ok(Json(json!({ "path": query.path, "content": content })))
}

#[derive(Deserialize)]
pub struct WriteBody {
    pub path: String,
    pub content: String,
}

pub async fn workspace_write(
    State(state): State<AppState>,
    Json(body): Json<WriteBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let root = state.runtime.setup.workspace_dir();
    let path = resolve_under(&root, &body.path).map_err(path_error)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(ApiError::internal)?;
    }
    std::fs::write(&path, &body.content).map_err(ApiError::internal)?;
    Ok((StatusCode::CREATED, Json(json!({ "written": body.path }))))
}

pub async fn workspace_append(
    State(state): State<AppState>,
    Json(body): Json<WriteBody>,
) -> Result<Json<Value>, ApiError> {
    let root = state.runtime.setup.workspace_dir();
    let path = resolve_under(&root, &body.path).map_err(path_error)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(ApiError::internal)?;
    file.write_all(body.content.as_bytes()).map_err(ApiError::internal)?;
    Ok(Json(json!({ "appended": body.path })))
}

// --- mind (identity files) ---

pub async fn mind_list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mind_dir = state.runtime.setup.home_dir.join("mind");
    let files: Vec<Value> = IDENTITY_FILES
        .iter()
        .map(|name| {
            let exists = mind_dir.join(name).is_file();
            json!({ "name": name, "exists": exists })
        })
        .collect();
    Ok(Json(json!({ "files": files })))
}

/// Only the fixed identity set is readable or writable here.
fn identity_file(name: &str) -> Result<&'static str, ApiError> {
    IDENTITY_FILES
        .iter()
        .find(|f| **f == name)
        .copied()
        .ok_or_else(|| ApiError::forbidden("not an identity file"))
}

pub async fn mind_read(
    State(state): State<AppState>,
    RoutePath(name): RoutePath<String>,
) -> Result<Json<Value>, ApiError> {
    let name = identity_file(&name)?;
    let path = state.runtime.setup.home_dir.join("mind").join(name);
    let content = std::fs::read_to_string(&path).unwrap_or_default();
    Ok(Json(json!({ "name": name, "content": content })))
}

#[derive(Deserialize)]
pub struct MindWrite {
    pub content: String,
}

pub async fn mind_write(
    State(state): State<AppState>,
    RoutePath(name): RoutePath<String>,
    Json(body): Json<MindWrite>,
) -> Result<Json<Value>, ApiError> {
    let name = identity_file(&name)?;
    let mind_dir = state.runtime.setup.home_dir.join("mind");
    std::fs::create_dir_all(&mind_dir).map_err(ApiError::internal)?;
    std::fs::write(mind_dir.join(name), &body.content).map_err(ApiError::internal)?;
    // Identity feeds the system prompt; rebuild it on next use.
    state.runtime.prompt.invalidate();
    Ok(Json(json!({ "written": name })))
}

// --- binary files ---

/// Inline for safe types; HTML/SVG (script-capable when inlined) are forced
/// to download with sniffing disabled.
pub async fn binary_file(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Response, ApiError> {
    let root = state.runtime.setup.workspace_dir();
    let path = resolve_file(&root, &query.path).map_err(path_error)?;
    let bytes = tokio::fs::read(&path).await.map_err(ApiError::internal)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let (content_type, disposition, nosniff) = mime_policy(&extension);

    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if nosniff {
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
    }
    Ok(response)
}

/// (content type, disposition, nosniff) per extension.
fn mime_policy(extension: &str) -> (&'static str, &'static str, bool) {
    match extension {
        "html" | "htm" => ("text/html", "attachment", true),
        "svg" => ("image/svg+xml", "attachment", true),
        "xml" => ("application/xml", "attachment", true),
        "png" => ("image/png", "inline", false),
        "jpg" | "jpeg" => ("image/jpeg", "inline", false),
        "gif" => ("image/gif", "inline", false),
        "webp" => ("image/webp", "inline", false),
        "pdf" => ("application/pdf", "inline", false),
        "txt" | "log" | "md" => ("text/plain; charset=utf-8", "inline", false),
        "json" => ("application/json", "inline", false),
        "csv" => ("text/csv", "inline", false),
        _ => ("application/octet-stream", "attachment", false),
    }
}

// --- skill bundles ---

/// Zip a skill directory for a fetching worker.
pub async fn skill_zip(
    State(state): State<AppState>,
    RoutePath(id): RoutePath<String>,
) -> Result<Response, ApiError> {
    let skills_dir = state.runtime.setup.skills_dir();
    let dir = resolve_under(&skills_dir, &id).map_err(path_error)?;
    if !dir.join("skill.json").is_file() {
        return Err(ApiError::not_found(format!("skill '{id}' not found")));
    }

    let bytes = tokio::task::spawn_blocking(move || zip_dir(&dir))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)?;

    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{id}.zip\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

fn zip_dir(dir: &Path) -> std::io::Result<Vec<u8>> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        add_dir_entries(&mut writer, dir, dir, options)?;
        writer.finish().map_err(std::io::Error::other)?;
    }
    Ok(cursor.into_inner())
}

fn add_dir_entries<W: std::io::Write + std::io::Seek>(
    writer: &mut zip::ZipWriter<W>,
    root: &Path,
    dir: &Path,
    options: zip::write::SimpleFileOptions,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            add_dir_entries(writer, root, &path, options)?;
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else { continue };
        let name = relative.to_string_lossy().into_owned();
        writer.start_file(name, options).map_err(std::io::Error::other)?;
        let contents = std::fs::read(&path)?;
        writer.write_all(&contents)?;
    }
    Ok(())
}
