// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact rewriting: absolute workspace paths in skill output become
//! workspace-relative references the node's file-transfer endpoint can
//! fetch back.

use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;

/// Rewrite a skill's stdout. JSON objects are rewritten in place; plain
/// text gains a JSON wrapper only when it references workspace files.
/// Stdout with no workspace paths is returned unchanged.
pub fn rewrite_stdout(stdout: &str, workspace: &Path, process_id: &str) -> String {
    let prefix = workspace_prefix(workspace);

    if let Ok(mut value) = serde_json::from_str::<Value>(stdout) {
        if value.is_object() {
            let mut files = BTreeSet::new();
            rewrite_value(&mut value, &prefix, &mut files);
            if !files.is_empty() {
                if let Some(obj) = value.as_object_mut() {
                    obj.insert(
                        "_workerFiles".into(),
                        Value::Array(files.into_iter().map(Value::String).collect()),
                    );
                    obj.insert("_workerProcessId".into(), Value::String(process_id.into()));
                }
                return value.to_string();
            }
            return stdout.to_string();
        }
    }

    let (rewritten, files) = rewrite_text(stdout, &prefix);
    if files.is_empty() {
        return stdout.to_string();
    }
    serde_json::json!({
        "output": rewritten,
        "_workerFiles": files.into_iter().collect::<Vec<_>>(),
        "_workerProcessId": process_id,
    })
    .to_string()
}

/// The workspace root with a trailing separator, as it appears in output.
fn workspace_prefix(workspace: &Path) -> String {
    let mut prefix = workspace.to_string_lossy().into_owned();
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

fn rewrite_value(value: &mut Value, prefix: &str, files: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            let (rewritten, found) = rewrite_text(s, prefix);
            if !found.is_empty() {
                *s = rewritten;
                files.extend(found);
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_value(item, prefix, files);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                rewrite_value(v, prefix, files);
            }
        }
        _ => {}
    }
}

/// Replace every `{workspace}/rel` occurrence with `rel`; collect the rels.
fn rewrite_text(text: &str, prefix: &str) -> (String, BTreeSet<String>) {
    let mut files = BTreeSet::new();
    if !text.contains(prefix) {
        return (text.to_string(), files);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find(prefix) {
        out.push_str(&rest[..at]);
        let tail = &rest[at + prefix.len()..];
        let end = tail
            .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ')' | ']' | '}' | ','))
            .unwrap_or(tail.len());
        let rel = &tail[..end];
        if rel.is_empty() {
            out.push_str(prefix);
            rest = tail;
            continue;
        }
        files.insert(rel.to_string());
        out.push_str(rel);
        rest = &tail[end..];
    }
    out.push_str(rest);
    (out, files)
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
