// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress events published on `progress:{channelId}`.
//!
//! Events are ephemeral: delivery is best-effort pub/sub, with a short-lived
//! per-job buffer as the reconnect fallback.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    Progress,
    Complete,
    Error,
    Typing,
    File,
}

crate::simple_display! {
    ProgressKind {
        Progress => "progress",
        Complete => "complete",
        Error => "error",
        Typing => "typing",
        File => "file",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: String,
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_image: Option<bool>,
}

impl ProgressEvent {
    fn bare(job_id: impl Into<String>, kind: ProgressKind) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
            message: None,
            result: None,
            error: None,
            file_path: None,
            caption: None,
            url: None,
            name: None,
            is_image: None,
        }
    }

    pub fn progress(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), ..Self::bare(job_id, ProgressKind::Progress) }
    }

    pub fn complete(job_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self { result: Some(result.into()), ..Self::bare(job_id, ProgressKind::Complete) }
    }

    pub fn error(job_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self { error: Some(error.into()), ..Self::bare(job_id, ProgressKind::Error) }
    }

    pub fn typing(job_id: impl Into<String>) -> Self {
        Self::bare(job_id, ProgressKind::Typing)
    }

    pub fn file(
        job_id: impl Into<String>,
        file_path: impl Into<String>,
        caption: Option<String>,
    ) -> Self {
        Self {
            file_path: Some(file_path.into()),
            caption,
            ..Self::bare(job_id, ProgressKind::File)
        }
    }

    /// Terminal events end a waiter: at most one per job reaches subscribers last.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, ProgressKind::Complete | ProgressKind::Error)
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
