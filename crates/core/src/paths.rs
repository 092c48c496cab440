// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandboxed path resolution.
//!
//! Every request path that becomes a filesystem path — worker workspace
//! serving, gateway file access, skill ids — goes through [`resolve_under`].
//! Resolution is lexical (the target may not exist yet): `..` is normalized
//! component-wise and rejected when it pops past the root.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path '{0}' escapes the sandbox root")]
    Escape(String),

    #[error("path contains NUL byte")]
    NulByte,

    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),
}

/// Resolve `requested` under `root`, rejecting NUL bytes, traversal past
/// the root, and absolute paths that leave it.
pub fn resolve_under(root: &Path, requested: &str) -> Result<PathBuf, PathError> {
    if requested.contains('\0') {
        return Err(PathError::NulByte);
    }

    let candidate = Path::new(requested);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(PathError::Escape(requested.to_string()));
                }
            }
            other => normalized.push(other),
        }
    }

    if !normalized.starts_with(root) {
        return Err(PathError::Escape(requested.to_string()));
    }
    Ok(normalized)
}

/// Resolve for serving: the target must exist and be a regular file.
pub fn resolve_file(root: &Path, requested: &str) -> Result<PathBuf, PathError> {
    let path = resolve_under(root, requested)?;
    let meta = std::fs::metadata(&path).map_err(|_| PathError::NotAFile(path.clone()))?;
    if !meta.is_file() {
        return Err(PathError::NotAFile(path));
    }
    Ok(path)
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
