// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn root() -> PathBuf {
    PathBuf::from("/srv/worker/workspace")
}

#[parameterized(
    plain = { "out/result.json", "/srv/worker/workspace/out/result.json" },
    dotted = { "./a/./b.txt", "/srv/worker/workspace/a/b.txt" },
    inner_parent = { "a/b/../c.txt", "/srv/worker/workspace/a/c.txt" },
    absolute_inside = { "/srv/worker/workspace/x.bin", "/srv/worker/workspace/x.bin" },
)]
fn contained_paths_resolve(requested: &str, expected: &str) {
    let resolved = resolve_under(&root(), requested).unwrap();
    assert_eq!(resolved, PathBuf::from(expected));
}

#[parameterized(
    parent_escape = { "../../etc/passwd" },
    deep_escape = { "a/../../../etc/passwd" },
    absolute_outside = { "/etc/passwd" },
    sibling = { "/srv/worker/workspace2/x" },
)]
fn escaping_paths_rejected(requested: &str) {
    assert!(matches!(resolve_under(&root(), requested), Err(PathError::Escape(_))));
}

#[test]
fn nul_byte_rejected() {
    assert!(matches!(resolve_under(&root(), "a\0b"), Err(PathError::NulByte)));
}

#[test]
fn every_accepted_path_is_within_root() {
    let root = root();
    for requested in ["x", "a/b/c", "./q", "deep/../flat"] {
        let resolved = resolve_under(&root, requested).unwrap();
        assert!(resolved.starts_with(&root), "{requested} resolved outside root");
    }
}

#[test]
fn serving_requires_a_regular_file() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();

    assert!(matches!(resolve_file(&root, "missing.txt"), Err(PathError::NotAFile(_))));

    std::fs::create_dir(root.join("subdir")).unwrap();
    assert!(matches!(resolve_file(&root, "subdir"), Err(PathError::NotAFile(_))));

    std::fs::write(root.join("ok.txt"), "hi").unwrap();
    assert!(resolve_file(&root, "ok.txt").is_ok());
}
