// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;
use zip::write::SimpleFileOptions;

fn zip_bundle(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        for (name, contents) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

fn manifest_json() -> &'static str {
    r#"{"name":"demo","command":"python3 main.py","install":"pip install -r requirements.txt"}"#
}

#[test]
fn unpack_writes_nested_entries() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = zip_bundle(&[
        ("skill.json", manifest_json()),
        ("src/main.py", "print('hi')"),
    ]);
    unpack_zip(&bytes, dir.path(), "demo-skill").unwrap();
    assert!(dir.path().join("skill.json").is_file());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("src/main.py")).unwrap(),
        "print('hi')"
    );
}

#[test]
fn unpack_rejects_zip_slip() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = zip_bundle(&[("../evil.sh", "rm -rf /")]);
    let err = unpack_zip(&bytes, dir.path(), "demo-skill").unwrap_err();
    assert!(matches!(err, WorkerError::Bundle(_)));
    assert!(!dir.path().parent().unwrap().join("evil.sh").exists());
}

#[test]
fn manifest_parses_camel_case() {
    let raw = r#"{"name":"s","command":"node run.js","timeoutMs":45000,"language":"node"}"#;
    let manifest: SkillManifest = serde_json::from_str(raw).unwrap();
    assert_eq!(manifest.timeout_ms, Some(45_000));
    assert_eq!(manifest.language, Some(SkillLang::Node));
    assert_eq!(manifest.install, None);
}

fn cache_with_root(root: &Path) -> SkillCache {
    // Unroutable node URL: any accidental fetch fails loudly.
    SkillCache::new("http://127.0.0.1:1".into(), "token".into(), root.to_path_buf())
}

#[tokio::test]
async fn on_disk_bundle_is_loaded_without_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let skill_dir = dir.path().join("demo-skill");
    std::fs::create_dir_all(&skill_dir).unwrap();
    std::fs::write(skill_dir.join("skill.json"), manifest_json()).unwrap();

    let cache = cache_with_root(dir.path());
    let skill = cache.get("demo-skill").await.unwrap();
    assert_eq!(skill.manifest.name, "demo");
    assert_eq!(skill.dir, skill_dir);
}

#[tokio::test]
async fn cache_hits_return_the_same_entry() {
    let dir = tempfile::tempdir().unwrap();
    let skill_dir = dir.path().join("demo-skill");
    std::fs::create_dir_all(&skill_dir).unwrap();
    std::fs::write(skill_dir.join("skill.json"), manifest_json()).unwrap();

    let cache = cache_with_root(dir.path());
    let first = cache.get("demo-skill").await.unwrap();
    let second = cache.get("demo-skill").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn clear_drops_entries() {
    let dir = tempfile::tempdir().unwrap();
    let skill_dir = dir.path().join("demo-skill");
    std::fs::create_dir_all(&skill_dir).unwrap();
    std::fs::write(skill_dir.join("skill.json"), manifest_json()).unwrap();

    let cache = cache_with_root(dir.path());
    let first = cache.get("demo-skill").await.unwrap();
    cache.clear();
    let second = cache.get("demo-skill").await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn missing_bundle_with_unreachable_node_is_a_fetch_error() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_with_root(dir.path());
    let err = cache.get("absent").await.unwrap_err();
    assert!(matches!(err, WorkerError::Fetch(_)));
}

#[tokio::test]
async fn traversal_skill_id_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_with_root(dir.path());
    let err = cache.get("../outside").await.unwrap_err();
    assert!(matches!(err, WorkerError::Path(_)));
}
