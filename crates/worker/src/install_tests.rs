// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn install_log_lines(dir: &Path) -> usize {
    std::fs::read_to_string(dir.join("install.log"))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

#[tokio::test]
async fn install_runs_once_and_writes_marker() {
    let dir = tempfile::tempdir().unwrap();
    let installer = Installer::new();
    installer
        .ensure_installed("demo", dir.path(), Some("echo ran >> install.log"), None)
        .await
        .unwrap();
    assert_eq!(install_log_lines(dir.path()), 1);
    assert!(dir.path().join(INSTALL_MARKER).exists());
}

#[tokio::test]
async fn second_install_with_unchanged_inputs_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let installer = Installer::new();
    for _ in 0..2 {
        installer
            .ensure_installed("demo", dir.path(), Some("echo ran >> install.log"), None)
            .await
            .unwrap();
    }
    assert_eq!(install_log_lines(dir.path()), 1);
}

#[tokio::test]
async fn changed_command_reinstalls() {
    let dir = tempfile::tempdir().unwrap();
    let installer = Installer::new();
    installer
        .ensure_installed("demo", dir.path(), Some("echo a >> install.log"), None)
        .await
        .unwrap();
    installer
        .ensure_installed("demo", dir.path(), Some("echo b >> install.log"), None)
        .await
        .unwrap();
    assert_eq!(install_log_lines(dir.path()), 2);
}

#[tokio::test]
async fn changed_dep_file_reinstalls() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("package.json"), "{\"v\":1}").unwrap();
    // node runtime may be absent in CI; no language hint keeps the runtime
    // check out while still fingerprinting dep files explicitly.
    let a = fingerprint("install", dir.path(), Some(SkillLang::Node));
    std::fs::write(dir.path().join("package.json"), "{\"v\":2}").unwrap();
    let b = fingerprint("install", dir.path(), Some(SkillLang::Node));
    assert_ne!(a, b);
}

#[tokio::test]
async fn concurrent_installs_single_flight() {
    let dir = tempfile::tempdir().unwrap();
    let installer = Arc::new(Installer::new());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let installer = Arc::clone(&installer);
        let path = dir.path().to_path_buf();
        handles.push(tokio::spawn(async move {
            installer
                .ensure_installed(
                    "demo",
                    &path,
                    Some("sleep 0.1; echo ran >> install.log"),
                    None,
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(install_log_lines(dir.path()), 1);
}

#[tokio::test]
async fn failing_install_is_an_error_and_leaves_no_marker() {
    let dir = tempfile::tempdir().unwrap();
    let installer = Installer::new();
    let err = installer
        .ensure_installed("demo", dir.path(), Some("echo boom >&2; exit 2"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::Install { .. }));
    assert!(!dir.path().join(INSTALL_MARKER).exists());
}

#[tokio::test]
async fn no_install_command_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let installer = Installer::new();
    installer.ensure_installed("demo", dir.path(), None, None).await.unwrap();
    assert!(!dir.path().join(INSTALL_MARKER).exists());
}

#[test]
fn language_detection_by_dep_files() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(detect_language(dir.path()), None);
    std::fs::write(dir.path().join("requirements.txt"), "requests\n").unwrap();
    assert_eq!(detect_language(dir.path()), Some(SkillLang::Python));
}

#[test]
fn fingerprint_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let a = fingerprint("pip install -r requirements.txt", dir.path(), None);
    let b = fingerprint("pip install -r requirements.txt", dir.path(), None);
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
}
