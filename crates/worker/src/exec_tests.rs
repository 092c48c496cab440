// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn cwd() -> PathBuf {
    std::env::temp_dir()
}

#[tokio::test]
async fn captures_stdout_and_exit_code() {
    let spec = ExecSpec::shell("echo hello; exit 3", cwd());
    let outcome = spawn_process(spec, &CancellationToken::new(), |_| {}).await.unwrap();
    assert_eq!(outcome.stdout.trim(), "hello");
    assert_eq!(outcome.exit_code, 3);
    assert!(!outcome.timed_out);
    assert!(!outcome.cancelled);
}

#[tokio::test]
async fn nonzero_exit_is_a_result_not_an_error() {
    let spec = ExecSpec::shell("exit 1", cwd());
    let outcome = spawn_process(spec, &CancellationToken::new(), |_| {}).await.unwrap();
    assert_eq!(outcome.exit_code, 1);
}

#[tokio::test]
async fn stderr_is_captured_separately() {
    let spec = ExecSpec::shell("echo out; echo err >&2", cwd());
    let outcome = spawn_process(spec, &CancellationToken::new(), |_| {}).await.unwrap();
    assert_eq!(outcome.stdout.trim(), "out");
    assert_eq!(outcome.stderr.trim(), "err");
}

#[tokio::test]
async fn stdin_is_delivered() {
    let spec = ExecSpec::shell("cat", cwd()).stdin("ping");
    let outcome = spawn_process(spec, &CancellationToken::new(), |_| {}).await.unwrap();
    assert_eq!(outcome.stdout, "ping");
}

#[tokio::test]
async fn timeout_terminates_the_child() {
    let spec = ExecSpec::shell("sleep 30", cwd()).timeout_ms(200);
    let start = std::time::Instant::now();
    let outcome = spawn_process(spec, &CancellationToken::new(), |_| {}).await.unwrap();
    assert!(outcome.timed_out);
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_ne!(outcome.exit_code, 0);
}

#[tokio::test]
async fn abort_token_cancels_the_child() {
    let abort = CancellationToken::new();
    let trigger = abort.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let spec = ExecSpec::shell("sleep 30", cwd());
    let outcome = spawn_process(spec, &abort, |_| {}).await.unwrap();
    assert!(outcome.cancelled);
}

#[tokio::test]
async fn pid_callback_fires() {
    let (tx, rx) = std::sync::mpsc::channel();
    let spec = ExecSpec::shell("true", cwd());
    spawn_process(spec, &CancellationToken::new(), move |pid| {
        let _ = tx.send(pid);
    })
    .await
    .unwrap();
    assert!(rx.recv().unwrap() > 0);
}

#[tokio::test]
async fn minimal_env_strips_variables() {
    std::env::set_var("SC_EXEC_TEST_SENTINEL", "leak");
    let spec = ExecSpec::shell("echo ${SC_EXEC_TEST_SENTINEL:-clean}", cwd())
        .env_mode(EnvMode::Minimal);
    let outcome = spawn_process(spec, &CancellationToken::new(), |_| {}).await.unwrap();
    assert_eq!(outcome.stdout.trim(), "clean");
    std::env::remove_var("SC_EXEC_TEST_SENTINEL");
}

#[tokio::test]
async fn spec_env_overlays_either_mode() {
    let spec = ExecSpec::shell("echo $INJECTED", cwd())
        .env_mode(EnvMode::Minimal)
        .env([("INJECTED".to_string(), "42".to_string())].into());
    let outcome = spawn_process(spec, &CancellationToken::new(), |_| {}).await.unwrap();
    assert_eq!(outcome.stdout.trim(), "42");
}

#[tokio::test]
async fn large_output_is_truncated_with_flag() {
    // 11 MiB of zeros exceeds the 10 MiB cap.
    let spec = ExecSpec::shell("head -c 11534336 /dev/zero", cwd()).timeout_ms(60_000);
    let outcome = spawn_process(spec, &CancellationToken::new(), |_| {}).await.unwrap();
    assert!(outcome.stdout_truncated);
    assert_eq!(outcome.stdout.len(), 10 * 1024 * 1024);
    assert_eq!(outcome.exit_code, 0);
}
