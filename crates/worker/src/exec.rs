// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded subprocess execution.
//!
//! Every spawn carries an explicit timeout and an abort token. Termination
//! is SIGTERM first, SIGKILL after a grace window. Output capture is capped
//! per stream; the child is drained past the cap so it never blocks on a
//! full pipe. A non-zero exit is a normal result, never an error.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::WorkerError;

/// Per-stream capture cap.
const CAPTURE_CAP: usize = 10 * 1024 * 1024;
/// Grace between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(3);
/// Default subprocess timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Environment handling for a spawn.
///
/// The worker inherits its environment and layers job secrets on top; the
/// node's local spawns use the minimal allowlist. The asymmetry is
/// deliberate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvMode {
    Inherit,
    Minimal,
}

/// Variables that survive [`EnvMode::Minimal`].
const MINIMAL_ENV: [&str; 5] = ["PATH", "HOME", "TMPDIR", "LANG", "TERM"];

#[derive(Debug, Clone)]
pub struct ExecSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub env_mode: EnvMode,
    pub timeout_ms: u64,
    pub stdin: Option<String>,
}

impl ExecSpec {
    /// A `sh -c` command line in the worker's inherit-env mode.
    pub fn shell(command: &str, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: "sh".into(),
            args: vec!["-c".into(), command.to_string()],
            cwd: cwd.into(),
            env: BTreeMap::new(),
            env_mode: EnvMode::Inherit,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            stdin: None,
        }
    }

    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn env_mode(mut self, mode: EnvMode) -> Self {
        self.env_mode = mode;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// What happened to a subprocess, exit code included — packaged, not thrown.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stdout_truncated: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stderr_truncated: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

/// Spawn and supervise a subprocess. `on_spawn` receives the PID once the
/// child is running (callers publish it for cross-process kill).
pub async fn spawn_process(
    spec: ExecSpec,
    abort: &CancellationToken,
    on_spawn: impl FnOnce(u32),
) -> Result<ExecOutcome, WorkerError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.cwd)
        .stdin(if spec.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if spec.env_mode == EnvMode::Minimal {
        cmd.env_clear();
        for key in MINIMAL_ENV {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }
    }
    cmd.envs(&spec.env);

    let mut child = cmd.spawn()?;
    if let Some(pid) = child.id() {
        on_spawn(pid);
    }
    debug!(program = %spec.program, pid = child.id(), "subprocess spawned");

    if let (Some(input), Some(mut stdin)) = (spec.stdin.as_deref(), child.stdin.take()) {
        // A child that exits without reading stdin is not an error.
        let _ = stdin.write_all(input.as_bytes()).await;
        drop(stdin);
    }

    let stdout_task = child.stdout.take().map(|s| tokio::spawn(read_capped(s)));
    let stderr_task = child.stderr.take().map(|s| tokio::spawn(read_capped(s)));

    let mut timed_out = false;
    let mut cancelled = false;
    let status = tokio::select! {
        status = child.wait() => status?,
        _ = tokio::time::sleep(Duration::from_millis(spec.timeout_ms)) => {
            timed_out = true;
            terminate(&mut child).await;
            child.wait().await?
        }
        _ = abort.cancelled() => {
            cancelled = true;
            terminate(&mut child).await;
            child.wait().await?
        }
    };

    let (stdout, stdout_truncated) = match stdout_task {
        Some(task) => task.await.unwrap_or_default(),
        None => (Vec::new(), false),
    };
    let (stderr, stderr_truncated) = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => (Vec::new(), false),
    };

    Ok(ExecOutcome {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: exit_code(&status),
        stdout_truncated,
        stderr_truncated,
        timed_out,
        cancelled,
    })
}

/// SIGTERM, wait out the grace window, SIGKILL if still alive.
async fn terminate(child: &mut Child) {
    let Some(pid) = child.id() else { return };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!(pid, error = %e, "SIGTERM failed");
    }

    let deadline = tokio::time::Instant::now() + KILL_GRACE;
    while tokio::time::Instant::now() < deadline {
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if let Err(e) = child.start_kill() {
        warn!(pid, error = %e, "SIGKILL failed");
    }
}

/// Read a stream to EOF, keeping at most [`CAPTURE_CAP`] bytes.
async fn read_capped<R: AsyncRead + Unpin>(mut stream: R) -> (Vec<u8>, bool) {
    let mut chunk = vec![0u8; 8 * 1024];
    let mut out = Vec::new();
    let mut truncated = false;
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if out.len() < CAPTURE_CAP {
                    let take = n.min(CAPTURE_CAP - out.len());
                    out.extend_from_slice(&chunk[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }
    (out, truncated)
}

#[cfg(unix)]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.code().unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

#[cfg(not(unix))]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
