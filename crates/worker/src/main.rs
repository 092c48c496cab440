// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! scworker: tools-queue worker process.

use clap::Parser;
use sc_broker::{
    connect, subscriber_client, AbortRegistry, CancelBus, Consumer, ConsumerConfig,
    ProcessRegistry, ProgressBus,
};
use sc_core::job::QueueName;
use sc_core::{ProcessInfo, ProcessType, SetupConfig, WorkerSettings};
use sc_worker::handler::ToolsHandler;
use sc_worker::server::{router, ServerState};
use sc_worker::skills::{run_reload_subscriber, SkillCache};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scworker", about = "ScalyClaw worker: executes tools and skills")]
struct Cli {
    /// Setup config path (defaults to ~/.scalyclaw/scalyclaw.json)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("scworker: {e}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let setup = match &cli.config {
        Some(path) => SetupConfig::load_from(path)?,
        None => SetupConfig::load()?,
    };
    let settings = WorkerSettings::load(&setup)?;

    let logs_dir = setup.logs_dir();
    std::fs::create_dir_all(&logs_dir)?;
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "scworker.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(file_writer)
        .with_ansi(false)
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(setup, settings))
}

async fn serve(
    setup: SetupConfig,
    settings: WorkerSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    let conn = connect(&setup.redis).await?;
    let client = subscriber_client(&setup.redis)?;

    let workspace = settings.workspace(&setup);
    std::fs::create_dir_all(&workspace)?;
    let skills_root = workspace.join("skills");
    std::fs::create_dir_all(&skills_root)?;

    let shutdown = CancellationToken::new();
    let registry = AbortRegistry::new();
    let cancel = CancelBus::new(conn.clone(), subscriber_client(&setup.redis)?, registry);
    let progress = ProgressBus::new(conn.clone(), subscriber_client(&setup.redis)?);

    // Register in the process registry; the entry ages out if we die.
    let process_registry = ProcessRegistry::new(conn.clone());
    let started_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let process_id = sc_core::id::ProcessId::new();
    let registration = process_registry
        .register(ProcessInfo {
            id: process_id.to_string(),
            process_type: ProcessType::Worker,
            host: "127.0.0.1".into(),
            port: settings.port,
            hostname: hostname(),
            started_at,
            uptime: 0,
            version: env!("CARGO_PKG_VERSION").into(),
            concurrency: settings.concurrency,
            auth_token: None,
            tls: false,
        })
        .await?;

    // Cancel-signal subscriber: aborts local tokens, kills local PIDs.
    let cancel_sub = cancel.clone();
    let cancel_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = cancel_sub.run_subscriber(cancel_shutdown).await {
            error!(error = %e, "cancel subscriber exited");
        }
    });

    // Skill cache + reload subscriber.
    let skills = Arc::new(SkillCache::new(
        settings.node_url.clone(),
        settings.auth_token.clone(),
        skills_root,
    ));
    tokio::spawn(run_reload_subscriber(client, Arc::clone(&skills), shutdown.clone()));

    // The tools-queue consumer is the worker's whole purpose.
    let handler = Arc::new(ToolsHandler::new(
        workspace.clone(),
        process_id.to_string(),
        skills,
        cancel.clone(),
        progress,
    ));
    let broker = sc_broker::Broker::new(conn.clone());
    let consumer = Consumer::new(
        broker.queue(QueueName::Tools).clone(),
        handler,
        ConsumerConfig {
            concurrency: settings.concurrency as usize,
            ..ConsumerConfig::default()
        },
    );
    let consumer_shutdown = shutdown.clone();
    let consumer_task = tokio::spawn(consumer.run(consumer_shutdown));

    // Workspace file server.
    let server_state = Arc::new(ServerState {
        workspace: workspace.clone(),
        auth_token: settings.auth_token.clone(),
    });
    let listener =
        tokio::net::TcpListener::bind(("0.0.0.0", settings.port)).await?;
    info!(port = settings.port, workspace = %workspace.display(), "worker ready");
    let app = router(server_state);
    let http_shutdown = shutdown.clone();
    let http_task = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
            .await;
    });

    wait_for_signal(&shutdown).await;

    let _ = consumer_task.await;
    let _ = http_task.await;
    registration.deregister().await?;
    info!("worker shut down cleanly");
    Ok(())
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".into())
}

/// First signal starts a graceful drain; a second forces exit 1.
async fn wait_for_signal(shutdown: &CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "signal handler install failed");
            shutdown.cancel();
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    info!("shutdown signal received, draining");
    shutdown.cancel();

    tokio::spawn(async {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        eprintln!("second signal, exiting immediately");
        std::process::exit(1);
    });
}
