// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! scnode: the primary node process.

use clap::Parser;
use sc_broker::{subscriber_client, Consumer, ConsumerConfig, RateLimiter};
use sc_core::job::QueueName;
use sc_core::{ProcessInfo, ProcessType, SetupConfig};
use sc_node::defaults::{
    EphemeralMessageStore, LoggingSink, NoopMemoryIndex, RedisUsageStore, UnconfiguredProvider,
};
use sc_node::gateway::{self, Gateway};
use sc_node::handlers::{
    AgentsHandler, MessagesHandler, ProactiveHandler, SchedulerFireHandler, SystemHandler,
};
use sc_node::runtime::{Runtime, RuntimeDeps};
use sc_node::waiters;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scnode", about = "ScalyClaw node: orchestrator, scheduler, gateway")]
struct Cli {
    /// Setup config path (defaults to ~/.scalyclaw/scalyclaw.json)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("scnode: {e}");
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

    let logs_dir = setup.logs_dir();
    std::fs::create_dir_all(&logs_dir)?;
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "scnode.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(file_writer)
        .with_ansi(false)
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(setup))
}

async fn serve(setup: SetupConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Collaborator seams; real integrations replace these at link time.
    let conn_probe = sc_broker::connect(&setup.redis).await?;
    let deps = RuntimeDeps {
        provider: Arc::new(UnconfiguredProvider),
        store: Arc::new(EphemeralMessageStore::default()),
        usage: Arc::new(RedisUsageStore::new(conn_probe)),
        memory: Arc::new(NoopMemoryIndex),
        sink: Arc::new(LoggingSink),
    };

    let runtime = Arc::new(Runtime::bootstrap(setup.clone(), deps).await?);
    let shutdown = CancellationToken::new();

    // Shared progress pump: resolves chat and tool waiters.
    tokio::spawn(waiters::run_pump(
        runtime.progress.clone(),
        runtime.waiters.clone(),
        shutdown.clone(),
    ));

    // Cancel-signal subscriber: aborts local tokens on cross-process cancel.
    let cancel_bus = runtime.cancel.clone();
    let cancel_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = cancel_bus.run_subscriber(cancel_shutdown).await {
            error!(error = %e, "cancel subscriber exited");
        }
    });

    // Config / skills / MCP reload subscriber.
    let reload_runtime = Arc::clone(&runtime);
    let reload_client = subscriber_client(&setup.redis)?;
    let reload_shutdown = shutdown.clone();
    tokio::spawn(async move {
        reload_runtime.run_reload_subscriber(reload_client, reload_shutdown).await;
    });

    // Queue consumers. Workers own the tools queue; the node runs the rest.
    let mut consumer_tasks = Vec::new();
    let consumers: Vec<(QueueName, Arc<dyn sc_broker::JobHandler>, usize)> = vec![
        (
            QueueName::Messages,
            Arc::new(MessagesHandler {
                processor: Arc::clone(&runtime.processor),
                broker: runtime.broker.clone(),
                channels: runtime.channels.clone(),
                progress: runtime.progress.clone(),
            }),
            4,
        ),
        (
            QueueName::Scheduler,
            Arc::new(SchedulerFireHandler { scheduler: Arc::clone(&runtime.scheduler) }),
            2,
        ),
        (
            QueueName::System,
            Arc::new(SystemHandler {
                sink: Arc::clone(&runtime.deps.sink),
                orchestrator: Arc::clone(&runtime.orchestrator),
                memory: Arc::clone(&runtime.deps.memory),
                vault: Arc::clone(&runtime.vault),
                progress: runtime.progress.clone(),
                channels: runtime.channels.clone(),
            }),
            4,
        ),
        (
            QueueName::Agents,
            Arc::new(AgentsHandler {
                orchestrator: Arc::clone(&runtime.orchestrator),
                progress: runtime.progress.clone(),
            }),
            2,
        ),
        (
            QueueName::Proactive,
            Arc::new(ProactiveHandler {
                channels: runtime.channels.clone(),
                broker: runtime.broker.clone(),
            }),
            1,
        ),
    ];
    for (queue, handler, concurrency) in consumers {
        let consumer = Consumer::new(
            runtime.broker.queue(queue).clone(),
            handler,
            ConsumerConfig { concurrency, ..ConsumerConfig::default() },
        );
        consumer_tasks.push(tokio::spawn(consumer.run(shutdown.clone())));
    }

    // Terminal-job pruning tick.
    let prune_broker = runtime.broker.clone();
    let prune_shutdown = shutdown.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = prune_shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(600)) => {
                    match prune_broker.prune_terminal().await {
                        Ok(0) => {}
                        Ok(pruned) => info!(pruned, "terminal jobs pruned"),
                        Err(e) => warn!(error = %e, "prune tick failed"),
                    }
                }
            }
        }
    });

    // Process registry entry with heartbeat.
    let port = runtime.config.read().port;
    let started_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let process_id = sc_core::id::ProcessId::new();
    let registration = runtime
        .registry
        .register(ProcessInfo {
            id: process_id.to_string(),
            process_type: ProcessType::Node,
            host: "127.0.0.1".into(),
            port,
            hostname: hostname(),
            started_at,
            uptime: 0,
            version: env!("CARGO_PKG_VERSION").into(),
            concurrency: 4,
            auth_token: None,
            tls: false,
        })
        .await?;

    // Gateway.
    let (rate_max, rate_window) = {
        let config = runtime.config.read();
        (config.rate_limit_max, config.rate_limit_window_secs)
    };
    let gateway = Arc::new(Gateway {
        runtime: Arc::clone(&runtime),
        rate: RateLimiter::new(runtime.conn.clone(), rate_max, rate_window),
        started: Instant::now(),
    });
    let app = gateway::router(gateway)
        .into_make_service_with_connect_info::<std::net::SocketAddr>();
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "gateway listening");
    let http_shutdown = shutdown.clone();
    let http_task = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
            .await;
    });

    wait_for_signal(&shutdown).await;

    for task in consumer_tasks {
        let _ = task.await;
    }
    let _ = http_task.await;
    registration.deregister().await?;
    info!("node shut down cleanly");
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
