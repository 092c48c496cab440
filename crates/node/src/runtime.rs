// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The process-wide runtime handle.
//!
//! Every singleton (broker, buses, vault, scheduler, orchestrator, caches)
//! is constructed once at bootstrap and passed through this value; there
//! are no ambient globals.

use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sc_broker::{
    connect, subscriber_client, AbortRegistry, Broker, CancelBus, ChannelState, ProcessRegistry,
    ProgressBus,
};
use sc_core::keyspace;
use sc_core::SetupConfig;
use sc_vault::{Keyfile, RedisSecretStore, Vault};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::budget::{Budget, BudgetConfig};
use crate::error::NodeError;
use crate::guards::Guards;
use crate::orchestrator::dispatch::WorkerDispatcher;
use crate::orchestrator::prompt::PromptCache;
use crate::orchestrator::tools::{
    MemorySearchTool, ScheduleReminderTool, ScheduleTaskTool, SendMessageTool, SystemInfoTool,
    ToolRegistry, VaultListTool,
};
use crate::orchestrator::Orchestrator;
use crate::processor::Processor;
use crate::scheduler::Scheduler;
use crate::traits::{ChannelSink, ChatProvider, MemoryIndex, MessageStore, UsageStore};
use crate::waiters::ProgressWaiters;

/// Node configuration, stored as JSON under `scalyclaw:config` and
/// refreshed on the config-reload signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    pub auth_token: String,
    #[serde(default = "default_rate_max")]
    pub rate_limit_max: u64,
    #[serde(default = "default_rate_window")]
    pub rate_limit_window_secs: u64,
    #[serde(default)]
    pub denied_commands: Vec<String>,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServer>,
    #[serde(default)]
    pub budget: BudgetConfig,
}

/// A configured MCP server; the protocol client itself is out of scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServer {
    pub id: String,
    pub url: String,
}

fn default_port() -> u16 {
    4100
}

fn default_rate_max() -> u64 {
    60
}

fn default_rate_window() -> u64 {
    60
}

/// Out-of-scope collaborators, injected at bootstrap.
pub struct RuntimeDeps {
    pub provider: Arc<dyn ChatProvider>,
    pub store: Arc<dyn MessageStore>,
    pub usage: Arc<dyn UsageStore>,
    pub memory: Arc<dyn MemoryIndex>,
    pub sink: Arc<dyn ChannelSink>,
}

pub struct Runtime {
    pub setup: SetupConfig,
    pub config: Arc<RwLock<NodeConfig>>,
    pub conn: ConnectionManager,
    pub broker: Broker,
    pub progress: ProgressBus,
    pub cancel: CancelBus,
    pub channels: ChannelState,
    pub registry: ProcessRegistry,
    pub vault: Arc<Vault>,
    pub scheduler: Arc<Scheduler>,
    pub budget: Arc<Budget>,
    pub guards: Arc<Guards>,
    pub orchestrator: Arc<Orchestrator>,
    pub processor: Arc<Processor>,
    pub waiters: ProgressWaiters,
    pub prompt: Arc<PromptCache>,
    pub deps: RuntimeDeps,
}

impl Runtime {
    /// Construct every singleton. Fatal errors here abort the process.
    pub async fn bootstrap(setup: SetupConfig, deps: RuntimeDeps) -> Result<Self, NodeError> {
        let conn = connect(&setup.redis).await?;
        let config = Arc::new(RwLock::new(load_config(conn.clone()).await?));

        let broker = Broker::new(conn.clone());
        let progress = ProgressBus::new(conn.clone(), subscriber_client(&setup.redis)?);
        let cancel = CancelBus::new(
            conn.clone(),
            subscriber_client(&setup.redis)?,
            AbortRegistry::new(),
        );
        let channels = ChannelState::new(conn.clone());
        let registry = ProcessRegistry::new(conn.clone());
        let waiters = ProgressWaiters::new();

        let keyfile = Keyfile::new(setup.password_file());
        keyfile.ensure()?;
        let vault = Arc::new(Vault::new(
            Arc::new(RedisSecretStore::new(conn.clone())),
            keyfile,
        ));

        let scheduler = Arc::new(Scheduler::new(conn.clone(), broker.clone()));
        let budget = Arc::new(Budget::new(config.read().budget, Arc::clone(&deps.usage)));
        let guards = Arc::new(Guards::new(Arc::clone(&deps.provider)));

        let mind_dir = setup.home_dir.join("mind");
        std::fs::create_dir_all(&mind_dir)?;
        std::fs::create_dir_all(setup.skills_dir())?;
        let prompt = Arc::new(PromptCache::new(mind_dir, setup.skills_dir()));

        let mut tools = ToolRegistry::new();
        tools.register("send_message", Arc::new(SendMessageTool { sink: Arc::clone(&deps.sink) }));
        tools.register(
            "memory_search",
            Arc::new(MemorySearchTool { memory: Arc::clone(&deps.memory) }),
        );
        tools.register("vault_list", Arc::new(VaultListTool { vault: Arc::clone(&vault) }));
        tools.register("system_info", Arc::new(SystemInfoTool { registry: registry.clone() }));
        tools.register(
            "schedule_reminder",
            Arc::new(ScheduleReminderTool { scheduler: Arc::clone(&scheduler) }),
        );
        tools.register(
            "schedule_task",
            Arc::new(ScheduleTaskTool { scheduler: Arc::clone(&scheduler) }),
        );

        let dispatcher = Arc::new(WorkerDispatcher {
            broker: broker.clone(),
            cancel: cancel.clone(),
            progress: progress.clone(),
            waiters: waiters.clone(),
            vault: Arc::clone(&vault),
            skills_dir: setup.skills_dir(),
            denied_commands: config.read().denied_commands.clone(),
        });

        let orchestrator = Arc::new(Orchestrator {
            provider: Arc::clone(&deps.provider),
            store: Arc::clone(&deps.store),
            usage: Arc::clone(&deps.usage),
            budget: Arc::clone(&budget),
            progress: Arc::new(progress.clone()),
            cancel: Arc::new(cancel.clone()),
            dispatcher,
            prompt: Arc::clone(&prompt),
            tools: Arc::new(tools),
        });

        let processor = Arc::new(Processor {
            guards: Arc::clone(&guards),
            store: Arc::clone(&deps.store),
            orchestrator: Arc::clone(&orchestrator),
            progress: Arc::new(progress.clone()),
            cancel: Arc::new(cancel.clone()),
        });

        info!("runtime bootstrapped");
        Ok(Self {
            setup,
            config,
            conn,
            broker,
            progress,
            cancel,
            channels,
            registry,
            vault,
            scheduler,
            budget,
            guards,
            orchestrator,
            processor,
            waiters,
            prompt,
            deps,
        })
    }

    /// One subscriber covers all three reload signals: config reloads
    /// refresh the config cache; skills and MCP reloads invalidate the
    /// prompt cache so the next assembly sees the new lists.
    pub async fn run_reload_subscriber(
        &self,
        client: redis::Client,
        shutdown: CancellationToken,
    ) {
        use futures_util::StreamExt;
        let mut pubsub = match client.get_async_pubsub().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "reload subscriber failed to connect");
                return;
            }
        };
        for channel in [
            keyspace::CONFIG_RELOAD_CHANNEL,
            keyspace::SKILLS_RELOAD_CHANNEL,
            keyspace::MCP_RELOAD_CHANNEL,
        ] {
            if let Err(e) = pubsub.subscribe(channel).await {
                warn!(channel, error = %e, "reload subscribe failed");
                return;
            }
        }
        let mut stream = pubsub.into_on_message();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                msg = stream.next() => {
                    let Some(msg) = msg else { return };
                    let channel = msg.get_channel_name().to_string();
                    if channel == keyspace::CONFIG_RELOAD_CHANNEL {
                        match load_config(self.conn.clone()).await {
                            Ok(fresh) => {
                                *self.config.write() = fresh;
                                self.prompt.invalidate();
                                info!("config reloaded");
                            }
                            Err(e) => warn!(error = %e, "config reload failed"),
                        }
                    } else {
                        self.prompt.invalidate();
                        info!(channel, "prompt cache invalidated by reload signal");
                    }
                }
            }
        }
    }
}

/// Load `scalyclaw:config`, writing a fresh default (with a random auth
/// token) on first boot.
pub async fn load_config(conn: ConnectionManager) -> Result<NodeConfig, NodeError> {
    let mut conn = conn;
    let raw: Option<String> = conn
        .get(keyspace::config_key())
        .await
        .map_err(sc_broker::BrokerError::from)?;
    if let Some(raw) = raw {
        return Ok(serde_json::from_str(&raw)?);
    }

    let fresh = NodeConfig {
        port: default_port(),
        auth_token: generate_token(),
        rate_limit_max: default_rate_max(),
        rate_limit_window_secs: default_rate_window(),
        denied_commands: vec!["rm -rf /".into(), "mkfs".into(), "shutdown".into()],
        cors_origins: vec![],
        mcp_servers: vec![],
        budget: BudgetConfig::default(),
    };
    conn.set::<_, _, ()>(keyspace::config_key(), serde_json::to_string(&fresh)?)
        .await
        .map_err(sc_broker::BrokerError::from)?;
    info!("wrote initial node config");
    Ok(fresh)
}

fn generate_token() -> String {
    format!("sct-{}", nanoid::nanoid!(32))
}
