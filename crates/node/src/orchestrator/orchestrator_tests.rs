// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::budget::BudgetConfig;
use crate::traits::fakes::{
    CollectingProgress, CollectingSink, FakeCancel, MemoryMessageStore, MemoryUsageStore,
    ScriptedDispatcher, ScriptedProvider,
};
use crate::traits::TokenUsage;
use sc_core::ProgressKind;

struct Fixture {
    provider: Arc<ScriptedProvider>,
    store: MemoryMessageStore,
    usage: MemoryUsageStore,
    progress: CollectingProgress,
    cancel: FakeCancel,
    dispatcher: Arc<ScriptedDispatcher>,
    sink: CollectingSink,
    _dir: tempfile::TempDir,
    orchestrator: Orchestrator,
}

fn fixture() -> Fixture {
    fixture_with_budget(BudgetConfig::default())
}

fn fixture_with_budget(config: BudgetConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("mind")).unwrap();
    std::fs::create_dir_all(dir.path().join("skills")).unwrap();

    let provider = Arc::new(ScriptedProvider::new());
    let store = MemoryMessageStore::default();
    let usage = MemoryUsageStore::default();
    let progress = CollectingProgress::default();
    let cancel = FakeCancel::default();
    let dispatcher = Arc::new(ScriptedDispatcher::default());
    let sink = CollectingSink::default();

    let mut registry = ToolRegistry::new();
    registry.register(
        "send_message",
        Arc::new(tools::SendMessageTool { sink: Arc::new(sink.clone()) }),
    );

    let orchestrator = Orchestrator {
        provider: provider.clone(),
        store: Arc::new(store.clone()),
        usage: Arc::new(usage.clone()),
        budget: Arc::new(Budget::new(config, Arc::new(usage.clone()))),
        progress: Arc::new(progress.clone()),
        cancel: Arc::new(cancel.clone()),
        dispatcher: dispatcher.clone(),
        prompt: Arc::new(PromptCache::new(
            dir.path().join("mind"),
            dir.path().join("skills"),
        )),
        tools: Arc::new(registry),
    };

    Fixture {
        provider,
        store,
        usage,
        progress,
        cancel,
        dispatcher,
        sink,
        _dir: dir,
        orchestrator,
    }
}

#[tokio::test]
async fn text_response_ends_the_loop() {
    let f = fixture();
    f.provider.push_text("hello back");
    let result = f
        .orchestrator
        .run("gateway", "job-1", "hello", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.as_deref(), Some("hello back"));
    assert_eq!(f.provider.call_count(), 1);
}

#[tokio::test]
async fn usage_is_recorded_per_call() {
    let f = fixture();
    f.provider.push_text("done");
    f.orchestrator
        .run("gateway", "job-1", "hi", &CancellationToken::new())
        .await
        .unwrap();
    let totals = f.usage.totals.lock();
    assert_eq!(totals.daily_tokens, 15);
}

#[tokio::test]
async fn local_tool_result_feeds_the_next_iteration() {
    let f = fixture();
    f.provider
        .push_tool_call("send_message", serde_json::json!({"text": "working on it"}));
    f.provider.push_text("all done");

    let result = f
        .orchestrator
        .run("gateway", "job-1", "do the thing", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.as_deref(), Some("all done"));
    assert_eq!(f.provider.call_count(), 2);
    // The intermediate message went out through the sink.
    assert_eq!(
        f.sink.sent.lock().first(),
        Some(&("gateway".to_string(), "working on it".to_string()))
    );
    // The second provider call saw the tool result turn.
    let calls = f.provider.calls.lock();
    let second_turns = &calls[1].1;
    assert!(second_turns.iter().any(|t| t.role == Role::Tool && t.content == "sent"));
}

#[tokio::test]
async fn unknown_tool_is_delegated_to_workers() {
    let f = fixture();
    f.provider.push_tool_call("execute_command", serde_json::json!({"command": "ls"}));
    f.dispatcher.push(DelegatedResult::Completed("file-list".into()));
    f.provider.push_text("done");

    f.orchestrator
        .run("gateway", "job-1", "list files", &CancellationToken::new())
        .await
        .unwrap();

    let dispatched = f.dispatcher.dispatched.lock();
    assert_eq!(dispatched.len(), 1);
    assert!(matches!(
        &dispatched[0],
        JobPayload::ToolExecution { tool, .. } if tool == "execute_command"
    ));
}

#[tokio::test]
async fn failed_delegation_becomes_a_tool_result() {
    let f = fixture();
    f.provider.push_tool_call("execute_command", serde_json::json!({"command": "ls"}));
    f.dispatcher.push(DelegatedResult::Failed("worker exploded".into()));
    f.provider.push_text("sorry");

    let result = f
        .orchestrator
        .run("gateway", "job-1", "list files", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.as_deref(), Some("sorry"));
    let calls = f.provider.calls.lock();
    assert!(calls[1]
        .1
        .iter()
        .any(|t| t.role == Role::Tool && t.content.contains("worker exploded")));
}

#[tokio::test]
async fn abort_mid_tool_exits_without_result() {
    let f = fixture();
    f.provider.push_tool_call("execute_command", serde_json::json!({"command": "sleep 10"}));
    f.dispatcher.push(DelegatedResult::Aborted);

    let result = f
        .orchestrator
        .run("gateway", "job-1", "long thing", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result, None);
}

#[tokio::test]
async fn pre_cancelled_token_short_circuits() {
    let f = fixture();
    let abort = CancellationToken::new();
    abort.cancel();
    let result = f.orchestrator.run("gateway", "job-1", "hi", &abort).await.unwrap();
    assert_eq!(result, None);
    assert_eq!(f.provider.call_count(), 0);
}

#[tokio::test]
async fn cancel_flag_stops_the_loop() {
    let f = fixture();
    f.cancel.set_flag("job-1");
    let result = f
        .orchestrator
        .run("gateway", "job-1", "hi", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result, None);
    assert_eq!(f.provider.call_count(), 0);
}

#[tokio::test]
async fn budget_block_is_an_error_before_the_provider() {
    let f = fixture_with_budget(BudgetConfig {
        daily_token_limit: 10,
        monthly_token_limit: 1_000,
        soft_threshold: 0.8,
    });
    f.usage
        .record(TokenUsage { input_tokens: 10, output_tokens: 0 })
        .await
        .unwrap();
    let err = f
        .orchestrator
        .run("gateway", "job-1", "hi", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::BudgetExceeded(_)));
    assert_eq!(f.provider.call_count(), 0);
}

#[tokio::test]
async fn tool_iterations_emit_progress() {
    let f = fixture();
    f.provider
        .push_tool_call("send_message", serde_json::json!({"text": "hi"}));
    f.provider.push_text("done");

    f.orchestrator
        .run("gateway", "job-1", "go", &CancellationToken::new())
        .await
        .unwrap();

    let kinds = f.progress.kinds_for("job-1");
    assert!(kinds.contains(&ProgressKind::Progress));
}

#[tokio::test]
async fn record_exchange_persists_and_queues_extraction() {
    let f = fixture();
    f.orchestrator
        .record_exchange("gateway", "question", "answer")
        .await
        .unwrap();

    let rows = f.store.rows.lock();
    assert!(rows.iter().any(|(_, role, content, _)| {
        *role == Role::Assistant && content == "answer"
    }));

    let enqueued = f.dispatcher.enqueued.lock();
    assert_eq!(enqueued.len(), 1);
    assert!(matches!(
        enqueued[0].payload,
        JobPayload::MemoryExtraction { .. }
    ));
}
