// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn info(t: ProcessType, started_at: u64) -> ProcessInfo {
    ProcessInfo {
        id: format!("prc-{started_at}"),
        process_type: t,
        host: "127.0.0.1".into(),
        port: 4100,
        hostname: "box".into(),
        started_at,
        uptime: 0,
        version: "0.2.0".into(),
        concurrency: 1,
        auth_token: None,
        tls: false,
    }
}

#[test]
fn sort_order_is_type_then_start_time() {
    let mut procs = vec![
        info(ProcessType::Dashboard, 10),
        info(ProcessType::Worker, 30),
        info(ProcessType::Worker, 20),
        info(ProcessType::Node, 99),
    ];
    procs.sort_by_key(ProcessInfo::sort_key);
    let types: Vec<ProcessType> = procs.iter().map(|p| p.process_type).collect();
    assert_eq!(
        types,
        vec![ProcessType::Node, ProcessType::Worker, ProcessType::Worker, ProcessType::Dashboard]
    );
    assert_eq!(procs[1].started_at, 20);
}

#[test]
fn wire_form_uses_type_tag() {
    let json = serde_json::to_value(info(ProcessType::Worker, 5)).unwrap();
    assert_eq!(json["type"], "worker");
    assert_eq!(json["startedAt"], 5);
    assert!(json.get("authToken").is_none());
}
