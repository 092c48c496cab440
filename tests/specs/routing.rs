// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue routing and payload wire-form invariants.

use sc_core::job::{JobName, JobPayload, JobSpec, QueueName};

#[test]
fn every_job_name_routes_to_its_queue() {
    let expected = [
        (JobName::MessageProcessing, QueueName::Messages),
        (JobName::Command, QueueName::Messages),
        (JobName::AgentTask, QueueName::Agents),
        (JobName::ToolExecution, QueueName::Tools),
        (JobName::SkillExecution, QueueName::Tools),
        (JobName::ProactiveCheck, QueueName::Proactive),
        (JobName::Reminder, QueueName::Scheduler),
        (JobName::RecurrentReminder, QueueName::Scheduler),
        (JobName::Task, QueueName::Scheduler),
        (JobName::RecurrentTask, QueueName::Scheduler),
        (JobName::MemoryExtraction, QueueName::System),
        (JobName::ScheduledFire, QueueName::System),
        (JobName::ProactiveFire, QueueName::System),
        (JobName::VaultKeyRotation, QueueName::System),
    ];
    assert_eq!(expected.len(), JobName::ALL.len());
    for (name, queue) in expected {
        assert_eq!(name.queue(), queue, "{name} should route to {queue}");
    }
}

#[test]
fn spec_queue_always_derives_from_payload_name() {
    let payloads = [
        JobPayload::MessageProcessing {
            channel_id: "telegram".into(),
            text: "hi".into(),
            attachments: vec![],
            reply_to: None,
        },
        JobPayload::SkillExecution {
            channel_id: "slack".into(),
            skill_id: "demo-skill".into(),
            input: serde_json::json!({}),
            env: Default::default(),
            timeout_ms: None,
        },
        JobPayload::VaultKeyRotation {},
    ];
    for payload in payloads {
        let spec = JobSpec::new(payload);
        assert_eq!(spec.queue(), spec.name().queue());
    }
}

#[test]
fn payload_survives_the_wire_with_its_tag() {
    let payload = JobPayload::ToolExecution {
        channel_id: "gateway".into(),
        tool: "execute_command".into(),
        input: serde_json::json!({"command": "uname -a"}),
        env: [("SECRET".to_string(), "v".to_string())].into(),
        denied_commands: vec!["rm -rf".into()],
        timeout_ms: Some(30_000),
    };
    let wire = serde_json::to_string(&payload).unwrap();
    assert!(wire.contains("\"name\":\"tool-execution\""));
    let back: JobPayload = serde_json::from_str(&wire).unwrap();
    assert_eq!(back, payload);
}

#[test]
fn unknown_job_tag_is_rejected_not_coerced() {
    let raw = r#"{"name":"drop-database","channelId":"x"}"#;
    assert!(serde_json::from_str::<JobPayload>(raw).is_err());
}
