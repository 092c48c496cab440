// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn wire_form_is_camel_case_with_type_tag() {
    let ev = ProgressEvent::complete("job-1", "done");
    let json = serde_json::to_value(&ev).unwrap();
    assert_eq!(json["jobId"], "job-1");
    assert_eq!(json["type"], "complete");
    assert_eq!(json["result"], "done");
    assert!(json.get("message").is_none());
}

#[test]
fn file_event_carries_path_and_caption() {
    let ev = ProgressEvent::file("job-2", "out/plot.png", Some("the plot".into()));
    let json = serde_json::to_value(&ev).unwrap();
    assert_eq!(json["filePath"], "out/plot.png");
    assert_eq!(json["caption"], "the plot");
}

#[test]
fn only_complete_and_error_are_terminal() {
    assert!(ProgressEvent::complete("j", "r").is_terminal());
    assert!(ProgressEvent::error("j", "e").is_terminal());
    assert!(!ProgressEvent::progress("j", "m").is_terminal());
    assert!(!ProgressEvent::typing("j").is_terminal());
    assert!(!ProgressEvent::file("j", "p", None).is_terminal());
}

#[test]
fn round_trips() {
    let ev = ProgressEvent::progress("job-3", "working on it");
    let back: ProgressEvent =
        serde_json::from_str(&serde_json::to_string(&ev).unwrap()).unwrap();
    assert_eq!(ev, back);
}
