// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

#[test]
fn generated_job_id_has_prefix_and_length() {
    let id = JobId::new();
    assert!(id.as_str().starts_with("job-"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
}

#[test]
fn generated_ids_are_unique() {
    let a = JobId::new();
    let b = JobId::new();
    assert_ne!(a, b);
}

#[test]
fn id_hash_map_lookup_by_str() {
    let mut map = HashMap::new();
    map.insert(JobId::from_string("job-abc"), 42);
    assert_eq!(map.get("job-abc"), Some(&42));
}

#[test]
fn id_round_trips_through_json() {
    let id = JobId::new();
    let json = serde_json::to_string(&id).unwrap();
    let back: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, back);
}

#[test]
fn oversized_id_rejected_on_deserialize() {
    let long = format!("\"job-{}\"", "x".repeat(40));
    assert!(serde_json::from_str::<JobId>(&long).is_err());
}

#[test]
fn idbuf_display_matches_input() {
    let buf = IdBuf::new("prc-xyz");
    assert_eq!(buf.to_string(), "prc-xyz");
    assert!(!buf.is_empty());
}
