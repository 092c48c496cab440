// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn cache_in(dir: &tempfile::TempDir) -> PromptCache {
    let mind = dir.path().join("mind");
    let skills = dir.path().join("skills");
    std::fs::create_dir_all(&mind).unwrap();
    std::fs::create_dir_all(&skills).unwrap();
    PromptCache::new(mind, skills)
}

#[test]
fn identity_files_lead_the_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(&dir);
    std::fs::write(dir.path().join("mind/identity.md"), "I am Scaly.").unwrap();
    cache.invalidate();
    let prompt = cache.assemble();
    assert!(prompt.starts_with("I am Scaly."));
    assert!(prompt.contains("## Runtime"));
}

#[test]
fn assembly_is_cached_until_invalidated() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(&dir);
    let first = cache.assemble();

    std::fs::write(dir.path().join("mind/identity.md"), "New identity.").unwrap();
    // Still cached: the file change is invisible until a reload signal.
    assert_eq!(cache.assemble(), first);

    cache.invalidate();
    assert!(cache.assemble().contains("New identity."));
}

#[test]
fn skills_appear_when_bundles_exist() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(&dir);
    let skill = dir.path().join("skills/weather");
    std::fs::create_dir_all(&skill).unwrap();
    std::fs::write(skill.join("skill.json"), "{}").unwrap();
    cache.invalidate();
    assert!(cache.assemble().contains("Available skills: weather"));
}

#[test]
fn agents_and_mcp_lists_are_dynamic() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(&dir);
    cache.set_agents(vec!["researcher".into()]);
    cache.set_mcp_servers(vec!["github".into()]);
    let prompt = cache.assemble();
    assert!(prompt.contains("Delegable agents: researcher"));
    assert!(prompt.contains("Connected MCP servers: github"));
}

#[test]
fn dirs_without_bundles_are_not_skills() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(&dir);
    std::fs::create_dir_all(dir.path().join("skills/not-a-skill")).unwrap();
    cache.invalidate();
    assert!(!cache.assemble().contains("not-a-skill"));
}
