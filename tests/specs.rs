// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level spec tests: cross-crate properties that do not need a
//! live Redis. Broker round trips against a real instance are exercised by
//! operators with `redis-server` running; everything here is hermetic.

#[path = "specs/pipeline.rs"]
mod pipeline;
#[path = "specs/routing.rs"]
mod routing;
#[path = "specs/vault_rotation.rs"]
mod vault_rotation;
