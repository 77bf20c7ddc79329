// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Knowledge Store Infrastructure
//
// Concrete backends for the knowledge cache: a size-bounded in-process LRU
// and an embedded sled database for persistence across restarts.

pub mod memory;
pub mod sled_store;

pub use memory::InMemoryKnowledgeStore;
pub use sled_store::SledKnowledgeStore;
