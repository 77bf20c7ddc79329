// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application
//!
//! Use cases of the healer: classification, resolution, generation and
//! application, orchestrated per error report.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Pipeline services built on the domain seams

pub mod classifier;
pub mod codebase_analysis;
pub mod content_analysis;
pub mod factory;
pub mod file_structure;
pub mod fix_generator;
pub mod healing_applier;
pub mod knowledge_cache;
pub mod orchestrator;
pub mod pattern_catalog;
pub mod research_crawl;
pub mod resolver;
pub mod stats;
