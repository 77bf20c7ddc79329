// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AEGIS Healer Core
//!
//! Autonomous error healing: runtime error reports are classified against a
//! pattern catalog, resolved into candidate solutions by escalating research
//! strategies, rendered into concrete patches, and applied to a live target
//! with verification and rollback.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Wires the domain, application, infrastructure and
//!   presentation layers of the healer

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
