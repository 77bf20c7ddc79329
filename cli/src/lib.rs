// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AEGIS healer CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Command handlers, the HTTP client for a running healer
//!   server, and terminal rendering of healing results

pub mod client;
pub mod commands;
pub mod output;
