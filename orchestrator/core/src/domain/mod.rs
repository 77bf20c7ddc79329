// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Value objects, aggregates, domain events and the trait seams the healer
//! application layer is written against.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure healing model, free of transport and storage concerns

pub mod error_report;
pub mod errors;
pub mod events;
pub mod healer_config;
pub mod healing;
pub mod knowledge;
pub mod mutator;
pub mod pattern;
pub mod research;
pub mod solution;
