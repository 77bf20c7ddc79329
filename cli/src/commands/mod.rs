// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the AEGIS healer CLI

pub mod cache;
pub mod catalog;
pub mod config;
pub mod heal;
pub mod serve;
pub mod stats;

pub use self::cache::CacheCommand;
pub use self::catalog::CatalogCommand;
pub use self::config::ConfigCommand;
pub use self::heal::{ClassifyArgs, HealArgs};
pub use self::serve::ServeArgs;
