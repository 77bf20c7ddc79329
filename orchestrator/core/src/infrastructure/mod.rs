// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod fix_template_engine;
pub mod knowledge;
pub mod mutators;
pub mod research;

pub use event_bus::{EventBus, EventBusError, EventReceiver, HealingEventReceiver};
pub use fix_template_engine::FixTemplateEngine;
