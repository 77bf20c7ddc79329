// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Research Source Infrastructure - Anti-Corruption Layer Implementations
//
// Each adapter translates a vendor search API into the domain's
// ResearchSource interface.

pub mod http;
pub mod issue_search;
pub mod qa_search;
pub mod registry;
pub mod web_search;

pub use issue_search::IssueSearchSource;
pub use qa_search::QaSearchSource;
pub use registry::ResearchSourceRegistry;
pub use web_search::WebSearchSource;
