// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod evaluation_cache;
pub mod audit;

pub use evaluation_cache::{CacheKey, EvaluationCache, SingleMatchKey};
pub use audit::EnforcementAuditLogger;
