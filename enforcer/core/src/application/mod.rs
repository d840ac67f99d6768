// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod enforcer;
pub mod evaluation_scope;

pub use enforcer::Enforcer;
pub use evaluation_scope::{InternalEvaluationScope, ViewerContextHolder};
