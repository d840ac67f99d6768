// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Enforcement Domain Layer
//!
//! Pure domain types for policy evaluation. No I/O apart from the YAML
//! configuration loader.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`viewer_context`] | `ViewerContext`, `Actor`, `Subject`, `EntityKey` |
//! | [`policy`] | `Policy`, `PolicyArity`, `DecisionFn`, `PolicyOutcome`, `Decision` |
//! | [`builtin`] | `always_deny`, `always_allow`, `pass_and_log` |
//! | [`chain`] | `PolicyChain` |
//! | [`error`] | `EnforcementError` |
//! | [`config`] | `EnforcerConfig`, `EnforcerSpec` |

pub mod viewer_context;
pub mod policy;
pub mod builtin;
pub mod chain;
pub mod error;
pub mod config;

pub use viewer_context::{
    Actor, ContextKind, EntityKey, EvaluationToken, Subject, ViewerContext, ViewerContextKey,
};
pub use policy::{
    all, allow, deny, pass, Decision, DecisionFn, DecisionResult, Policy, PolicyArity,
    PolicyBuilder, PolicyId, PolicyMetadata, PolicyOutcome,
};
pub use chain::PolicyChain;
pub use error::EnforcementError;
pub use config::{EnforcerConfig, EnforcerSpec};
