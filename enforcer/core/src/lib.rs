// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `warden-core`: Policy Chain Evaluation Engine
//!
//! Decides whether an actor may perform an action on a subject by running an
//! ordered chain of small policies until one of them allows or denies.
//! Anything that falls through the chain is denied.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Policy`, `PolicyChain`, `ViewerContext`, `EnforcementError`, `EnforcerConfig` |
//! | [`application`] | Application | `Enforcer`, `InternalEvaluationScope` |
//! | [`infrastructure`] | Infrastructure | `EvaluationCache`, `EnforcementAuditLogger` |
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use warden_core::{allow, pass, Actor, EntityKey, Enforcer, EvaluationCache, Policy, PolicyChain, Subject, ViewerContext};
//!
//! struct User(u64);
//! impl Actor for User {
//!     fn key(&self) -> EntityKey { self.0.into() }
//!     fn has_role(&self, _role: &str) -> bool { false }
//! }
//!
//! struct Doc { id: u64, owner: u64 }
//! impl Subject for Doc {
//!     fn key(&self) -> EntityKey { self.id.into() }
//! }
//!
//! let owner_can_edit = Policy::builder("owner-can-edit")
//!     .subject_and_actor(|doc: &Doc, user: &User| if doc.owner == user.0 { allow() } else { pass() });
//! let chain = PolicyChain::new().with(owner_can_edit).terminated();
//!
//! let enforcer = Enforcer::new(Arc::new(EvaluationCache::new()));
//! let doc = Doc { id: 7, owner: 1 };
//! assert!(enforcer.evaluate(&chain, &doc, &ViewerContext::for_actor(User(1)), None).unwrap());
//! assert!(!enforcer.evaluate(&chain, &doc, &ViewerContext::for_actor(User(2)), None).unwrap());
//! ```

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::{Enforcer, InternalEvaluationScope, ViewerContextHolder};
pub use infrastructure::{EnforcementAuditLogger, EvaluationCache};
