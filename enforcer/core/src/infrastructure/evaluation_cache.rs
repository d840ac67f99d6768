// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Evaluation Cache
//!
//! Two independent maps that live for one host-defined unit of work:
//!
//! - **decisions**: arity-scoped [`CacheKey`] → resolved [`Decision`]
//! - **single matches**: [`SingleMatchKey`] → the one subject that matched
//!
//! Entries are authoritative until the host calls [`EvaluationCache::clear`],
//! typically once per inbound request. There is no time- or size-based
//! eviction and no per-entry invalidation.
//!
//! Thread-safe with `parking_lot::RwLock`, so one instance can be shared by
//! every evaluation of a unit of work. Sharing one cache across independent
//! requests is the host's decision.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::domain::policy::{Decision, PolicyArity, PolicyId};
use crate::domain::viewer_context::{ContextKind, EntityKey, Subject, ViewerContextKey};

/// Decision cache key. Which fields participate depends on the policy arity:
/// a policy is only keyed by what it can see.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub policy: PolicyId,
    pub context: ContextKind,
    pub actor: Option<EntityKey>,
    pub subject: Option<EntityKey>,
    pub direct_object: Option<EntityKey>,
}

impl CacheKey {
    pub fn scoped<S: Subject>(
        policy: PolicyId,
        arity: PolicyArity,
        context: &ViewerContextKey,
        subject: &S,
        direct_object: Option<&S>,
    ) -> Self {
        let actor = match arity {
            PolicyArity::NoArgs => None,
            _ => context.actor.clone(),
        };
        let subject = arity.inspects_subject().then(|| subject.key());
        let direct_object = match arity {
            PolicyArity::Full => direct_object.map(Subject::key),
            _ => None,
        };

        Self {
            policy,
            context: context.kind,
            actor,
            subject,
            direct_object,
        }
    }
}

/// Single-match registry key: one entry per policy, actor and context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SingleMatchKey {
    pub policy: PolicyId,
    pub context: ViewerContextKey,
}

#[derive(Default)]
pub struct EvaluationCache {
    decisions: RwLock<HashMap<CacheKey, Decision>>,
    single_matches: RwLock<HashMap<SingleMatchKey, EntityKey>>,
}

impl EvaluationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Decision> {
        self.decisions.read().get(key).copied()
    }

    pub fn insert(&self, key: CacheKey, decision: Decision) {
        self.decisions.write().insert(key, decision);
    }

    /// The subject already recorded as the single match, if any.
    pub fn single_match_holder(&self, key: &SingleMatchKey) -> Option<EntityKey> {
        self.single_matches.read().get(key).cloned()
    }

    /// Record `subject` as the single match. The first recorded subject wins
    /// until the cache is cleared.
    pub fn record_single_match(&self, key: SingleMatchKey, subject: EntityKey) {
        self.single_matches.write().entry(key).or_insert(subject);
    }

    /// Number of cached decisions
    pub fn len(&self) -> usize {
        self.decisions.read().len()
    }

    pub fn single_match_len(&self) -> usize {
        self.single_matches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.single_match_len() == 0
    }

    /// Reset both maps. Both write locks are held together so no reader sees
    /// one map cleared and the other populated.
    pub fn clear(&self) {
        let mut decisions = self.decisions.write();
        let mut single_matches = self.single_matches.write();
        debug!(
            "Clearing evaluation cache: decisions={}, single_matches={}",
            decisions.len(),
            single_matches.len()
        );
        decisions.clear();
        single_matches.clear();
    }
}
