// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Enforcer Application Service
//!
//! Runs a policy chain for one `(subject, viewer context, direct object)`
//! triple and returns whether the action is allowed.
//!
//! ## Chain Evaluation
//!
//! 1. A privileged bypass context allows immediately (audit-logged).
//! 2. The acting actor is extracted from the context.
//! 3. An empty chain is replaced by the built-in always-deny policy.
//! 4. A chain that does not end in always-deny gets it appended.
//! 5. Policies are resolved in order; the first `Allow` or `Deny` wins.
//!
//! ## Policy Resolution
//!
//! Single-match registry, then decision cache, then execution with
//! arity-bound arguments. `all(...)` combinators are folded: any deny denies,
//! all allow allows, anything else passes. Cache and registry writes follow
//! execution. No lock is held while a decision function runs.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error, warn};

use crate::domain::builtin;
use crate::domain::config::EnforcerSpec;
use crate::domain::error::EnforcementError;
use crate::domain::policy::{Decision, Policy, PolicyOutcome};
use crate::domain::viewer_context::{Actor, Subject, ViewerContext, ViewerContextKey};
use crate::infrastructure::audit::EnforcementAuditLogger;
use crate::infrastructure::evaluation_cache::{CacheKey, EvaluationCache, SingleMatchKey};

use super::evaluation_scope::{InternalEvaluationScope, ViewerContextHolder};

/// Where a policy result came from, for the resolution log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provenance {
    Executed,
    Cached,
    SingleMatchSkipped,
}

pub struct Enforcer {
    cache: Arc<EvaluationCache>,
    settings: EnforcerSpec,
    audit: EnforcementAuditLogger,
}

impl Enforcer {
    pub fn new(cache: Arc<EvaluationCache>) -> Self {
        Self::with_settings(cache, EnforcerSpec::default())
    }

    pub fn with_settings(cache: Arc<EvaluationCache>, settings: EnforcerSpec) -> Self {
        Self {
            cache,
            settings,
            audit: EnforcementAuditLogger::new(),
        }
    }

    pub fn cache(&self) -> &Arc<EvaluationCache> {
        &self.cache
    }

    pub fn settings(&self) -> &EnforcerSpec {
        &self.settings
    }

    /// Evaluate `policies` in order and return whether the action is allowed.
    ///
    /// # Errors
    ///
    /// - `MissingActingContext`: `viewer_context` carries no actor
    /// - `InvalidPolicyOutcome`: a policy returned an empty combinator
    /// - `DecisionFailed`: a decision function returned an error
    pub fn evaluate<S, A>(
        &self,
        policies: &[Policy<S, A>],
        subject: &S,
        viewer_context: &ViewerContext<A>,
        direct_object: Option<&S>,
    ) -> Result<bool, EnforcementError>
    where
        S: Subject + 'static,
        A: Actor + 'static,
    {
        if let ViewerContext::PrivilegedBypass { reason, .. } = viewer_context {
            self.audit.log_bypass_used(reason, policies.len());
            counter!("warden_privileged_bypass_total").increment(1);
            return Ok(true);
        }

        let actor = viewer_context.acting_actor()?;
        let context_key = viewer_context.cache_key();

        let terminal = builtin::always_deny();
        let tail = if policies.is_empty() {
            error!(subject = %subject.key(), "No policy defined, denying by default");
            Some(&terminal)
        } else if !policies.last().is_some_and(Policy::is_always_deny) {
            if self.settings.chain.warn_on_implicit_deny {
                warn!(
                    subject = %subject.key(),
                    chain_len = policies.len(),
                    "Policy chain does not end with {}, appending it",
                    builtin::ALWAYS_DENY
                );
            } else {
                debug!(chain_len = policies.len(), "Appending {} to policy chain", builtin::ALWAYS_DENY);
            }
            Some(&terminal)
        } else {
            None
        };

        for policy in policies.iter().chain(tail) {
            match self.resolve(policy, subject, actor, &context_key, direct_object)? {
                Decision::Allow => return Ok(record_result(true)),
                Decision::Deny => return Ok(record_result(false)),
                Decision::Pass => continue,
            }
        }

        Ok(record_result(false))
    }

    /// Evaluate with the subject's own viewer context swapped to
    /// `InternalEvaluation` for the duration of the call, so decision
    /// functions can traverse related entities without re-triggering
    /// filtering. The previous context is restored on every exit path.
    pub fn evaluate_scoped<S, A>(
        &self,
        policies: &[Policy<S, A>],
        subject: &S,
        viewer_context: &ViewerContext<A>,
        direct_object: Option<&S>,
    ) -> Result<bool, EnforcementError>
    where
        S: Subject + ViewerContextHolder<A> + 'static,
        A: Actor + 'static,
    {
        if viewer_context.is_privileged_bypass() {
            return self.evaluate(policies, subject, viewer_context, direct_object);
        }

        let _scope = InternalEvaluationScope::<A, S>::enter(subject);
        self.evaluate(policies, subject, viewer_context, direct_object)
    }

    fn resolve<S, A>(
        &self,
        policy: &Policy<S, A>,
        subject: &S,
        actor: &A,
        context_key: &ViewerContextKey,
        direct_object: Option<&S>,
    ) -> Result<Decision, EnforcementError>
    where
        S: Subject,
        A: Actor,
    {
        let single_match_key = (policy.single_match() && self.settings.single_match.enabled)
            .then(|| SingleMatchKey {
                policy: policy.id(),
                context: context_key.clone(),
            });

        if let Some(key) = &single_match_key {
            if let Some(holder) = self.cache.single_match_holder(key) {
                if holder != subject.key() {
                    counter!("warden_single_match_skips_total").increment(1);
                    log_resolution(policy, Decision::Pass, Provenance::SingleMatchSkipped);
                    return Ok(Decision::Pass);
                }
            }
        }

        let cache_key = (policy.cacheable() && self.settings.cache.enabled).then(|| {
            CacheKey::scoped(policy.id(), policy.arity(), context_key, subject, direct_object)
        });

        let (decision, provenance) = match cache_key.as_ref().and_then(|key| self.cache.get(key)) {
            Some(decision) => {
                counter!("warden_policy_cache_hits_total").increment(1);
                (decision, Provenance::Cached)
            }
            None => {
                let decision = self.execute(policy, subject, actor, direct_object)?;
                if let Some(key) = cache_key {
                    self.cache.insert(key, decision);
                }
                (decision, Provenance::Executed)
            }
        };

        if let Some(key) = single_match_key {
            if decision == Decision::Allow {
                self.cache.record_single_match(key, subject.key());
            }
        }

        log_resolution(policy, decision, provenance);
        Ok(decision)
    }

    /// Bind arguments by arity, run the decision function and fold any
    /// combinator. Children of a combinator go through this path only: no
    /// cache, no single-match registry, no terminal append.
    fn execute<S, A>(
        &self,
        policy: &Policy<S, A>,
        subject: &S,
        actor: &A,
        direct_object: Option<&S>,
    ) -> Result<Decision, EnforcementError>
    where
        S: Subject,
        A: Actor,
    {
        if actor.is_anonymous() && policy.arity().inspects_subject() {
            warn!(
                policy = %policy.display_name(),
                actor = %actor.key(),
                "Actor has no role-check context, denying"
            );
            return Ok(Decision::Deny);
        }

        let outcome = policy
            .decision_fn()
            .invoke(subject, actor, direct_object)
            .map_err(|source| EnforcementError::DecisionFailed {
                policy: policy.display_name(),
                source,
            })?;

        match outcome {
            PolicyOutcome::Allow => Ok(Decision::Allow),
            PolicyOutcome::Deny => Ok(Decision::Deny),
            PolicyOutcome::Pass => Ok(Decision::Pass),
            PolicyOutcome::All(children) => {
                if children.is_empty() {
                    return Err(EnforcementError::InvalidPolicyOutcome {
                        policy: policy.display_name(),
                        reason: "all() combinator has no child policies".to_string(),
                    });
                }

                let mut every_child_allowed = true;
                for child in &children {
                    match self.execute(child, subject, actor, direct_object)? {
                        Decision::Deny => return Ok(Decision::Deny),
                        Decision::Pass => every_child_allowed = false,
                        Decision::Allow => {}
                    }
                }

                Ok(if every_child_allowed {
                    Decision::Allow
                } else {
                    Decision::Pass
                })
            }
        }
    }
}

fn record_result(allowed: bool) -> bool {
    let decision = if allowed { "allow" } else { "deny" };
    counter!("warden_evaluations_total", "decision" => decision).increment(1);
    allowed
}

fn log_resolution<S, A>(policy: &Policy<S, A>, decision: Decision, provenance: Provenance) {
    let comment = if decision.is_terminal() {
        policy.comment().unwrap_or_default()
    } else {
        ""
    };
    let cached = provenance == Provenance::Cached;
    let single_match_skipped = provenance == Provenance::SingleMatchSkipped;
    debug!(
        policy = %policy.display_name(),
        decision = %decision,
        cached,
        single_match_skipped,
        comment,
        "Policy resolved"
    );
}
