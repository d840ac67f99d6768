// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for policy chain evaluation.
//!
//! Covers the evaluation contract end to end:
//! - fail-secure terminal deny (explicit, implicit and empty chains)
//! - short-circuiting on the first terminal decision
//! - privileged bypass and contexts without an acting actor
//! - cache memoization, arity scoping and clearing
//! - single-match skipping
//! - `all(...)` combinator folding and invalid outcomes
//! - scoped internal evaluation

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use warden_core::builtin::{always_allow, always_deny, pass_and_log};
use warden_core::{
    all, allow, deny, pass, Actor, Decision, DecisionFn, EnforcementError, Enforcer, EnforcerSpec,
    EntityKey, EvaluationCache, Policy, PolicyChain, PolicyMetadata, Subject, ViewerContext,
    ViewerContextHolder,
};

struct User {
    id: u64,
    roles: Vec<&'static str>,
    anonymous: bool,
}

impl Actor for User {
    fn key(&self) -> EntityKey {
        self.id.into()
    }

    fn has_role(&self, role: &str) -> bool {
        self.roles.contains(&role)
    }

    fn is_anonymous(&self) -> bool {
        self.anonymous
    }
}

struct Doc {
    id: u64,
    owner: u64,
    context: Mutex<Option<ViewerContext<User>>>,
}

impl Subject for Doc {
    fn key(&self) -> EntityKey {
        format!("doc:{}", self.id).into()
    }
}

impl ViewerContextHolder<User> for Doc {
    fn viewer_context(&self) -> Option<ViewerContext<User>> {
        self.context.lock().clone()
    }

    fn replace_viewer_context(&self, context: Option<ViewerContext<User>>) -> Option<ViewerContext<User>> {
        std::mem::replace(&mut *self.context.lock(), context)
    }
}

fn user(id: u64) -> User {
    User { id, roles: vec![], anonymous: false }
}

fn admin(id: u64) -> User {
    User { id, roles: vec!["admin"], anonymous: false }
}

fn doc(id: u64, owner: u64) -> Doc {
    Doc { id, owner, context: Mutex::new(None) }
}

fn as_actor(user: User) -> ViewerContext<User> {
    ViewerContext::for_actor(user)
}

fn enforcer() -> Enforcer {
    // Resolution and audit lines show up with `cargo test -- --nocapture`.
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warden_core=debug")
        .with_test_writer()
        .try_init();
    Enforcer::new(Arc::new(EvaluationCache::new()))
}

/// Decision function that counts its executions.
fn counting(calls: &Arc<AtomicUsize>, decision: Decision) -> DecisionFn<Doc, User> {
    let calls = Arc::clone(calls);
    DecisionFn::no_args(move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(decision.into())
    })
}

fn owner_policy() -> Policy<Doc, User> {
    Policy::builder("owner-can-edit")
        .comment("owners may edit their documents")
        .subject_and_actor(|doc: &Doc, user: &User| if doc.owner == user.id { allow() } else { pass() })
}

// ============================================================================
// Terminal deny
// ============================================================================

#[test]
fn test_empty_chain_denies() {
    let chain: Vec<Policy<Doc, User>> = vec![];
    assert!(!enforcer().evaluate(&chain, &doc(1, 1), &as_actor(user(1)), None).unwrap());
}

#[test]
fn test_implicit_terminal_matches_explicit_terminal() {
    let passing = || Policy::new(DecisionFn::no_args(pass));

    let implicit: Vec<Policy<Doc, User>> = vec![passing(), owner_policy()];
    let explicit = PolicyChain::from(vec![passing(), owner_policy()]).terminated();
    assert!(explicit.is_terminated());

    let enforcer = enforcer();
    for (subject, actor) in [(doc(1, 1), user(1)), (doc(2, 1), user(2))] {
        let ctx = as_actor(actor);
        assert_eq!(
            enforcer.evaluate(&implicit, &subject, &ctx, None).unwrap(),
            enforcer.evaluate(&explicit, &subject, &ctx, None).unwrap()
        );
    }
}

#[test]
fn test_only_passing_policies_deny() {
    let chain: Vec<Policy<Doc, User>> = vec![
        Policy::new(DecisionFn::no_args(pass)),
        Policy::new(DecisionFn::actor_only(|_: &User| pass())),
    ];
    assert!(!enforcer().evaluate(&chain, &doc(1, 1), &as_actor(user(1)), None).unwrap());
}

// ============================================================================
// Short-circuit
// ============================================================================

#[test]
fn test_allow_short_circuits_remaining_policies() {
    let later = Arc::new(AtomicUsize::new(0));
    let chain = vec![always_allow(), Policy::new(counting(&later, Decision::Deny))];

    assert!(enforcer().evaluate(&chain, &doc(1, 1), &as_actor(user(1)), None).unwrap());
    assert_eq!(later.load(Ordering::SeqCst), 0);
}

#[test]
fn test_deny_short_circuits_remaining_policies() {
    let later = Arc::new(AtomicUsize::new(0));
    let chain = vec![
        Policy::new(DecisionFn::no_args(deny)),
        Policy::new(counting(&later, Decision::Allow)),
    ];

    assert!(!enforcer().evaluate(&chain, &doc(1, 1), &as_actor(user(1)), None).unwrap());
    assert_eq!(later.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Built-in scenarios
// ============================================================================

#[test]
fn test_builtin_chains() {
    let enforcer = enforcer();
    let subject = doc(1, 1);
    let ctx = as_actor(user(1));

    let allow_then_deny: Vec<Policy<Doc, User>> = vec![always_allow(), always_deny()];
    assert!(enforcer.evaluate(&allow_then_deny, &subject, &ctx, None).unwrap());

    let deny_only: Vec<Policy<Doc, User>> = vec![always_deny()];
    assert!(!enforcer.evaluate(&deny_only, &subject, &ctx, None).unwrap());

    let logged = vec![pass_and_log(), always_allow(), always_deny()];
    assert!(enforcer.evaluate(&logged, &subject, &ctx, None).unwrap());
}

#[test]
fn test_owner_match() {
    let chain = PolicyChain::new().with(owner_policy()).terminated();
    let enforcer = enforcer();
    let subject = doc(7, 1);

    assert!(enforcer.evaluate(&chain, &subject, &as_actor(user(1)), None).unwrap());
    assert!(!enforcer.evaluate(&chain, &subject, &as_actor(user(2)), None).unwrap());
}

#[test]
fn test_direct_object_reaches_full_arity_policies() {
    let linked = Policy::builder("may-link-own-documents").full(
        |subject: &Doc, user: &User, target: Option<&Doc>| match target {
            Some(target) if subject.owner == user.id && target.owner == user.id => allow(),
            _ => pass(),
        },
    );
    let chain = vec![linked];
    let enforcer = enforcer();
    let ctx = as_actor(user(1));

    assert!(enforcer.evaluate(&chain, &doc(1, 1), &ctx, Some(&doc(2, 1))).unwrap());
    assert!(!enforcer.evaluate(&chain, &doc(1, 1), &ctx, Some(&doc(3, 9))).unwrap());
    assert!(!enforcer.evaluate(&chain, &doc(1, 1), &ctx, None).unwrap());
}

#[test]
fn test_api_context_is_visible_to_policies_and_cached_separately() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let admins_only = Policy::builder("admins-only").actor_only(move |user: &User| {
        seen.fetch_add(1, Ordering::SeqCst);
        if user.has_role("admin") { allow() } else { pass() }
    });
    let chain = vec![admins_only];
    let enforcer = enforcer();

    assert!(enforcer.evaluate(&chain, &doc(1, 1), &as_actor(admin(5)), None).unwrap());
    assert!(enforcer
        .evaluate(&chain, &doc(1, 1), &ViewerContext::for_api_actor(admin(5)), None)
        .unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Viewer contexts
// ============================================================================

#[test]
fn test_privileged_bypass_allows_without_running_policies() {
    let calls = Arc::new(AtomicUsize::new(0));
    let enforcer = enforcer();
    let bypass = ViewerContext::privileged_bypass("schema migration");

    let empty: Vec<Policy<Doc, User>> = vec![];
    assert!(enforcer.evaluate(&empty, &doc(1, 1), &bypass, None).unwrap());

    let denying = vec![Policy::new(counting(&calls, Decision::Deny)), always_deny()];
    assert!(enforcer.evaluate(&denying, &doc(1, 1), &bypass, None).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(enforcer.cache().is_empty());
}

#[test]
fn test_internal_context_has_no_acting_actor() {
    let subject = doc(1, 1);
    let chain = vec![always_allow()];

    let scope = warden_core::InternalEvaluationScope::<User, Doc>::enter(&subject);
    let internal = subject.viewer_context().unwrap();
    drop(scope);

    let err = enforcer().evaluate(&chain, &subject, &internal, None).unwrap_err();
    assert!(matches!(err, EnforcementError::MissingActingContext { .. }));
}

#[test]
fn test_anonymous_actor_cannot_pass_subject_policies() {
    let guest = User { id: 0, roles: vec![], anonymous: true };
    let chain = vec![owner_policy(), always_allow()];
    // Owner check would match id 0; anonymous actors never reach it.
    assert!(!enforcer().evaluate(&chain, &doc(1, 0), &as_actor(guest), None).unwrap());
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn test_cacheable_policy_runs_once_per_key() {
    let calls = Arc::new(AtomicUsize::new(0));
    let chain = vec![Policy::new(counting(&calls, Decision::Pass))];
    let enforcer = enforcer();
    let ctx = as_actor(user(1));

    assert!(!enforcer.evaluate(&chain, &doc(1, 1), &ctx, None).unwrap());
    assert!(!enforcer.evaluate(&chain, &doc(2, 1), &ctx, None).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_non_cacheable_policy_runs_every_time() {
    let calls = Arc::new(AtomicUsize::new(0));
    let policy = Policy::create("volatile", counting(&calls, Decision::Pass), None, false, false);
    let chain = vec![policy];
    let enforcer = enforcer();
    let ctx = as_actor(user(1));

    for _ in 0..3 {
        enforcer.evaluate(&chain, &doc(1, 1), &ctx, None).unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_subject_policies_are_cached_per_subject() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let chain = vec![Policy::new(DecisionFn::subject_and_actor(move |d: &Doc, u: &User| {
        seen.fetch_add(1, Ordering::SeqCst);
        if d.owner == u.id { allow() } else { pass() }
    }))];
    let enforcer = enforcer();
    let ctx = as_actor(user(1));

    assert!(enforcer.evaluate(&chain, &doc(1, 1), &ctx, None).unwrap());
    assert!(enforcer.evaluate(&chain, &doc(1, 1), &ctx, None).unwrap());
    assert!(!enforcer.evaluate(&chain, &doc(2, 3), &ctx, None).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_clear_forces_re_execution() {
    let calls = Arc::new(AtomicUsize::new(0));
    let chain = vec![Policy::new(counting(&calls, Decision::Allow))];
    let enforcer = enforcer();
    let ctx = as_actor(user(1));

    enforcer.evaluate(&chain, &doc(1, 1), &ctx, None).unwrap();
    assert!(!enforcer.cache().is_empty());

    enforcer.cache().clear();
    assert!(enforcer.cache().is_empty());

    enforcer.evaluate(&chain, &doc(1, 1), &ctx, None).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_disabled_cache_runs_every_time() {
    let mut settings = EnforcerSpec::default();
    settings.cache.enabled = false;
    let enforcer = Enforcer::with_settings(Arc::new(EvaluationCache::new()), settings);

    let calls = Arc::new(AtomicUsize::new(0));
    let chain = vec![Policy::new(counting(&calls, Decision::Pass))];
    let ctx = as_actor(user(1));

    enforcer.evaluate(&chain, &doc(1, 1), &ctx, None).unwrap();
    enforcer.evaluate(&chain, &doc(1, 1), &ctx, None).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_shared_cache_across_threads() {
    let calls = Arc::new(AtomicUsize::new(0));
    let chain = vec![Policy::new(counting(&calls, Decision::Allow))];
    let enforcer = enforcer();
    let ctx = as_actor(user(1));

    // Warm the cache so every thread reads the same entry.
    enforcer.evaluate(&chain, &doc(1, 1), &ctx, None).unwrap();

    std::thread::scope(|scope| {
        for id in 0..4 {
            let (enforcer, chain, ctx) = (&enforcer, &chain, &ctx);
            scope.spawn(move || {
                assert!(enforcer.evaluate(chain, &doc(id, 1), ctx, None).unwrap());
            });
        }
    });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Single match
// ============================================================================

fn single_match_owner(calls: &Arc<AtomicUsize>) -> Policy<Doc, User> {
    let seen = Arc::clone(calls);
    Policy::builder("primary-workspace")
        .single_match(true)
        .subject_and_actor(move |d: &Doc, u: &User| {
            seen.fetch_add(1, Ordering::SeqCst);
            if d.owner == u.id { allow() } else { pass() }
        })
}

#[test]
fn test_single_match_skips_other_subjects() {
    let calls = Arc::new(AtomicUsize::new(0));
    let chain = vec![single_match_owner(&calls)];
    let enforcer = enforcer();
    let ctx = as_actor(user(1));

    assert!(enforcer.evaluate(&chain, &doc(1, 1), &ctx, None).unwrap());
    // Also owned by user 1, but the single match is already taken.
    assert!(!enforcer.evaluate(&chain, &doc(2, 1), &ctx, None).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The recorded subject still resolves normally.
    assert!(enforcer.evaluate(&chain, &doc(1, 1), &ctx, None).unwrap());
    assert_eq!(enforcer.cache().single_match_len(), 1);
}

#[test]
fn test_single_match_skip_falls_through_to_later_policies() {
    let calls = Arc::new(AtomicUsize::new(0));
    let later_calls = Arc::new(AtomicUsize::new(0));
    let chain = vec![
        single_match_owner(&calls),
        Policy::create("shared-workspaces", counting(&later_calls, Decision::Allow), None, false, false),
        always_deny(),
    ];
    let enforcer = enforcer();
    let ctx = as_actor(user(1));

    assert!(enforcer.evaluate(&chain, &doc(1, 1), &ctx, None).unwrap());
    assert_eq!(later_calls.load(Ordering::SeqCst), 0);

    // Skipped as a pass, so the next policy decides.
    assert!(enforcer.evaluate(&chain, &doc(2, 1), &ctx, None).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(later_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_single_match_is_per_actor() {
    let calls = Arc::new(AtomicUsize::new(0));
    let chain = vec![single_match_owner(&calls)];
    let enforcer = enforcer();

    assert!(enforcer.evaluate(&chain, &doc(1, 1), &as_actor(user(1)), None).unwrap());
    assert!(enforcer.evaluate(&chain, &doc(2, 2), &as_actor(user(2)), None).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_single_match_resets_on_clear() {
    let calls = Arc::new(AtomicUsize::new(0));
    let chain = vec![single_match_owner(&calls)];
    let enforcer = enforcer();
    let ctx = as_actor(user(1));

    assert!(enforcer.evaluate(&chain, &doc(1, 1), &ctx, None).unwrap());
    enforcer.cache().clear();
    assert!(enforcer.evaluate(&chain, &doc(2, 1), &ctx, None).unwrap());
}

#[test]
fn test_single_match_disabled_by_settings() {
    let mut settings = EnforcerSpec::default();
    settings.single_match.enabled = false;
    let enforcer = Enforcer::with_settings(Arc::new(EvaluationCache::new()), settings);

    let calls = Arc::new(AtomicUsize::new(0));
    let chain = vec![single_match_owner(&calls)];
    let ctx = as_actor(user(1));

    assert!(enforcer.evaluate(&chain, &doc(1, 1), &ctx, None).unwrap());
    assert!(enforcer.evaluate(&chain, &doc(2, 1), &ctx, None).unwrap());
    assert_eq!(enforcer.cache().single_match_len(), 0);
}

// ============================================================================
// Combinators and invalid outcomes
// ============================================================================

#[test]
fn test_all_combinator_folds_children() {
    let enforcer = enforcer();
    let ctx = as_actor(admin(1));

    let every_allow = vec![Policy::new(DecisionFn::actor_only(|user: &User| {
        all(vec![
            Policy::new(DecisionFn::no_args(allow)),
            if user.has_role("admin") { always_allow() } else { always_deny() },
        ])
    }))];
    assert!(enforcer.evaluate(&every_allow, &doc(1, 1), &ctx, None).unwrap());

    let one_pass = vec![
        Policy::new(DecisionFn::no_args(|| {
            all(vec![Policy::new(DecisionFn::no_args(allow)), Policy::new(DecisionFn::no_args(pass))])
        })),
        always_allow(),
    ];
    // A passing child makes the combinator pass, so the next policy decides.
    assert!(enforcer.evaluate(&one_pass, &doc(1, 1), &ctx, None).unwrap());
}

#[test]
fn test_all_combinator_denies_on_first_deny() {
    let after_deny = Arc::new(AtomicUsize::new(0));
    let probe = Policy::new(counting(&after_deny, Decision::Allow));
    let chain = vec![
        Policy::new(DecisionFn::no_args(move || {
            all(vec![Policy::new(DecisionFn::no_args(deny)), probe.clone()])
        })),
        always_allow(),
    ];

    assert!(!enforcer().evaluate(&chain, &doc(1, 1), &as_actor(user(1)), None).unwrap());
    assert_eq!(after_deny.load(Ordering::SeqCst), 0);
}

#[test]
fn test_empty_all_is_invalid_outcome() {
    let chain = vec![Policy::create(
        "broken-combinator",
        DecisionFn::no_args(|| all(Vec::new())),
        None,
        true,
        false,
    )];

    let err = enforcer().evaluate(&chain, &doc(1, 1), &as_actor(user(1)), None).unwrap_err();
    match err {
        EnforcementError::InvalidPolicyOutcome { policy, .. } => assert_eq!(policy, "broken-combinator"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_decision_function_error_propagates() {
    let chain = vec![Policy::builder("lookup-membership")
        .actor_only(|_: &User| Err(anyhow::anyhow!("membership store unavailable")))];

    let err = enforcer().evaluate(&chain, &doc(1, 1), &as_actor(user(1)), None).unwrap_err();
    assert!(matches!(err, EnforcementError::DecisionFailed { ref policy, .. } if policy == "lookup-membership"));
    assert!(err.to_string().contains("membership store unavailable"));
}

#[test]
fn test_configure_twice_fails() {
    let policy: Policy<Doc, User> = Policy::new(DecisionFn::no_args(pass));
    policy.configure(PolicyMetadata::named("first")).unwrap();

    assert!(matches!(
        policy.configure(PolicyMetadata::named("second")),
        Err(EnforcementError::PolicyAlreadyFinalized { .. })
    ));
}

// ============================================================================
// Scoped evaluation
// ============================================================================

fn observes_internal_context(seen: &Arc<AtomicUsize>) -> Policy<Doc, User> {
    let seen = Arc::clone(seen);
    Policy::builder("reads-related-entities")
        .cacheable(false)
        .subject_and_actor(move |d: &Doc, _: &User| {
            if d.viewer_context().is_some_and(|ctx| ctx.is_internal_evaluation()) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
            allow()
        })
}

#[test]
fn test_scoped_evaluation_swaps_and_restores_context() {
    let seen = Arc::new(AtomicUsize::new(0));
    let chain = vec![observes_internal_context(&seen)];
    let subject = doc(1, 1);
    subject.replace_viewer_context(Some(as_actor(user(1))));

    assert!(enforcer().evaluate_scoped(&chain, &subject, &as_actor(user(1)), None).unwrap());
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    let restored = subject.viewer_context().unwrap();
    assert!(!restored.is_internal_evaluation());
    assert_eq!(restored.acting_actor().unwrap().key(), EntityKey::from(1u64));
}

#[test]
fn test_scoped_evaluation_restores_context_on_error() {
    let chain = vec![Policy::builder("always-fails").subject_and_actor(|d: &Doc, _: &User| {
        assert!(d.viewer_context().unwrap().is_internal_evaluation());
        Err(anyhow::anyhow!("related entity missing"))
    })];
    let subject = doc(1, 1);
    subject.replace_viewer_context(Some(ViewerContext::for_api_actor(user(4))));

    let result = enforcer().evaluate_scoped(&chain, &subject, &as_actor(user(4)), None);
    assert!(matches!(result, Err(EnforcementError::DecisionFailed { .. })));
    assert!(subject.viewer_context().unwrap().is_api());
}

#[test]
fn test_scoped_evaluation_with_bypass_leaves_context_untouched() {
    let seen = Arc::new(AtomicUsize::new(0));
    let chain = vec![observes_internal_context(&seen)];
    let subject = doc(1, 1);

    assert!(enforcer()
        .evaluate_scoped(&chain, &subject, &ViewerContext::privileged_bypass("backfill"), None)
        .unwrap());
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert!(subject.viewer_context().is_none());
}
