// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Value Object
//!
//! A [`Policy`] wraps one decision function plus write-once metadata. The
//! function's arity is chosen explicitly at construction through the
//! [`DecisionFn`] variant and decides which arguments the enforcer binds:
//!
//! | Arity | Arguments |
//! |-------|-----------|
//! | `NoArgs` | `()` |
//! | `ActorOnly` | `(actor)` |
//! | `SubjectAndActor` | `(subject, actor)` |
//! | `Full` | `(subject, actor, direct_object)` |
//!
//! Decision functions return a [`DecisionResult`]. The helpers [`allow`],
//! [`deny`], [`pass`] and [`all`] build the four possible outcomes; `all`
//! defers to child policies that must every one allow.
//!
//! Policies are cheap to clone; clones share identity, function and metadata.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use super::error::EnforcementError;

/// Process-unique policy identity, shared by clones of the same policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyId(u64);

impl PolicyId {
    pub(crate) const ALWAYS_DENY: PolicyId = PolicyId(1);
    pub(crate) const ALWAYS_ALLOW: PolicyId = PolicyId(2);
    pub(crate) const PASS_AND_LOG: PolicyId = PolicyId(3);

    // Ids below this are reserved for built-ins.
    const FIRST_USER_ID: u64 = 1024;

    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(PolicyId::FIRST_USER_ID);
        PolicyId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which arguments a decision function receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyArity {
    NoArgs,
    ActorOnly,
    SubjectAndActor,
    Full,
}

impl PolicyArity {
    /// Declared parameter count, 0 to 3.
    pub fn parameter_count(&self) -> u8 {
        match self {
            PolicyArity::NoArgs => 0,
            PolicyArity::ActorOnly => 1,
            PolicyArity::SubjectAndActor => 2,
            PolicyArity::Full => 3,
        }
    }

    pub fn inspects_subject(&self) -> bool {
        matches!(self, PolicyArity::SubjectAndActor | PolicyArity::Full)
    }
}

/// A resolved policy result. Combinators are always folded into one of these
/// before caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
    Pass,
}

impl Decision {
    /// `Allow` and `Deny` end chain evaluation.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Decision::Pass)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny => "deny",
            Decision::Pass => "pass",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a decision function returns.
pub enum PolicyOutcome<S, A> {
    Allow,
    Deny,
    Pass,
    /// Every child policy must allow.
    All(Vec<Policy<S, A>>),
}

impl<S, A> From<Decision> for PolicyOutcome<S, A> {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Allow => PolicyOutcome::Allow,
            Decision::Deny => PolicyOutcome::Deny,
            Decision::Pass => PolicyOutcome::Pass,
        }
    }
}

impl<S, A> fmt::Debug for PolicyOutcome<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyOutcome::Allow => f.write_str("Allow"),
            PolicyOutcome::Deny => f.write_str("Deny"),
            PolicyOutcome::Pass => f.write_str("Pass"),
            PolicyOutcome::All(children) => f
                .debug_tuple("All")
                .field(&children.iter().map(|p| p.display_name()).collect::<Vec<_>>())
                .finish(),
        }
    }
}

pub type DecisionResult<S, A> = anyhow::Result<PolicyOutcome<S, A>>;

pub fn allow<S, A>() -> DecisionResult<S, A> {
    Ok(PolicyOutcome::Allow)
}

pub fn deny<S, A>() -> DecisionResult<S, A> {
    Ok(PolicyOutcome::Deny)
}

pub fn pass<S, A>() -> DecisionResult<S, A> {
    Ok(PolicyOutcome::Pass)
}

/// Defer to `policies`; the result allows only if every one of them allows.
///
/// The list must not be empty. An empty `all` is not a vacuous allow: the
/// enforcer rejects it with `EnforcementError::InvalidPolicyOutcome`.
pub fn all<S, A>(policies: impl IntoIterator<Item = Policy<S, A>>) -> DecisionResult<S, A> {
    Ok(PolicyOutcome::All(policies.into_iter().collect()))
}

type NoArgsFn<S, A> = dyn Fn() -> DecisionResult<S, A> + Send + Sync;
type ActorOnlyFn<S, A> = dyn Fn(&A) -> DecisionResult<S, A> + Send + Sync;
type SubjectAndActorFn<S, A> = dyn Fn(&S, &A) -> DecisionResult<S, A> + Send + Sync;
type FullFn<S, A> = dyn Fn(&S, &A, Option<&S>) -> DecisionResult<S, A> + Send + Sync;

/// A decision function tagged with its arity.
pub enum DecisionFn<S, A> {
    NoArgs(Arc<NoArgsFn<S, A>>),
    ActorOnly(Arc<ActorOnlyFn<S, A>>),
    SubjectAndActor(Arc<SubjectAndActorFn<S, A>>),
    Full(Arc<FullFn<S, A>>),
}

impl<S, A> DecisionFn<S, A> {
    pub fn no_args<F>(f: F) -> Self
    where
        F: Fn() -> DecisionResult<S, A> + Send + Sync + 'static,
    {
        DecisionFn::NoArgs(Arc::new(f))
    }

    pub fn actor_only<F>(f: F) -> Self
    where
        F: Fn(&A) -> DecisionResult<S, A> + Send + Sync + 'static,
    {
        DecisionFn::ActorOnly(Arc::new(f))
    }

    pub fn subject_and_actor<F>(f: F) -> Self
    where
        F: Fn(&S, &A) -> DecisionResult<S, A> + Send + Sync + 'static,
    {
        DecisionFn::SubjectAndActor(Arc::new(f))
    }

    pub fn full<F>(f: F) -> Self
    where
        F: Fn(&S, &A, Option<&S>) -> DecisionResult<S, A> + Send + Sync + 'static,
    {
        DecisionFn::Full(Arc::new(f))
    }

    pub fn arity(&self) -> PolicyArity {
        match self {
            DecisionFn::NoArgs(_) => PolicyArity::NoArgs,
            DecisionFn::ActorOnly(_) => PolicyArity::ActorOnly,
            DecisionFn::SubjectAndActor(_) => PolicyArity::SubjectAndActor,
            DecisionFn::Full(_) => PolicyArity::Full,
        }
    }

    /// Bind arguments by arity and run the function.
    pub(crate) fn invoke(
        &self,
        subject: &S,
        actor: &A,
        direct_object: Option<&S>,
    ) -> DecisionResult<S, A> {
        match self {
            DecisionFn::NoArgs(f) => f(),
            DecisionFn::ActorOnly(f) => f(actor),
            DecisionFn::SubjectAndActor(f) => f(subject, actor),
            DecisionFn::Full(f) => f(subject, actor, direct_object),
        }
    }
}

impl<S, A> Clone for DecisionFn<S, A> {
    fn clone(&self) -> Self {
        match self {
            DecisionFn::NoArgs(f) => DecisionFn::NoArgs(Arc::clone(f)),
            DecisionFn::ActorOnly(f) => DecisionFn::ActorOnly(Arc::clone(f)),
            DecisionFn::SubjectAndActor(f) => DecisionFn::SubjectAndActor(Arc::clone(f)),
            DecisionFn::Full(f) => DecisionFn::Full(Arc::clone(f)),
        }
    }
}

/// Descriptive and behavioural policy metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyMetadata {
    /// Human-readable name used in log lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Logged when the policy produces a terminal decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Results may be memoized in the evaluation cache.
    #[serde(default = "default_true")]
    pub cacheable: bool,

    /// At most one subject can satisfy this policy per actor.
    #[serde(default)]
    pub single_match: bool,
}

fn default_true() -> bool {
    true
}

static UNCONFIGURED: PolicyMetadata = PolicyMetadata {
    name: None,
    comment: None,
    cacheable: true,
    single_match: false,
};

impl Default for PolicyMetadata {
    fn default() -> Self {
        UNCONFIGURED.clone()
    }
}

impl PolicyMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

struct PolicyInner<S, A> {
    id: PolicyId,
    decision: DecisionFn<S, A>,
    metadata: OnceLock<PolicyMetadata>,
}

/// An immutable, named, arity-typed decision function.
pub struct Policy<S, A> {
    inner: Arc<PolicyInner<S, A>>,
}

impl<S, A> Clone for Policy<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, A> fmt::Debug for Policy<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("arity", &self.arity())
            .field("cacheable", &self.cacheable())
            .field("single_match", &self.single_match())
            .finish()
    }
}

impl<S, A> From<DecisionFn<S, A>> for Policy<S, A> {
    fn from(decision: DecisionFn<S, A>) -> Self {
        Policy::new(decision)
    }
}

impl<S, A> Policy<S, A> {
    /// An unconfigured policy. Default metadata applies until
    /// [`Policy::configure`] is called once.
    pub fn new(decision: DecisionFn<S, A>) -> Self {
        Self::with_id(PolicyId::next(), decision, OnceLock::new())
    }

    /// Construct and finalize a policy in one step.
    pub fn create(
        name: impl Into<String>,
        decision: DecisionFn<S, A>,
        comment: Option<&str>,
        cacheable: bool,
        single_match: bool,
    ) -> Self {
        let metadata = PolicyMetadata {
            name: Some(name.into()),
            comment: comment.map(str::to_string),
            cacheable,
            single_match,
        };
        Self::with_id(PolicyId::next(), decision, OnceLock::from(metadata))
    }

    pub fn builder(name: impl Into<String>) -> PolicyBuilder<S, A> {
        PolicyBuilder::new(name)
    }

    pub(crate) fn builtin(id: PolicyId, decision: DecisionFn<S, A>, metadata: PolicyMetadata) -> Self {
        Self::with_id(id, decision, OnceLock::from(metadata))
    }

    fn with_id(id: PolicyId, decision: DecisionFn<S, A>, metadata: OnceLock<PolicyMetadata>) -> Self {
        Self {
            inner: Arc::new(PolicyInner {
                id,
                decision,
                metadata,
            }),
        }
    }

    /// Attach metadata. Policies are write-once: a second call fails.
    pub fn configure(&self, metadata: PolicyMetadata) -> Result<(), EnforcementError> {
        self.inner
            .metadata
            .set(metadata)
            .map_err(|_| EnforcementError::PolicyAlreadyFinalized {
                policy: self.display_name(),
            })
    }

    pub fn is_finalized(&self) -> bool {
        self.inner.metadata.get().is_some()
    }

    fn metadata(&self) -> &PolicyMetadata {
        self.inner.metadata.get().unwrap_or(&UNCONFIGURED)
    }

    pub fn id(&self) -> PolicyId {
        self.inner.id
    }

    pub fn arity(&self) -> PolicyArity {
        self.inner.decision.arity()
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata().name.as_deref()
    }

    pub fn comment(&self) -> Option<&str> {
        self.metadata().comment.as_deref()
    }

    pub fn cacheable(&self) -> bool {
        self.metadata().cacheable
    }

    pub fn single_match(&self) -> bool {
        self.metadata().single_match
    }

    /// Name for log lines; anonymous policies are shown by id.
    pub fn display_name(&self) -> String {
        match self.name() {
            Some(name) => name.to_string(),
            None => format!("anonymous policy {}", self.id()),
        }
    }

    /// Whether this is the built-in fail-secure terminal policy.
    pub fn is_always_deny(&self) -> bool {
        self.id() == PolicyId::ALWAYS_DENY
    }

    pub(crate) fn decision_fn(&self) -> &DecisionFn<S, A> {
        &self.inner.decision
    }
}

/// Fluent construction helper for finalized policies.
pub struct PolicyBuilder<S, A> {
    metadata: PolicyMetadata,
    _marker: PhantomData<fn() -> (S, A)>,
}

impl<S, A> PolicyBuilder<S, A> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: PolicyMetadata::named(name),
            _marker: PhantomData,
        }
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.metadata.comment = Some(comment.into());
        self
    }

    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.metadata.cacheable = cacheable;
        self
    }

    pub fn single_match(mut self, single_match: bool) -> Self {
        self.metadata.single_match = single_match;
        self
    }

    pub fn build(self, decision: DecisionFn<S, A>) -> Policy<S, A> {
        Policy::with_id(PolicyId::next(), decision, OnceLock::from(self.metadata))
    }

    pub fn no_args<F>(self, f: F) -> Policy<S, A>
    where
        F: Fn() -> DecisionResult<S, A> + Send + Sync + 'static,
    {
        self.build(DecisionFn::no_args(f))
    }

    pub fn actor_only<F>(self, f: F) -> Policy<S, A>
    where
        F: Fn(&A) -> DecisionResult<S, A> + Send + Sync + 'static,
    {
        self.build(DecisionFn::actor_only(f))
    }

    pub fn subject_and_actor<F>(self, f: F) -> Policy<S, A>
    where
        F: Fn(&S, &A) -> DecisionResult<S, A> + Send + Sync + 'static,
    {
        self.build(DecisionFn::subject_and_actor(f))
    }

    pub fn full<F>(self, f: F) -> Policy<S, A>
    where
        F: Fn(&S, &A, Option<&S>) -> DecisionResult<S, A> + Send + Sync + 'static,
    {
        self.build(DecisionFn::full(f))
    }
}
