// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Viewer Context Value Object
//!
//! A [`ViewerContext`] describes *who* is looking at a subject. The closed set
//! of variants is:
//!
//! | Variant | Carries | Enforcer behaviour |
//! |---------|---------|--------------------|
//! | `Actor` | the acting actor | normal chain evaluation |
//! | `ApiActor` | the acting actor | normal chain evaluation, distinguishable in policies |
//! | `PrivilegedBypass` | an audit reason | every evaluation allows |
//! | `InternalEvaluation` | nothing | marks nested access during policy execution |
//!
//! `InternalEvaluation` can only be created inside this crate. Storage layers
//! that load related entities check [`ViewerContext::is_internal_evaluation`]
//! to skip re-applying filtering policies while a policy is running.
//!
//! The entity traits [`Actor`] and [`Subject`] are the collaboration contract
//! with the host application's storage layer.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::EnforcementError;
use crate::infrastructure::audit::EnforcementAuditLogger;

/// Stable identity of an entity, used for cache keys and log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for EntityKey {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for EntityKey {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<Uuid> for EntityKey {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

/// The party attempting an action.
pub trait Actor {
    /// Stable identifier of this actor.
    fn key(&self) -> EntityKey;

    /// Role-membership predicate.
    fn has_role(&self, role: &str) -> bool;

    /// Anonymous actors carry no role-check context. Policies that inspect the
    /// subject (`SubjectAndActor` and `Full` arity) deny them without running.
    fn is_anonymous(&self) -> bool {
        false
    }
}

/// The entity whose accessibility is being decided. Direct objects use the
/// same trait.
pub trait Subject {
    fn key(&self) -> EntityKey;
}

/// Discriminant of a [`ViewerContext`], usable in keys and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Actor,
    ApiActor,
    PrivilegedBypass,
    InternalEvaluation,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContextKind::Actor => "actor",
            ContextKind::ApiActor => "api_actor",
            ContextKind::PrivilegedBypass => "privileged_bypass",
            ContextKind::InternalEvaluation => "internal_evaluation",
        };
        f.write_str(name)
    }
}

/// Hashable identity of a viewer context: its kind plus the actor it wraps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewerContextKey {
    pub kind: ContextKind,
    pub actor: Option<EntityKey>,
}

/// Proof that an `InternalEvaluation` context was created by the enforcer.
/// The private field keeps other crates from constructing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationToken(());

/// Access-level wrapper around the acting party.
pub enum ViewerContext<A> {
    Actor(Arc<A>),
    ApiActor(Arc<A>),
    PrivilegedBypass {
        reason: String,
        granted_at: DateTime<Utc>,
    },
    InternalEvaluation(EvaluationToken),
}

impl<A> Clone for ViewerContext<A> {
    fn clone(&self) -> Self {
        match self {
            ViewerContext::Actor(actor) => ViewerContext::Actor(Arc::clone(actor)),
            ViewerContext::ApiActor(actor) => ViewerContext::ApiActor(Arc::clone(actor)),
            ViewerContext::PrivilegedBypass { reason, granted_at } => {
                ViewerContext::PrivilegedBypass {
                    reason: reason.clone(),
                    granted_at: *granted_at,
                }
            }
            ViewerContext::InternalEvaluation(token) => ViewerContext::InternalEvaluation(*token),
        }
    }
}

impl<A> fmt::Debug for ViewerContext<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerContext::PrivilegedBypass { reason, granted_at } => f
                .debug_struct("PrivilegedBypass")
                .field("reason", reason)
                .field("granted_at", granted_at)
                .finish(),
            other => f.write_str(&other.kind().to_string()),
        }
    }
}

impl<A> ViewerContext<A> {
    /// Context for an ordinary acting actor. Use the `Actor` variant directly
    /// to share an existing `Arc`.
    pub fn for_actor(actor: A) -> Self {
        ViewerContext::Actor(Arc::new(actor))
    }

    /// Context for an actor calling through the public API.
    pub fn for_api_actor(actor: A) -> Self {
        ViewerContext::ApiActor(Arc::new(actor))
    }

    /// Context that allows every evaluation. Construction is written to the
    /// audit log.
    pub fn privileged_bypass(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        EnforcementAuditLogger::new().log_bypass_granted(&reason);
        ViewerContext::PrivilegedBypass {
            reason,
            granted_at: Utc::now(),
        }
    }

    pub(crate) fn internal_evaluation() -> Self {
        ViewerContext::InternalEvaluation(EvaluationToken(()))
    }

    pub fn kind(&self) -> ContextKind {
        match self {
            ViewerContext::Actor(_) => ContextKind::Actor,
            ViewerContext::ApiActor(_) => ContextKind::ApiActor,
            ViewerContext::PrivilegedBypass { .. } => ContextKind::PrivilegedBypass,
            ViewerContext::InternalEvaluation(_) => ContextKind::InternalEvaluation,
        }
    }

    /// The wrapped actor, if this variant carries one.
    pub fn actor(&self) -> Option<&Arc<A>> {
        match self {
            ViewerContext::Actor(actor) | ViewerContext::ApiActor(actor) => Some(actor),
            _ => None,
        }
    }

    /// The wrapped actor, or `MissingActingContext` for variants without one.
    pub fn acting_actor(&self) -> Result<&A, EnforcementError> {
        self.actor()
            .map(|actor| actor.as_ref())
            .ok_or(EnforcementError::MissingActingContext {
                context: self.kind(),
            })
    }

    pub fn is_privileged_bypass(&self) -> bool {
        matches!(self, ViewerContext::PrivilegedBypass { .. })
    }

    pub fn is_internal_evaluation(&self) -> bool {
        matches!(self, ViewerContext::InternalEvaluation(_))
    }

    pub fn is_api(&self) -> bool {
        matches!(self, ViewerContext::ApiActor(_))
    }

    pub fn bypass_reason(&self) -> Option<&str> {
        match self {
            ViewerContext::PrivilegedBypass { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

impl<A: Actor> ViewerContext<A> {
    pub fn cache_key(&self) -> ViewerContextKey {
        ViewerContextKey {
            kind: self.kind(),
            actor: self.actor().map(|actor| actor.key()),
        }
    }
}
