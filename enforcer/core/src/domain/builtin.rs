// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Built-in policies.
//!
//! Built-ins carry reserved [`PolicyId`]s, so every instance of the same
//! built-in shares cache entries and is recognised by the enforcer no matter
//! which subject and actor types it was instantiated for.

use tracing::info;

use super::policy::{allow, deny, pass, DecisionFn, Policy, PolicyId, PolicyMetadata};
use super::viewer_context::{Actor, Subject};

pub const ALWAYS_DENY: &str = "AlwaysDeny";
pub const ALWAYS_ALLOW: &str = "AlwaysAllow";
pub const PASS_AND_LOG: &str = "PassAndLog";

/// Fail-secure terminal policy. Every evaluated chain ends with it.
pub fn always_deny<S: 'static, A: 'static>() -> Policy<S, A> {
    Policy::builtin(
        PolicyId::ALWAYS_DENY,
        DecisionFn::no_args(deny),
        PolicyMetadata {
            name: Some(ALWAYS_DENY.to_string()),
            comment: Some("no policy allowed this action".to_string()),
            cacheable: true,
            single_match: false,
        },
    )
}

pub fn always_allow<S: 'static, A: 'static>() -> Policy<S, A> {
    Policy::builtin(
        PolicyId::ALWAYS_ALLOW,
        DecisionFn::no_args(allow),
        PolicyMetadata {
            name: Some(ALWAYS_ALLOW.to_string()),
            comment: None,
            cacheable: true,
            single_match: false,
        },
    )
}

/// Debugging aid: logs the subject and actor, then passes.
pub fn pass_and_log<S, A>() -> Policy<S, A>
where
    S: Subject + 'static,
    A: Actor + 'static,
{
    Policy::builtin(
        PolicyId::PASS_AND_LOG,
        DecisionFn::subject_and_actor(|subject: &S, actor: &A| {
            info!(subject = %subject.key(), actor = %actor.key(), "PassAndLog reached");
            pass()
        }),
        PolicyMetadata {
            name: Some(PASS_AND_LOG.to_string()),
            comment: None,
            cacheable: false,
            single_match: false,
        },
    )
}
