// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Ordered policy chains. Order is significant: the first terminal decision
//! wins.

use std::fmt;
use std::ops::Deref;

use super::builtin;
use super::policy::{DecisionFn, Policy};

pub struct PolicyChain<S, A> {
    policies: Vec<Policy<S, A>>,
}

impl<S, A> PolicyChain<S, A> {
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    pub fn with(mut self, policy: Policy<S, A>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn push(&mut self, policy: Policy<S, A>) {
        self.policies.push(policy);
    }

    /// Append a bare decision function as an anonymous policy.
    pub fn push_fn(&mut self, decision: DecisionFn<S, A>) {
        self.policies.push(Policy::new(decision));
    }

    /// Ends with the built-in always-deny policy.
    pub fn is_terminated(&self) -> bool {
        self.policies.last().is_some_and(Policy::is_always_deny)
    }

    pub fn policies(&self) -> &[Policy<S, A>] {
        &self.policies
    }
}

impl<S: 'static, A: 'static> PolicyChain<S, A> {
    /// Append the fail-secure terminal policy unless already present.
    pub fn terminated(mut self) -> Self {
        if !self.is_terminated() {
            self.policies.push(builtin::always_deny());
        }
        self
    }
}

impl<S, A> Default for PolicyChain<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, A> Clone for PolicyChain<S, A> {
    fn clone(&self) -> Self {
        Self {
            policies: self.policies.clone(),
        }
    }
}

impl<S, A> fmt::Debug for PolicyChain<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.policies.iter().map(|p| p.display_name()))
            .finish()
    }
}

impl<S, A> Deref for PolicyChain<S, A> {
    type Target = [Policy<S, A>];

    fn deref(&self) -> &Self::Target {
        &self.policies
    }
}

impl<S, A> From<Vec<Policy<S, A>>> for PolicyChain<S, A> {
    fn from(policies: Vec<Policy<S, A>>) -> Self {
        Self { policies }
    }
}

impl<S, A> FromIterator<Policy<S, A>> for PolicyChain<S, A> {
    fn from_iter<I: IntoIterator<Item = Policy<S, A>>>(iter: I) -> Self {
        Self {
            policies: iter.into_iter().collect(),
        }
    }
}
