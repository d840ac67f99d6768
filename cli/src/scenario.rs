// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Simulation scenarios
//!
//! A scenario is a YAML document describing actors, subjects, named rules and
//! a list of checks. Rules compile into `warden_core` policies once per
//! scenario, so every check that names the same rule shares one policy
//! identity and therefore one set of cache entries.
//!
//! ```yaml
//! name: document-sharing
//! actors:
//!   - id: alice
//!     roles: [editor]
//! subjects:
//!   - id: doc-1
//!     owner: alice
//! rules:
//!   owner-can-edit:
//!     kind: owner
//!     comment: owners may edit their documents
//!   editors:
//!     kind: role
//!     role: editor
//! checks:
//!   - actor: alice
//!     subject: doc-1
//!     chain: [owner-can-edit, AlwaysDeny]
//!     expect: allow
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use warden_core::builtin::{self, always_allow, always_deny, pass_and_log};
use warden_core::{
    all, allow, deny, pass, Actor, DecisionFn, Enforcer, EntityKey, Policy, PolicyArity, Subject,
    ViewerContext,
};

pub type SimPolicy = Policy<SimSubject, SimActor>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub actors: Vec<ActorSpec>,

    #[serde(default)]
    pub subjects: Vec<SubjectSpec>,

    #[serde(default)]
    pub rules: BTreeMap<String, RuleSpec>,

    pub checks: Vec<CheckSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorSpec {
    pub id: String,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub anonymous: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectSpec {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(flatten)]
    pub kind: RuleKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default = "default_true")]
    pub cacheable: bool,

    #[serde(default)]
    pub single_match: bool,
}

fn default_true() -> bool {
    true
}

/// What a rule decides. Each kind maps to one policy arity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RuleKind {
    Allow,
    Deny,
    Pass,
    /// The built-in `PassAndLog` policy; rule flags are ignored.
    PassAndLog,
    /// Allow when the actor owns the subject.
    Owner,
    /// Allow when the actor owns the direct object.
    OwnsDirectObject,
    /// Allow actors holding `role`.
    Role { role: String },
    /// Every rule in `of` must allow.
    All { of: Vec<String> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSpec {
    #[default]
    Actor,
    Api,
    Bypass,
}

impl fmt::Display for ContextSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContextSpec::Actor => "actor",
            ContextSpec::Api => "api",
            ContextSpec::Bypass => "bypass",
        };
        f.write_str(name)
    }
}

/// Observed or expected result of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Deny,
    Error,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Allow => "allow",
            Verdict::Deny => "deny",
            Verdict::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Required unless `context` is `bypass`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    pub subject: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_object: Option<String>,

    #[serde(default)]
    pub context: ContextSpec,

    /// Audit reason for `bypass` checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Rule names or built-in policy names, in evaluation order.
    #[serde(default)]
    pub chain: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<Verdict>,
}

impl CheckSpec {
    fn label(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("check #{}", index + 1))
    }
}

/// Actor built from an [`ActorSpec`].
#[derive(Debug, Clone)]
pub struct SimActor {
    pub id: String,
    pub roles: Vec<String>,
    pub anonymous: bool,
}

impl Actor for SimActor {
    fn key(&self) -> EntityKey {
        EntityKey::new(self.id.as_str())
    }

    fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    fn is_anonymous(&self) -> bool {
        self.anonymous
    }
}

/// Subject built from a [`SubjectSpec`].
#[derive(Debug, Clone)]
pub struct SimSubject {
    pub id: String,
    pub owner: Option<String>,
}

impl SimSubject {
    fn is_owned_by(&self, actor: &SimActor) -> bool {
        self.owner.as_deref() == Some(actor.id.as_str())
    }
}

impl Subject for SimSubject {
    fn key(&self) -> EntityKey {
        EntityKey::new(self.id.as_str())
    }
}

/// Result of running one check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub check: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    pub subject: String,
    pub context: ContextSpec,
    pub verdict: Verdict,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Verdict>,

    pub passed: bool,
}

impl Scenario {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let scenario = serde_yaml::from_str(yaml)?;
        Ok(scenario)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Resolve every reference and build the policies.
    ///
    /// Fails on duplicate ids, unknown actors, subjects or rules, rule cycles,
    /// and actor-less checks outside a bypass context.
    pub fn compile(&self) -> Result<CompiledScenario> {
        let mut actors = HashMap::new();
        for spec in &self.actors {
            let actor = SimActor {
                id: spec.id.clone(),
                roles: spec.roles.clone(),
                anonymous: spec.anonymous,
            };
            if actors.insert(spec.id.clone(), Arc::new(actor)).is_some() {
                bail!("Duplicate actor id '{}'", spec.id);
            }
        }

        let mut subjects = HashMap::new();
        for spec in &self.subjects {
            let subject = SimSubject {
                id: spec.id.clone(),
                owner: spec.owner.clone(),
            };
            if subjects.insert(spec.id.clone(), subject).is_some() {
                bail!("Duplicate subject id '{}'", spec.id);
            }
        }

        let mut compiler = RuleCompiler::new(&self.rules);
        for name in self.rules.keys() {
            compiler.compile(name)?;
        }

        for (index, check) in self.checks.iter().enumerate() {
            let label = check.label(index);
            for id in std::iter::once(&check.subject).chain(check.direct_object.as_ref()) {
                if !subjects.contains_key(id) {
                    bail!("{}: unknown subject '{}'", label, id);
                }
            }
            match (&check.actor, check.context) {
                (Some(id), _) if !actors.contains_key(id) => {
                    bail!("{}: unknown actor '{}'", label, id)
                }
                (None, ContextSpec::Actor | ContextSpec::Api) => {
                    bail!("{}: context '{}' needs an actor", label, check.context)
                }
                _ => {}
            }
            for name in &check.chain {
                compiler
                    .compile(name)
                    .with_context(|| format!("{}: invalid chain", label))?;
            }
        }

        Ok(CompiledScenario {
            actors,
            subjects,
            policies: compiler.compiled,
            checks: self.checks.clone(),
        })
    }
}

struct RuleCompiler<'a> {
    rules: &'a BTreeMap<String, RuleSpec>,
    compiled: HashMap<String, SimPolicy>,
    in_progress: Vec<String>,
}

impl<'a> RuleCompiler<'a> {
    fn new(rules: &'a BTreeMap<String, RuleSpec>) -> Self {
        Self {
            rules,
            compiled: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    fn compile(&mut self, name: &str) -> Result<SimPolicy> {
        if let Some(policy) = self.compiled.get(name) {
            return Ok(policy.clone());
        }

        let rules = self.rules;
        let Some(spec) = rules.get(name) else {
            let policy = builtin_policy(name).ok_or_else(|| anyhow!("unknown rule '{}'", name))?;
            self.compiled.insert(name.to_string(), policy.clone());
            return Ok(policy);
        };

        if self.in_progress.iter().any(|n| n == name) {
            bail!(
                "rule '{}' refers to itself: {} -> {}",
                name,
                self.in_progress.join(" -> "),
                name
            );
        }

        self.in_progress.push(name.to_string());
        let decision = self.decision_fn(&spec.kind);
        self.in_progress.pop();

        let policy = match decision? {
            Some(decision) => Policy::create(
                name,
                decision,
                spec.comment.as_deref(),
                spec.cacheable,
                spec.single_match,
            ),
            None => pass_and_log(),
        };
        debug!(rule = name, arity = ?policy.arity(), "Compiled rule");

        self.compiled.insert(name.to_string(), policy.clone());
        Ok(policy)
    }

    /// `None` selects the built-in `PassAndLog` policy.
    fn decision_fn(&mut self, kind: &RuleKind) -> Result<Option<DecisionFn<SimSubject, SimActor>>> {
        let decision = match kind {
            RuleKind::Allow => DecisionFn::no_args(allow),
            RuleKind::Deny => DecisionFn::no_args(deny),
            RuleKind::Pass => DecisionFn::no_args(pass),
            RuleKind::PassAndLog => return Ok(None),
            RuleKind::Owner => DecisionFn::subject_and_actor(|subject: &SimSubject, actor: &SimActor| {
                if subject.is_owned_by(actor) {
                    allow()
                } else {
                    pass()
                }
            }),
            RuleKind::OwnsDirectObject => DecisionFn::full(
                |_: &SimSubject, actor: &SimActor, direct_object: Option<&SimSubject>| match direct_object {
                    Some(target) if target.is_owned_by(actor) => allow(),
                    _ => pass(),
                },
            ),
            RuleKind::Role { role } => {
                let role = role.clone();
                DecisionFn::actor_only(move |actor: &SimActor| {
                    if actor.has_role(&role) {
                        allow()
                    } else {
                        pass()
                    }
                })
            }
            RuleKind::All { of } => {
                let children = of
                    .iter()
                    .map(|child| self.compile(child))
                    .collect::<Result<Vec<_>>>()?;
                combinator(children)
            }
        };
        Ok(Some(decision))
    }
}

/// Wrap `children` in an `all` rule at the widest arity any child uses, so
/// the cache key covers exactly the inputs the children read.
fn combinator(children: Vec<SimPolicy>) -> DecisionFn<SimSubject, SimActor> {
    let arity = children
        .iter()
        .map(SimPolicy::arity)
        .max_by_key(PolicyArity::parameter_count)
        .unwrap_or(PolicyArity::NoArgs);

    match arity {
        PolicyArity::NoArgs => DecisionFn::no_args(move || all(children.clone())),
        PolicyArity::ActorOnly => DecisionFn::actor_only(move |_: &SimActor| all(children.clone())),
        PolicyArity::SubjectAndActor => {
            DecisionFn::subject_and_actor(move |_: &SimSubject, _: &SimActor| all(children.clone()))
        }
        PolicyArity::Full => {
            DecisionFn::full(move |_: &SimSubject, _: &SimActor, _: Option<&SimSubject>| {
                all(children.clone())
            })
        }
    }
}

fn builtin_policy(name: &str) -> Option<SimPolicy> {
    match name {
        builtin::ALWAYS_DENY => Some(always_deny()),
        builtin::ALWAYS_ALLOW => Some(always_allow()),
        builtin::PASS_AND_LOG => Some(pass_and_log()),
        _ => None,
    }
}

/// A scenario with every reference resolved.
#[derive(Debug)]
pub struct CompiledScenario {
    actors: HashMap<String, Arc<SimActor>>,
    subjects: HashMap<String, SimSubject>,
    policies: HashMap<String, SimPolicy>,
    checks: Vec<CheckSpec>,
}

impl CompiledScenario {
    pub fn policy(&self, name: &str) -> Option<&SimPolicy> {
        self.policies.get(name)
    }

    /// Run every check in order against `enforcer`. Enforcement errors are
    /// reported per check; only unresolved references fail the run.
    pub fn run(&self, enforcer: &Enforcer) -> Result<Vec<CheckReport>> {
        self.checks
            .iter()
            .enumerate()
            .map(|(index, check)| self.run_check(index, check, enforcer))
            .collect()
    }

    fn run_check(&self, index: usize, check: &CheckSpec, enforcer: &Enforcer) -> Result<CheckReport> {
        let label = check.label(index);
        let subject = self.subject(&check.subject)?;
        let direct_object = check
            .direct_object
            .as_deref()
            .map(|id| self.subject(id))
            .transpose()?;

        let context = match check.context {
            ContextSpec::Bypass => ViewerContext::privileged_bypass(
                check
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("scenario {}", label)),
            ),
            ContextSpec::Actor => ViewerContext::Actor(self.actor(check)?),
            ContextSpec::Api => ViewerContext::ApiActor(self.actor(check)?),
        };

        let chain = check
            .chain
            .iter()
            .map(|name| {
                self.policy(name)
                    .cloned()
                    .ok_or_else(|| anyhow!("{}: unknown rule '{}'", label, name))
            })
            .collect::<Result<Vec<_>>>()?;

        let (verdict, error) = match enforcer.evaluate(&chain, subject, &context, direct_object) {
            Ok(true) => (Verdict::Allow, None),
            Ok(false) => (Verdict::Deny, None),
            Err(e) => (Verdict::Error, Some(e.to_string())),
        };

        Ok(CheckReport {
            check: label,
            actor: check.actor.clone(),
            subject: check.subject.clone(),
            context: check.context,
            verdict,
            error,
            expected: check.expect,
            passed: check.expect.is_none_or(|expected| expected == verdict),
        })
    }

    fn subject(&self, id: &str) -> Result<&SimSubject> {
        self.subjects
            .get(id)
            .ok_or_else(|| anyhow!("unknown subject '{}'", id))
    }

    fn actor(&self, check: &CheckSpec) -> Result<Arc<SimActor>> {
        let id = check
            .actor
            .as_deref()
            .ok_or_else(|| anyhow!("context '{}' needs an actor", check.context))?;
        self.actors
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown actor '{}'", id))
    }
}
