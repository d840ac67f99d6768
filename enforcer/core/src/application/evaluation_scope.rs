// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Scoped internal evaluation.
//!
//! Entities that remember the viewer context they were loaded under implement
//! [`ViewerContextHolder`]. While a policy runs for such an entity, its
//! context is swapped to `InternalEvaluation` so the storage layer can load
//! related entities without applying filtering policies again.
//! [`InternalEvaluationScope`] restores the previous context when dropped,
//! including on early return and unwinding.

use crate::domain::viewer_context::ViewerContext;

/// An entity carrying the viewer context it was loaded under.
///
/// Both methods take `&self`; implementors use interior mutability
/// (`Mutex`, `RwLock`) so a subject borrowed by the enforcer can still be
/// re-scoped.
pub trait ViewerContextHolder<A> {
    fn viewer_context(&self) -> Option<ViewerContext<A>>;

    /// Store `context` and return the one it replaced.
    fn replace_viewer_context(&self, context: Option<ViewerContext<A>>) -> Option<ViewerContext<A>>;
}

/// RAII guard that marks a holder as being read by the enforcer itself.
pub struct InternalEvaluationScope<'a, A, H>
where
    H: ViewerContextHolder<A> + ?Sized,
{
    holder: &'a H,
    previous: Option<ViewerContext<A>>,
}

impl<'a, A, H> InternalEvaluationScope<'a, A, H>
where
    H: ViewerContextHolder<A> + ?Sized,
{
    pub fn enter(holder: &'a H) -> Self {
        let previous = holder.replace_viewer_context(Some(ViewerContext::internal_evaluation()));
        Self { holder, previous }
    }
}

impl<A, H> Drop for InternalEvaluationScope<'_, A, H>
where
    H: ViewerContextHolder<A> + ?Sized,
{
    fn drop(&mut self) {
        self.holder.replace_viewer_context(self.previous.take());
    }
}
