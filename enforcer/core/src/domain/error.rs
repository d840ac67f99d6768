// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use thiserror::Error;

use super::viewer_context::ContextKind;

/// Errors raised synchronously by policy evaluation.
///
/// None of these is a denial. A denial is `Ok(false)`; an error means a policy
/// or its caller is defective.
#[derive(Debug, Error)]
pub enum EnforcementError {
    #[error("Invalid outcome from policy '{policy}': {reason}")]
    InvalidPolicyOutcome { policy: String, reason: String },

    #[error("Policy '{policy}' already finalized")]
    PolicyAlreadyFinalized { policy: String },

    #[error("Viewer context '{context}' carries no acting entity")]
    MissingActingContext { context: ContextKind },

    #[error("Decision function of policy '{policy}' failed: {source}")]
    DecisionFailed {
        policy: String,
        #[source]
        source: anyhow::Error,
    },
}
