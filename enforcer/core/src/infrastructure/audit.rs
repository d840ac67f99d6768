// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Enforcement Audit Logger
//!
//! Emits structured audit records for privileged bypass contexts.
//!
//! Every bypass context produces an `info!` record when it is granted and a
//! `warn!` record each time it short-circuits an evaluation, so that every
//! skipped policy check can be traced back to a stated reason.

use tracing::{info, warn};

/// Writes enforcement audit events to the structured tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnforcementAuditLogger {}

impl EnforcementAuditLogger {
    /// Create a new audit logger (stateless).
    pub fn new() -> Self {
        Self {}
    }

    /// Record construction of a privileged bypass context at `INFO` level.
    pub fn log_bypass_granted(&self, reason: &str) {
        info!(target: "warden::audit", reason = %reason, "Privileged bypass context granted");
    }

    /// Record a bypassed evaluation at `WARN` level.
    pub fn log_bypass_used(&self, reason: &str, chain_len: usize) {
        warn!(
            target: "warden::audit",
            reason = %reason,
            chain_len,
            "Policy chain bypassed by privileged context"
        );
    }
}
