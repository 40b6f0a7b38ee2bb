//! Boot-cycle readiness tracking.
//!
//! Modules report missing configuration and failed instance validation here
//! during the sequential registration phase. Once that phase ends the tracker
//! is frozen into an immutable [`ReadinessReport`]; no component can add
//! reasons after the first request is served. The freeze is enforced by
//! ownership: mutation needs `&mut`, and `freeze` consumes the tracker.

use std::collections::HashSet;

use modelmux_core::InstanceId;
use tracing::warn;

/// Accumulates readiness evidence during boot.
///
/// Readiness is opt-out per failure, not opt-in per success: an instance
/// nobody has complained about counts as ready.
#[derive(Debug, Default)]
pub struct ReadinessTracker {
    missing_config: Vec<String>,
    not_ready: HashSet<InstanceId>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a missing-configuration reason.
    ///
    /// Monotonic: once any reason exists, `is_ready_at_boot` stays false for
    /// the rest of the boot cycle.
    pub fn report_missing_configuration(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "Missing configuration reported");
        self.missing_config.push(reason);
    }

    /// Mark a provider instance as not ready. Idempotent.
    pub fn mark_instance_not_ready(&mut self, instance_id: InstanceId) {
        if self.not_ready.insert(instance_id.clone()) {
            warn!(instance = %instance_id, "Provider instance marked not ready");
        }
    }

    /// True unless the instance was explicitly marked not ready.
    /// Unknown ids default to ready.
    pub fn is_instance_ready(&self, instance_id: &InstanceId) -> bool {
        !self.not_ready.contains(instance_id)
    }

    /// True iff no missing-configuration reason was ever reported.
    pub fn is_ready_at_boot(&self) -> bool {
        self.missing_config.is_empty()
    }

    /// Freeze the accumulated state into an immutable report.
    pub fn freeze(self) -> ReadinessReport {
        ReadinessReport {
            missing_config: self.missing_config,
            not_ready: self.not_ready,
        }
    }
}

/// The frozen outcome of boot-time readiness evaluation.
#[derive(Debug, Clone)]
pub struct ReadinessReport {
    /// Human-readable reasons, in reporting order
    pub missing_config: Vec<String>,

    /// Instances excluded from registration
    pub not_ready: HashSet<InstanceId>,
}

impl ReadinessReport {
    pub fn is_ready_at_boot(&self) -> bool {
        self.missing_config.is_empty()
    }

    pub fn is_instance_ready(&self, instance_id: &InstanceId) -> bool {
        !self.not_ready.contains(instance_id)
    }
}
