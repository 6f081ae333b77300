//! Apply context and provider traits
//!
//! These traits keep the engine free of any particular UI, policy engine or
//! concurrency scheme.

use crate::controller::PlannedAction;
use crate::error::Error;
use crate::types::{ApplyResult, ReconcileOptions};
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;

/// Outcome of a policy check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyOutcome {
    /// One message per failed rule; empty means pass
    pub failures: Vec<String>,
}

impl PolicyOutcome {
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Policy-as-code hook run before any create or patch
///
/// Receives the normalized desired parameters of the resource.
pub trait PolicyCheck {
    fn check(&self, resource_type: &str, input: &Value) -> Result<PolicyOutcome>;
}

/// Optimistic-concurrency hook run right before a patch is submitted
pub trait ConcurrencyGuard {
    /// Return an error to abort the patch
    fn before_patch(&self, resource_id: &str, remote: &Value) -> Result<()>;
}

/// Guard that requires the remote `_version` to match a recorded value
///
/// Resources without a recorded version pass.
#[derive(Debug, Clone, Default)]
pub struct ExpectVersion {
    versions: HashMap<String, u64>,
}

impl ExpectVersion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the version a resource is expected to be at
    pub fn expect(mut self, resource_id: impl Into<String>, version: u64) -> Self {
        self.versions.insert(resource_id.into(), version);
        self
    }
}

impl ConcurrencyGuard for ExpectVersion {
    fn before_patch(&self, resource_id: &str, remote: &Value) -> Result<()> {
        let Some(&expected) = self.versions.get(resource_id) else {
            return Ok(());
        };
        let found = remote.get("_version").and_then(Value::as_u64).unwrap_or(0);
        if found != expected {
            return Err(Error::VersionConflict {
                resource: resource_id.to_string(),
                expected,
                found,
            }
            .into());
        }
        Ok(())
    }
}

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback {
    /// Called once per resource after planning, before any confirmation
    fn on_planned(&mut self, id: &str, action: &PlannedAction) {
        let _ = (id, action);
    }

    /// Called when starting to apply a batch of resources
    fn on_batch_start(&mut self, count: usize);

    /// Called when starting to apply a single resource
    fn on_resource_start(&mut self, id: &str, description: &str);

    /// Called when a resource application completes
    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult);

    /// Called when a batch completes
    fn on_batch_complete(&mut self);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _count: usize) {}
    fn on_resource_start(&mut self, _id: &str, _description: &str) {}
    fn on_resource_complete(&mut self, _id: &str, _result: &ApplyResult) {}
    fn on_batch_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Context passed to reconciliation
pub struct ApplyContext<'a> {
    /// Whether this is a dry run (no remote mutation)
    pub dry_run: bool,
    /// Operator comment for patch batches
    pub comment: Option<String>,
    pub options: ReconcileOptions,
    pub policy: Option<&'a dyn PolicyCheck>,
    pub guard: Option<&'a dyn ConcurrencyGuard>,
}

impl<'a> ApplyContext<'a> {
    /// Create a new apply context
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            comment: None,
            options: ReconcileOptions::default(),
            policy: None,
            guard: None,
        }
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_policy(mut self, policy: &'a dyn PolicyCheck) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_guard(mut self, guard: &'a dyn ConcurrencyGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Run the policy check, if any, turning failures into an error
    pub fn check_policy(&self, resource_id: &str, resource_type: &str, input: &Value) -> Result<()> {
        let Some(policy) = self.policy else {
            return Ok(());
        };
        let outcome = policy.check(resource_type, input)?;
        if !outcome.passed() {
            return Err(Error::ValidationFailed {
                resource: resource_id.to_string(),
                failures: outcome.failures,
            }
            .into());
        }
        Ok(())
    }

    /// Run the concurrency guard, if any
    pub fn check_guard(&self, resource_id: &str, remote: &Value) -> Result<()> {
        match self.guard {
            Some(guard) => guard.before_patch(resource_id, remote),
            None => Ok(()),
        }
    }
}
