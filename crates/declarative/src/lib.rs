//! # Declarative
//!
//! Reconciliation of declared feature-flag configuration against a remote
//! management API.
//!
//! Declarations are normalized, compared with the fetched remote entity and
//! turned into JSON-Patch batches that are valid when applied in order.
//!
//! ## Core Concepts
//!
//! - **Normalization** ([`normalize`]): declared and remote shapes reduced to
//!   one canonical form so equal configurations compare equal
//! - **Diff** ([`diff()`]): scalar, tag-set and object fields, with unmanaged
//!   fields left untouched
//! - **Lists** ([`lists`]): positional and keyed list reconciliation
//!   (variations, targets, rules, prerequisites, policy statements)
//! - **Patch** ([`patch`]): operations, paths and the commented batch
//! - **Resource** / **Controller**: fetch → diff → patch with the
//!   create-vs-update branch and present/absent states
//! - **ExecutionPlan** / **Executor**: ordered application of many resources
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ApplyContext, ExecutionPlan, execute_simple};
//!
//! let mut plan = ExecutionPlan::new();
//! plan.add(Box::new(project_resource));
//! plan.add(Box::new(flag_resource));
//!
//! let ctx = ApplyContext::new(false).with_comment(Some("release 42".into()));
//! let summary = execute_simple(&plan, &ctx)?;
//! ```
//!
//! ## Provider Traits
//!
//! - [`PolicyCheck`]: policy-as-code validation before any mutation
//! - [`ConcurrencyGuard`]: last look at the remote entity before a patch
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations

pub mod context;
pub mod controller;
pub mod diff;
pub mod error;
pub mod executor;
pub mod lists;
pub mod normalize;
pub mod patch;
pub mod planner;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use context::{
    ApplyContext, AutoConfirm, AutoDecline, ConcurrencyGuard, ConfirmCallback, ExpectVersion,
    NoProgress, PolicyCheck, PolicyOutcome, ProgressCallback,
};
pub use controller::{PlannedAction, Reconciled, plan, preview, reconcile};
pub use diff::{Diff, DesiredState, FieldChange, FieldKind, FieldSpec, RemoteEntity, diff, diff_at};
pub use error::Error;
pub use executor::{execute, execute_simple};
pub use lists::{ListError, ListItem, reconcile_fallthrough, reconcile_list, reconcile_toggle};
pub use patch::{PatchOp, PatchOperation, PatchPath, PatchRequest, apply_patch};
pub use planner::ExecutionPlan;
pub use resource::{BoxedResource, CreateOutcome, DeleteOutcome, Resource};
pub use types::{
    ApplyResult, DesiredStatus, ExecuteOptions, ExecuteSummary, ReconcileOptions, RemovalOrder,
};
