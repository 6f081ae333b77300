//! Reconciliation controller
//!
//! Drives one resource through fetch → diff → patch, with the create-vs-update
//! branch and the present/absent state machine:
//!
//! ```text
//! absent   → delete (already absent is success)
//! present  → fetch ─ missing → policy → create → patch leftover fields
//!                  │                      └ conflict → refetch → update
//!                  └ found   → plan ─ empty → unchanged, no remote call
//!                                   └ else  → policy → guard → patch
//! ```

use crate::context::ApplyContext;
use crate::error::Error;
use crate::patch::{self, PatchOperation};
use crate::resource::{CreateOutcome, DeleteOutcome, Resource};
use crate::types::{ApplyResult, ReconcileOptions};
use anyhow::Result;
use serde_json::Value;

/// What reconciling a resource would do
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedAction {
    NoChange,
    Create,
    Update(Vec<PatchOperation>),
    Delete,
}

impl PlannedAction {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoChange)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NoChange => "unchanged",
            Self::Create => "create",
            Self::Update(_) => "update",
            Self::Delete => "delete",
        }
    }
}

/// Outcome of reconciling one resource
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub result: ApplyResult,
    /// Latest known remote representation
    pub entity: Option<Value>,
    /// Patches submitted (or that would be, on a dry run)
    pub patches: Vec<PatchOperation>,
}

impl Reconciled {
    fn new(result: ApplyResult, entity: Option<Value>) -> Self {
        Self {
            result,
            entity,
            patches: Vec::new(),
        }
    }
}

/// Work out what reconciling would do, without mutating anything
pub fn plan(resource: &dyn Resource, opts: &ReconcileOptions) -> Result<PlannedAction> {
    preview(resource, opts).map(|(action, _)| action)
}

/// Like [`plan`], also returning the fetched remote entity
pub fn preview(resource: &dyn Resource, opts: &ReconcileOptions) -> Result<(PlannedAction, Option<Value>)> {
    let remote = resource.fetch()?;

    let action = match (resource.desired_status().is_absent(), &remote) {
        (true, Some(remote)) if resource.needs_removal(remote) => PlannedAction::Delete,
        (true, _) => PlannedAction::NoChange,
        (false, None) => PlannedAction::Create,
        (false, Some(remote)) => {
            let patches = resource.plan_update(remote, opts)?;
            if patches.is_empty() {
                PlannedAction::NoChange
            } else {
                PlannedAction::Update(patches)
            }
        }
    };

    log::debug!("{}: {}", resource.id(), action.label());
    Ok((action, remote))
}

/// Reconcile one resource against its remote entity
pub fn reconcile(resource: &dyn Resource, ctx: &ApplyContext) -> Result<Reconciled> {
    let id = resource.id();

    if resource.desired_status().is_absent() {
        return remove(resource, ctx);
    }

    match resource.fetch()? {
        Some(remote) => update(resource, remote, ctx),
        None => {
            ctx.check_policy(&id, resource.resource_type(), &resource.policy_input())?;
            if ctx.dry_run {
                return Ok(Reconciled::new(
                    ApplyResult::Skipped {
                        reason: "dry run: would create".into(),
                    },
                    None,
                ));
            }

            match resource.create()? {
                CreateOutcome::Created(entity) => {
                    log::info!("created {id}");
                    // Fields that cannot be set at creation are patched in
                    let patches = resource.plan_update(&entity, &ctx.options)?;
                    if patches.is_empty() {
                        return Ok(Reconciled::new(ApplyResult::Created, Some(entity)));
                    }
                    let request = patch::build(patches, ctx.comment.as_deref());
                    let entity = resource.submit_patch(&request)?;
                    Ok(Reconciled {
                        result: ApplyResult::Created,
                        entity: Some(entity),
                        patches: request.patch,
                    })
                }
                CreateOutcome::Conflict => {
                    log::info!("{id} already exists, falling back to update");
                    match resource.fetch()? {
                        Some(remote) => update(resource, remote, ctx),
                        None => Err(Error::ConflictUnresolved(id).into()),
                    }
                }
            }
        }
    }
}

fn update(resource: &dyn Resource, remote: Value, ctx: &ApplyContext) -> Result<Reconciled> {
    let id = resource.id();
    let patches = resource.plan_update(&remote, &ctx.options)?;
    if patches.is_empty() {
        return Ok(Reconciled::new(ApplyResult::NoChange, Some(remote)));
    }

    ctx.check_policy(&id, resource.resource_type(), &resource.policy_input())?;
    ctx.check_guard(&id, &remote)?;

    if ctx.dry_run {
        return Ok(Reconciled {
            result: ApplyResult::Skipped {
                reason: format!("dry run: would apply {} patch(es)", patches.len()),
            },
            entity: Some(remote),
            patches,
        });
    }

    let request = patch::build(patches, ctx.comment.as_deref());
    log::debug!("patching {id} with {} operation(s)", request.len());
    let entity = resource.submit_patch(&request)?;
    Ok(Reconciled {
        result: ApplyResult::Modified,
        entity: Some(entity),
        patches: request.patch,
    })
}

fn remove(resource: &dyn Resource, ctx: &ApplyContext) -> Result<Reconciled> {
    if ctx.dry_run {
        let exists = resource
            .fetch()?
            .is_some_and(|remote| resource.needs_removal(&remote));
        let result = if exists {
            ApplyResult::Skipped {
                reason: "dry run: would delete".into(),
            }
        } else {
            ApplyResult::NoChange
        };
        return Ok(Reconciled::new(result, None));
    }

    match resource.delete()? {
        DeleteOutcome::Deleted => {
            log::info!("removed {}", resource.id());
            Ok(Reconciled::new(ApplyResult::Removed, None))
        }
        DeleteOutcome::AlreadyAbsent => Ok(Reconciled::new(ApplyResult::NoChange, None)),
    }
}
