//! List reconciliation
//!
//! Remote list-valued fields are patched per element with positional paths.
//! Each list kind decides its own identity (position, variation index) and
//! emits operations whose indices are valid when applied in order.
//!
//! | Kind          | Identity        | Strategy                               |
//! |---------------|-----------------|----------------------------------------|
//! | variations    | position        | trim tail, per-sub-field patch, append |
//! | targets       | variation index | per-state add/replace/remove/absent    |
//! | rules         | position        | trim, per-field patch, append          |
//! | prerequisites | position        | whole-list replace on any difference   |
//! | statements    | position        | trim on prefix, else whole replace     |
//!
//! Fallthrough and the on/off toggle are single values with list-like shape
//! and live here too.

mod fallthrough;
mod prerequisites;
mod rules;
mod statements;
mod targets;
mod toggle;
mod variations;

pub use fallthrough::reconcile_fallthrough;
pub use toggle::reconcile_toggle;

use crate::patch::{PatchOperation, PatchPath};
use crate::types::{ReconcileOptions, RemovalOrder};
use serde_json::Value;

/// Errors raised while reconciling a list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    /// A `remove` target named values the remote does not have
    #[error("targets not found for variation {variation}: {}", missing.join(", "))]
    TargetsNotFound { variation: usize, missing: Vec<String> },
}

/// A declared list element that knows how to reconcile its list
pub trait ListItem: Sized {
    /// Reconcile `desired` against the remote list found at `prefix`
    ///
    /// `remote` is the raw field value: `None` when the entity lacks the
    /// field, otherwise normally an array.
    fn reconcile(
        desired: &[Self],
        remote: Option<&Value>,
        prefix: &PatchPath,
        opts: &ReconcileOptions,
    ) -> Result<Vec<PatchOperation>, ListError>;
}

/// Reconcile a declared list against its remote counterpart
pub fn reconcile_list<T: ListItem>(
    desired: &[T],
    remote: Option<&Value>,
    prefix: &PatchPath,
    opts: &ReconcileOptions,
) -> Result<Vec<PatchOperation>, ListError> {
    let patches = T::reconcile(desired, remote, prefix, opts)?;
    if !patches.is_empty() {
        log::debug!("{} patch(es) for list {prefix}", patches.len());
    }
    Ok(patches)
}

/// Elements of a remote list; missing or non-array counts as empty
pub(crate) fn items(remote: Option<&Value>) -> &[Value] {
    match remote.and_then(Value::as_array) {
        Some(list) => list.as_slice(),
        None => &[],
    }
}

/// `remove` operations trimming indices `from..to`
pub(crate) fn trim_tail(
    prefix: &PatchPath,
    from: usize,
    to: usize,
    order: RemovalOrder,
) -> Vec<PatchOperation> {
    let remove = |i: usize| PatchOperation::remove(prefix.index(i));
    match order {
        RemovalOrder::Ascending => (from..to).map(remove).collect(),
        RemovalOrder::Descending => (from..to).rev().map(remove).collect(),
    }
}

/// One whole-list `replace`, or `add` when the entity lacks the field
pub(crate) fn whole_list(prefix: &PatchPath, remote: Option<&Value>, values: Vec<Value>) -> PatchOperation {
    PatchOperation::set(prefix, Value::Array(values), remote.is_some_and(|r| !r.is_null()))
}
