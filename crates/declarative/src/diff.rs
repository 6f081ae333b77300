//! Field-level diff between desired state and a remote entity
//!
//! The diff never mutates its inputs. Fields it does not compare itself
//! (list-valued fields and fields outside the schema) come back in
//! [`Diff::remaining`] for the list reconcilers.

use crate::normalize::prune_nulls;
use crate::patch::{PatchOperation, PatchPath};
use serde_json::{Map, Value};

/// Server-owned fields that are never diffed
pub const IGNORED_FIELDS: &[&str] = &[
    "_id",
    "id",
    "_links",
    "links",
    "_version",
    "version",
    "_creationDate",
    "creationDate",
    "salt",
    "_maintainer",
    "_site",
];

/// Read access to a fetched remote object
pub trait RemoteEntity {
    /// Value of a top-level field, if the entity has it
    fn field(&self, name: &str) -> Option<&Value>;
}

impl RemoteEntity for Value {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl RemoteEntity for Map<String, Value> {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Ordered desired field values
///
/// A null value means the field is not managed. Field order is the order in
/// which patches are emitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredState {
    fields: Vec<(String, Value)>,
}

impl DesiredState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`DesiredState::set`]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field, replacing an earlier value for the same name
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    /// Managed value of a field (None when unset or null)
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .filter(|v| !v.is_null())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Names of managed (non-null) fields
    pub fn managed(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|(_, v)| !v.is_null()).map(|(n, _)| n)
    }

    pub fn is_empty(&self) -> bool {
        self.managed().next().is_none()
    }

    /// Managed fields as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(n, v)| (n.to_string(), v.clone()))
                .collect(),
        )
    }
}

/// How a field is compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Whole-value equality, numbers compared numerically
    Scalar,
    /// Unordered set of values (`tags`, segment `included`)
    TagSet,
    /// Nested object compared on the desired sub-keys only
    Object,
    /// Handed to a list reconciler
    List,
}

/// A manageable top-level field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn scalar(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Scalar }
    }

    pub const fn tag_set(name: &'static str) -> Self {
        Self { name, kind: FieldKind::TagSet }
    }

    pub const fn object(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Object }
    }

    pub const fn list(name: &'static str) -> Self {
        Self { name, kind: FieldKind::List }
    }
}

/// Outcome of comparing one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChange {
    /// Managed and different from remote
    Changed,
    /// Managed and equal to remote
    Unchanged,
    /// Not provided by the caller
    Unmanaged,
}

/// Compare one desired field against its remote value
pub fn compare_field(kind: FieldKind, desired: Option<&Value>, remote: Option<&Value>) -> FieldChange {
    let Some(desired) = desired.filter(|v| !v.is_null()) else {
        return FieldChange::Unmanaged;
    };

    let equal = match kind {
        FieldKind::TagSet => set_equal(desired, remote.unwrap_or(&Value::Null)),
        FieldKind::Object => object_subset_equal(desired, remote),
        FieldKind::Scalar | FieldKind::List => remote.is_some_and(|r| values_equal(desired, r)),
    };

    if equal {
        FieldChange::Unchanged
    } else {
        FieldChange::Changed
    }
}

/// Result of [`diff`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    /// Ordered patches for the fields compared here
    pub patches: Vec<PatchOperation>,
    /// Per-field outcome, in desired-field order
    pub changes: Vec<(String, FieldChange)>,
    /// Fields left for list reconciliation
    pub remaining: DesiredState,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn changed_fields(&self) -> impl Iterator<Item = &str> {
        self.changes
            .iter()
            .filter(|(_, c)| *c == FieldChange::Changed)
            .map(|(n, _)| n.as_str())
    }
}

/// Diff desired state against a remote entity at the document root
pub fn diff(desired: &DesiredState, remote: &impl RemoteEntity, schema: &[FieldSpec]) -> Diff {
    diff_at(desired, remote, schema, &PatchPath::root())
}

/// Diff desired state against a remote entity whose fields live under `base`
///
/// Flag environment configs, for instance, are diffed against
/// `flag.environments[env]` but patched at `/environments/<env>/<field>`.
pub fn diff_at(
    desired: &DesiredState,
    remote: &impl RemoteEntity,
    schema: &[FieldSpec],
    base: &PatchPath,
) -> Diff {
    let mut out = Diff::default();

    for (name, value) in desired.iter() {
        if IGNORED_FIELDS.contains(&name) {
            continue;
        }

        let Some(spec) = schema.iter().find(|s| s.name == name) else {
            out.remaining.set(name, value.clone());
            continue;
        };

        if spec.kind == FieldKind::List {
            out.remaining.set(name, value.clone());
            continue;
        }

        let current = remote.field(name);
        let change = compare_field(spec.kind, Some(value), current);
        if change == FieldChange::Changed {
            let path = base.push(name);
            let new_value = match spec.kind {
                FieldKind::Object => merge_object(value, current),
                FieldKind::TagSet => dedup(value),
                _ => value.clone(),
            };
            log::debug!("field {name} changed");
            // `replace` needs an existing member
            out.patches
                .push(PatchOperation::set(path, new_value, current.is_some()));
        }
        out.changes.push((name.to_string(), change));
    }

    out
}

// =============================================================================
// Equality helpers
// =============================================================================

/// Structural equality with numbers compared by value (`1 == 1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Unordered comparison; a missing/null side counts as an empty set
pub fn set_equal(a: &Value, b: &Value) -> bool {
    let xs = as_items(a);
    let ys = as_items(b);
    xs.iter().all(|x| ys.iter().any(|y| values_equal(x, y)))
        && ys.iter().all(|y| xs.iter().any(|x| values_equal(x, y)))
}

fn as_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn dedup(value: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut out: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !out.iter().any(|o| values_equal(o, item)) {
                    out.push(item.clone());
                }
            }
            Value::Array(out)
        }
        other => other.clone(),
    }
}

/// Every non-null desired sub-key equals the remote sub-key
fn object_subset_equal(desired: &Value, remote: Option<&Value>) -> bool {
    let Value::Object(wanted) = desired else {
        return remote.is_some_and(|r| values_equal(desired, r));
    };
    let Some(Value::Object(have)) = remote else {
        return wanted.values().all(Value::is_null);
    };
    wanted
        .iter()
        .filter(|(_, v)| !v.is_null())
        .all(|(k, v)| have.get(k).is_some_and(|h| values_equal(v, h)))
}

/// Remote object overlaid with the desired non-null sub-keys
fn merge_object(desired: &Value, remote: Option<&Value>) -> Value {
    let desired = prune_nulls(desired);
    match (desired, remote) {
        (Value::Object(wanted), Some(Value::Object(have))) => {
            let mut merged = have.clone();
            merged.extend(wanted);
            Value::Object(merged)
        }
        (other, _) => other,
    }
}
