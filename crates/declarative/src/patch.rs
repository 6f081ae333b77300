//! Patch operations and the request body that carries them
//!
//! Operations are kept in the order they were produced. The remote API applies
//! them one after another, so positional paths emitted later may depend on the
//! effect of earlier operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Value sent with `remove` operations. The API requires one but ignores it.
pub const REMOVE_PLACEHOLDER: &str = "needed_for_call";

/// Comment attached to a patch batch when the operator supplies none.
pub const DEFAULT_COMMENT: &str = "flagops generated operation.";

/// Kind of a single patch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Replace,
    Remove,
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Replace => write!(f, "replace"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// One JSON-Patch-like instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    pub value: Value,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn replace(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: value.into(),
        }
    }

    /// A `remove`, carrying [`REMOVE_PLACEHOLDER`] as its value
    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: Value::String(REMOVE_PLACEHOLDER.to_string()),
        }
    }

    /// `replace` when the remote already has the key, `add` otherwise
    pub fn set(path: impl Into<String>, value: impl Into<Value>, exists: bool) -> Self {
        if exists {
            Self::replace(path, value)
        } else {
            Self::add(path, value)
        }
    }
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            PatchOp::Remove => write!(f, "{} {}", self.op, self.path),
            _ => write!(f, "{} {} = {}", self.op, self.path, self.value),
        }
    }
}

/// Builder for slash-delimited pointer paths
///
/// Segments are escaped per JSON Pointer (`~` → `~0`, `/` → `~1`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PatchPath(String);

impl PatchPath {
    /// The document root (empty pointer)
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Path with a single leading segment
    pub fn field(name: &str) -> Self {
        Self::root().push(name)
    }

    /// Append a segment
    pub fn push(&self, segment: impl fmt::Display) -> Self {
        let escaped = segment.to_string().replace('~', "~0").replace('/', "~1");
        Self(format!("{}/{}", self.0, escaped))
    }

    /// Append a list index
    pub fn index(&self, index: usize) -> Self {
        self.push(index)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<PatchPath> for String {
    fn from(path: PatchPath) -> Self {
        path.0
    }
}

impl From<&PatchPath> for String {
    fn from(path: &PatchPath) -> Self {
        path.0.clone()
    }
}

/// Wire body of a patch submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub comment: String,
    pub patch: Vec<PatchOperation>,
}

impl PatchRequest {
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patch.len()
    }
}

/// Wrap an ordered patch list with a comment
///
/// A missing or blank comment falls back to [`DEFAULT_COMMENT`]. The order of
/// `patches` is preserved exactly.
pub fn build(patches: Vec<PatchOperation>, comment: Option<&str>) -> PatchRequest {
    let comment = comment
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_COMMENT);

    PatchRequest {
        comment: comment.to_string(),
        patch: patches,
    }
}

// =============================================================================
// Applying patches
// =============================================================================

/// Errors raised while applying a patch to a document
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("invalid patch path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Apply(#[from] json_patch::PatchError),
}

/// Apply operations to a document, one after another (RFC 6902 semantics)
///
/// Used by the in-memory backend, plan previews and idempotence checks.
pub fn apply_patch(doc: &mut Value, ops: &[PatchOperation]) -> Result<(), PatchError> {
    let ops = ops
        .iter()
        .map(to_json_patch)
        .collect::<Result<Vec<_>, _>>()?;
    json_patch::patch(doc, &ops)?;
    Ok(())
}

fn to_json_patch(op: &PatchOperation) -> Result<json_patch::PatchOperation, PatchError> {
    let path = op
        .path
        .parse()
        .map_err(|_| PatchError::InvalidPath(op.path.clone()))?;
    Ok(match op.op {
        PatchOp::Add => json_patch::PatchOperation::Add(json_patch::AddOperation {
            path,
            value: op.value.clone(),
        }),
        PatchOp::Replace => json_patch::PatchOperation::Replace(json_patch::ReplaceOperation {
            path,
            value: op.value.clone(),
        }),
        PatchOp::Remove => json_patch::PatchOperation::Remove(json_patch::RemoveOperation { path }),
    })
}
