//! On/off toggle

use crate::patch::{PatchOperation, PatchPath};
use serde_json::Value;

/// `replace` of the toggle when the resolved desired value differs
///
/// `desired` is None when the toggle is left as it is remotely.
pub fn reconcile_toggle(desired: Option<bool>, remote: Option<&Value>, path: &PatchPath) -> Option<PatchOperation> {
    let wanted = desired?;
    if remote.and_then(Value::as_bool) == Some(wanted) {
        return None;
    }
    Some(PatchOperation::replace(path, wanted))
}
