//! Variations: identity is position

use super::{ListError, ListItem, trim_tail};
use crate::diff::values_equal;
use crate::normalize::VariationSpec;
use crate::patch::{PatchOperation, PatchPath};
use crate::types::ReconcileOptions;
use serde_json::Value;

impl ListItem for VariationSpec {
    /// Shrinking removes the tail in the configured order. Overlapping indices
    /// get one patch per differing sub-field; new indices get one `add` each.
    fn reconcile(
        desired: &[Self],
        remote: Option<&Value>,
        prefix: &PatchPath,
        opts: &ReconcileOptions,
    ) -> Result<Vec<PatchOperation>, ListError> {
        let remote = super::items(remote);
        let old_len = remote.len();
        let new_len = desired.len();

        let mut patches = Vec::new();
        if new_len < old_len {
            patches.extend(trim_tail(prefix, new_len, old_len, opts.removal_order));
        }

        for (i, variation) in desired.iter().enumerate() {
            let path = prefix.index(i);
            match remote.get(i) {
                Some(current) => patches.extend(sub_field_patches(variation, current, &path)),
                None => patches.push(PatchOperation::add(path, variation.to_value())),
            }
        }

        Ok(patches)
    }
}

fn sub_field_patches(desired: &VariationSpec, remote: &Value, path: &PatchPath) -> Vec<PatchOperation> {
    let wanted = [
        ("name", desired.name.clone().map(Value::String)),
        ("description", desired.description.clone().map(Value::String)),
        ("value", desired.value.clone()),
    ];

    wanted
        .into_iter()
        .filter_map(|(field, value)| {
            let value = value?;
            let current = remote.get(field);
            if current.is_some_and(|c| values_equal(c, &value)) {
                return None;
            }
            Some(PatchOperation::set(path.push(field), value, current.is_some()))
        })
        .collect()
}
