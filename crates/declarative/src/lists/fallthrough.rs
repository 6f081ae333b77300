//! Fallthrough: a single variation-or-rollout, compared ignoring `id`

use crate::diff::values_equal;
use crate::normalize::{FallthroughSpec, normalize_remote_served};
use crate::patch::{PatchOperation, PatchPath};
use serde_json::Value;

/// One `replace` of the normalized fallthrough when it differs from remote
pub fn reconcile_fallthrough(
    desired: Option<&FallthroughSpec>,
    remote: Option<&Value>,
    path: &PatchPath,
) -> Option<PatchOperation> {
    let desired = desired?;
    if desired.variation.is_none() && desired.rollout.is_none() {
        return None;
    }

    let wanted = desired.to_value();
    let current = remote.map(|r| Value::Object(normalize_remote_served(r)));
    if current.as_ref().is_some_and(|c| values_equal(c, &wanted)) {
        return None;
    }

    Some(PatchOperation::set(path, wanted, remote.is_some()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{RolloutSpec, WeightedVariationSpec};
    use serde_json::json;

    fn path() -> PatchPath {
        PatchPath::field("environments").push("production").push("fallthrough")
    }

    #[test]
    fn test_equal_ignoring_id() {
        let desired = FallthroughSpec {
            variation: Some(1),
            rollout: None,
        };
        let remote = json!({"variation": 1, "id": "ft"});
        assert!(reconcile_fallthrough(Some(&desired), Some(&remote), &path()).is_none());
    }

    #[test]
    fn test_switch_to_rollout_replaces_whole_value() {
        let desired = FallthroughSpec {
            variation: None,
            rollout: Some(RolloutSpec {
                bucket_by: Some("email".into()),
                weighted_variations: vec![WeightedVariationSpec { variation: 0, weight: 100_000 }],
            }),
        };
        let remote = json!({"variation": 1});
        let op = reconcile_fallthrough(Some(&desired), Some(&remote), &path()).unwrap();
        assert_eq!(
            op,
            PatchOperation::replace(
                "/environments/production/fallthrough",
                json!({"rollout": {"bucketBy": "email", "variations": [{"variation": 0, "weight": 100_000}]}})
            )
        );
    }

    #[test]
    fn test_unset_is_unmanaged() {
        let remote = json!({"variation": 1});
        assert!(reconcile_fallthrough(None, Some(&remote), &path()).is_none());
        assert!(reconcile_fallthrough(Some(&FallthroughSpec::default()), Some(&remote), &path()).is_none());
    }
}
