//! Prerequisites: positional comparison, rebuilt as a whole

use super::{ListError, ListItem, whole_list};
use crate::diff::values_equal;
use crate::normalize::PrerequisiteSpec;
use crate::patch::{PatchOperation, PatchPath};
use crate::types::ReconcileOptions;
use serde_json::{Value, json};

impl ListItem for PrerequisiteSpec {
    /// Any positional difference or count mismatch replaces the whole list
    fn reconcile(
        desired: &[Self],
        remote: Option<&Value>,
        prefix: &PatchPath,
        _opts: &ReconcileOptions,
    ) -> Result<Vec<PatchOperation>, ListError> {
        let current = super::items(remote);
        let wanted: Vec<Value> = desired.iter().map(PrerequisiteSpec::to_value).collect();

        let same = wanted.len() == current.len()
            && wanted.iter().zip(current).all(|(w, c)| {
                let c = json!({ "key": c.get("key"), "variation": c.get("variation") });
                values_equal(w, &c)
            });
        if same {
            return Ok(Vec::new());
        }

        Ok(vec![whole_list(prefix, remote, wanted)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lists::reconcile_list;

    fn prereq(key: &str, variation: usize) -> PrerequisiteSpec {
        PrerequisiteSpec {
            key: key.into(),
            variation,
        }
    }

    #[test]
    fn test_equal_prerequisites_noop() {
        let remote = json!([{"key": "billing", "variation": 0}]);
        let patches = reconcile_list(
            &[prereq("billing", 0)],
            Some(&remote),
            &PatchPath::field("prerequisites"),
            &ReconcileOptions::default(),
        )
        .unwrap();
        assert!(patches.is_empty());
    }

    #[test]
    fn test_count_mismatch_rebuilds() {
        let remote = json!([{"key": "billing", "variation": 0}, {"key": "auth", "variation": 1}]);
        let patches = reconcile_list(
            &[prereq("billing", 0)],
            Some(&remote),
            &PatchPath::field("prerequisites"),
            &ReconcileOptions::default(),
        )
        .unwrap();
        assert_eq!(
            patches,
            vec![PatchOperation::replace(
                "/prerequisites",
                json!([{"key": "billing", "variation": 0}])
            )]
        );
    }

    #[test]
    fn test_missing_field_is_added() {
        let patches = reconcile_list(
            &[prereq("billing", 1)],
            None,
            &PatchPath::field("prerequisites"),
            &ReconcileOptions::default(),
        )
        .unwrap();
        assert_eq!(patches[0].op, crate::patch::PatchOp::Add);
    }
}
