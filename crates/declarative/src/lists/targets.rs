//! Individual targets: identity is the served variation index
//!
//! Remote targets are a list of `{variation, values}` entries. Declared
//! targets carry a state directive:
//!
//! - `add`: append values missing from the entry, or a new entry if the
//!   variation has none. Values are never removed.
//! - `replace` (default, also `present`): make the entry's values set-equal to
//!   the declared ones.
//! - `remove`: drop the declared values, which must all exist.
//! - `absent`: drop the whole entry; a missing entry is fine.
//!
//! Entry removals are emitted last, highest index first, so every earlier
//! path stays valid when the batch is applied in order.

use super::{ListError, ListItem};
use crate::normalize::{ItemState, TargetSpec, target_value};
use crate::patch::{PatchOperation, PatchPath};
use crate::types::ReconcileOptions;
use serde_json::Value;
use std::collections::BTreeMap;

/// Position and current values of the entry serving a variation
struct Entry {
    position: usize,
    values: Vec<String>,
}

impl ListItem for TargetSpec {
    fn reconcile(
        desired: &[Self],
        remote: Option<&Value>,
        prefix: &PatchPath,
        _opts: &ReconcileOptions,
    ) -> Result<Vec<PatchOperation>, ListError> {
        let remote = super::items(remote);
        let mut index = index_by_variation(remote);
        let mut next_position = remote.len();

        let mut patches = Vec::new();
        let mut removals: Vec<usize> = Vec::new();

        for target in desired {
            let values = target.unique_values();
            match target.state {
                ItemState::Add => match index.get_mut(&target.variation) {
                    Some(entry) => {
                        for value in values {
                            if entry.values.contains(&value) {
                                continue;
                            }
                            let path = prefix
                                .index(entry.position)
                                .push("values")
                                .index(entry.values.len());
                            patches.push(PatchOperation::add(path, value.clone()));
                            entry.values.push(value);
                        }
                    }
                    None => {
                        if let Some(op) = new_entry(&mut index, &mut next_position, prefix, target.variation, values) {
                            patches.push(op);
                        }
                    }
                },

                ItemState::Replace | ItemState::Present => match index.get_mut(&target.variation) {
                    Some(entry) => {
                        if same_set(&entry.values, &values) {
                            continue;
                        }
                        patches.push(PatchOperation::replace(
                            prefix.index(entry.position),
                            target_value(target.variation, &values),
                        ));
                        entry.values = values;
                    }
                    // Replace on a missing entry is rejected remotely; add instead
                    None => {
                        if let Some(op) = new_entry(&mut index, &mut next_position, prefix, target.variation, values) {
                            patches.push(op);
                        }
                    }
                },

                ItemState::Remove => {
                    let existing: &[String] = match index.get(&target.variation) {
                        Some(entry) => &entry.values,
                        None => &[],
                    };
                    let missing: Vec<String> = values
                        .iter()
                        .filter(|v| !existing.contains(v))
                        .cloned()
                        .collect();
                    if !missing.is_empty() {
                        return Err(ListError::TargetsNotFound {
                            variation: target.variation,
                            missing,
                        });
                    }
                    let Some(entry) = index.get_mut(&target.variation) else {
                        continue;
                    };
                    let kept: Vec<String> = entry
                        .values
                        .iter()
                        .filter(|v| !values.contains(v))
                        .cloned()
                        .collect();
                    if kept.len() == entry.values.len() {
                        continue;
                    }
                    if kept.is_empty() {
                        removals.push(entry.position);
                        index.remove(&target.variation);
                    } else {
                        patches.push(PatchOperation::replace(
                            prefix.index(entry.position),
                            target_value(target.variation, &kept),
                        ));
                        entry.values = kept;
                    }
                }

                ItemState::Absent => {
                    if let Some(entry) = index.remove(&target.variation) {
                        removals.push(entry.position);
                    }
                }
            }
        }

        removals.sort_unstable_by(|a, b| b.cmp(a));
        removals.dedup();
        patches.extend(removals.into_iter().map(|i| PatchOperation::remove(prefix.index(i))));

        Ok(patches)
    }
}

fn index_by_variation(remote: &[Value]) -> BTreeMap<usize, Entry> {
    let mut index = BTreeMap::new();
    for (position, target) in remote.iter().enumerate() {
        let Some(variation) = target.get("variation").and_then(Value::as_u64) else {
            continue;
        };
        let values = target
            .get("values")
            .and_then(Value::as_array)
            .map(|vs| vs.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();
        index
            .entry(variation as usize)
            .or_insert(Entry { position, values });
    }
    index
}

/// Append a whole entry for a variation that has none
fn new_entry(
    index: &mut BTreeMap<usize, Entry>,
    next_position: &mut usize,
    prefix: &PatchPath,
    variation: usize,
    values: Vec<String>,
) -> Option<PatchOperation> {
    if values.is_empty() {
        return None;
    }
    let position = *next_position;
    *next_position += 1;
    let op = PatchOperation::add(prefix.index(position), target_value(variation, &values));
    index.insert(variation, Entry { position, values });
    Some(op)
}

fn same_set(a: &[String], b: &[String]) -> bool {
    a.iter().all(|x| b.contains(x)) && b.iter().all(|y| a.contains(y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lists::reconcile_list;
    use crate::patch::apply_patch;
    use serde_json::json;

    fn target(variation: usize, values: &[&str], state: ItemState) -> TargetSpec {
        TargetSpec {
            variation,
            values: values.iter().map(|v| (*v).to_string()).collect(),
            state,
        }
    }

    fn run(desired: &[TargetSpec], remote: &Value) -> Result<Vec<PatchOperation>, ListError> {
        reconcile_list(
            desired,
            Some(remote),
            &PatchPath::field("targets"),
            &ReconcileOptions::default(),
        )
    }

    #[test]
    fn test_add_appends_missing_values_only() {
        let remote = json!([{"variation": 1, "values": ["a"]}]);
        let patches = run(&[target(1, &["a", "b"], ItemState::Add)], &remote).unwrap();
        assert_eq!(patches, vec![PatchOperation::add("/targets/0/values/1", "b")]);
    }

    #[test]
    fn test_growth_from_empty_is_single_add() {
        let patches = run(&[target(0, &["x", "y", "z"], ItemState::Add)], &json!([])).unwrap();
        assert_eq!(
            patches,
            vec![PatchOperation::add(
                "/targets/0",
                json!({"variation": 0, "values": ["x", "y", "z"]})
            )]
        );
    }

    #[test]
    fn test_replace_equal_set_is_noop() {
        let remote = json!([{"variation": 0, "values": ["b", "a"]}]);
        let patches = run(&[target(0, &["a", "b"], ItemState::Replace)], &remote).unwrap();
        assert!(patches.is_empty());
    }

    #[test]
    fn test_replace_swaps_whole_entry() {
        let remote = json!([{"variation": 0, "values": ["a"]}, {"variation": 1, "values": ["b"]}]);
        let patches = run(&[target(1, &["c"], ItemState::Replace)], &remote).unwrap();
        assert_eq!(
            patches,
            vec![PatchOperation::replace("/targets/1", json!({"variation": 1, "values": ["c"]}))]
        );
    }

    #[test]
    fn test_replace_without_entry_falls_back_to_add() {
        let remote = json!([{"variation": 0, "values": ["a"]}]);
        let patches = run(&[target(2, &["q"], ItemState::Replace)], &remote).unwrap();
        assert_eq!(
            patches,
            vec![PatchOperation::add("/targets/1", json!({"variation": 2, "values": ["q"]}))]
        );
    }

    #[test]
    fn test_remove_requires_subset() {
        let remote = json!([{"variation": 0, "values": ["a", "b"]}]);
        let err = run(&[target(0, &["a", "zz"], ItemState::Remove)], &remote).unwrap_err();
        assert_eq!(
            err,
            ListError::TargetsNotFound {
                variation: 0,
                missing: vec!["zz".into()]
            }
        );
    }

    #[test]
    fn test_remove_keeps_remaining_values() {
        let remote = json!([{"variation": 0, "values": ["a", "b"]}]);
        let patches = run(&[target(0, &["a"], ItemState::Remove)], &remote).unwrap();
        assert_eq!(
            patches,
            vec![PatchOperation::replace("/targets/0", json!({"variation": 0, "values": ["b"]}))]
        );
    }

    #[test]
    fn test_remove_last_values_drops_entry() {
        let remote = json!([{"variation": 0, "values": ["a"]}]);
        let patches = run(&[target(0, &["a"], ItemState::Remove)], &remote).unwrap();
        assert_eq!(patches, vec![PatchOperation::remove("/targets/0")]);
    }

    #[test]
    fn test_absent_tolerates_missing_entry() {
        let remote = json!([{"variation": 0, "values": ["a"]}]);
        assert!(run(&[target(3, &[], ItemState::Absent)], &remote).unwrap().is_empty());
    }

    #[test]
    fn test_removals_last_and_descending() {
        let remote = json!([
            {"variation": 0, "values": ["a"]},
            {"variation": 1, "values": ["b"]},
            {"variation": 2, "values": ["c"]}
        ]);
        let desired = [
            target(0, &[], ItemState::Absent),
            target(2, &[], ItemState::Absent),
            target(1, &["b", "d"], ItemState::Add),
        ];
        let mut doc = json!({"targets": remote});
        let patches = run(&desired, &doc["targets"]).unwrap();
        assert_eq!(
            patches,
            vec![
                PatchOperation::add("/targets/1/values/1", "d"),
                PatchOperation::remove("/targets/2"),
                PatchOperation::remove("/targets/0"),
            ]
        );

        apply_patch(&mut doc, &patches).unwrap();
        assert_eq!(doc["targets"], json!([{"variation": 1, "values": ["b", "d"]}]));
        assert!(run(&desired, &doc["targets"]).unwrap().is_empty());
    }
}
