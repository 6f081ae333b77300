//! Targeting rules: identity is position, trim-then-patch
//!
//! Every declared rule except `add` holds one position, aligned with the
//! remote rule at the same index:
//!
//! - `absent` (and `remove`) rules are removed when they equal the remote rule
//!   at their position. These removals are emitted first, highest index first,
//!   and every later path refers to the list that survives them. An `absent`
//!   rule that does not match leaves the remote rule in place and keeps its
//!   position, unless that remote rule is one the config declares present.
//! - `present` (and `replace`) rules are aligned by position with the
//!   surviving remote rules: the tail is trimmed, overlapping rules get
//!   per-field patches, extra rules are appended.
//! - `add` rules are always appended after everything else and count toward
//!   the declared length when trimming. Re-running a config with `add` rules
//!   appends them again.
//!
//! Trims of rules and clauses always run highest index first, whatever the
//! configured removal order, so each `remove` is valid after the ones before
//! it.

use super::{ListError, ListItem, trim_tail};
use crate::diff::values_equal;
use crate::normalize::{
    ItemState, RuleSpec, non_null, normalize_remote_rollout, normalize_remote_rule, remote_clauses,
};
use crate::patch::{PatchOperation, PatchPath};
use crate::types::{ReconcileOptions, RemovalOrder};
use serde_json::Value;

/// Clause fields patched individually, in emission order
const CLAUSE_FIELDS: [&str; 4] = ["op", "negate", "values", "attribute"];

impl ListItem for RuleSpec {
    fn reconcile(
        desired: &[Self],
        remote: Option<&Value>,
        prefix: &PatchPath,
        _opts: &ReconcileOptions,
    ) -> Result<Vec<PatchOperation>, ListError> {
        let remote = super::items(remote);
        let positional: Vec<&RuleSpec> = desired.iter().filter(|r| r.state != ItemState::Add).collect();

        let mut patches = Vec::new();

        let mut removed: Vec<usize> = positional
            .iter()
            .enumerate()
            .filter(|(_, rule)| is_removal(rule))
            .filter(|(i, rule)| remote.get(*i).is_some_and(|r| matches_remote(rule, r)))
            .map(|(i, _)| i)
            .collect();
        removed.sort_unstable_by(|a, b| b.cmp(a));
        patches.extend(removed.iter().map(|i| PatchOperation::remove(prefix.index(*i))));

        let surviving: Vec<&Value> = remote
            .iter()
            .enumerate()
            .filter(|(i, _)| !removed.contains(i))
            .map(|(_, r)| r)
            .collect();

        // Positions left after the removals. An unmatched removal holds the
        // remote rule it sits on, unless that rule is declared present
        // elsewhere (it was shifted there by an earlier removal) or there is
        // no remote rule at all.
        let declared: Vec<&RuleSpec> = positional.iter().copied().filter(|r| !is_removal(r)).collect();
        let holds_slot = |i: usize| {
            remote
                .get(i)
                .is_some_and(|r| !declared.iter().any(|rule| matches_remote(rule, r)))
        };
        let slots: Vec<&RuleSpec> = positional
            .iter()
            .copied()
            .enumerate()
            .filter(|(i, rule)| !removed.contains(i) && (!is_removal(rule) || holds_slot(*i)))
            .map(|(_, rule)| rule)
            .collect();
        let appended: Vec<&RuleSpec> = desired.iter().filter(|r| r.state == ItemState::Add).collect();

        // Rules previously appended by `add` sit past the positional ones and
        // count toward the declared length, so they are not trimmed.
        let old_count = surviving.len();
        let new_count = slots.len() + appended.len();
        if new_count < old_count {
            patches.extend(trim_tail(prefix, new_count, old_count, RemovalOrder::Descending));
        }
        let kept = old_count.min(new_count);

        for (i, rule) in slots.iter().enumerate() {
            if is_removal(rule) {
                continue;
            }
            let path = prefix.index(i);
            match surviving.get(i) {
                Some(current) if matches_remote(rule, current) => {}
                Some(current) => patches.extend(rule_patches(rule, current, &path)),
                None => patches.push(PatchOperation::add(path, rule.to_value())),
            }
        }

        let end = kept.max(slots.len());
        for (k, rule) in appended.iter().enumerate() {
            patches.push(PatchOperation::add(prefix.index(end + k), rule.to_value()));
        }

        Ok(patches)
    }
}

fn is_removal(rule: &RuleSpec) -> bool {
    matches!(rule.state, ItemState::Absent | ItemState::Remove)
}

fn matches_remote(rule: &RuleSpec, remote: &Value) -> bool {
    values_equal(
        &rule.comparable(),
        &normalize_remote_rule(remote, rule.description.is_some()),
    )
}

/// Per-field patches turning `remote` into `rule`
///
/// A rule serves a variation or a rollout, never both: switching removes the
/// old one before setting the new one.
fn rule_patches(rule: &RuleSpec, remote: &Value, path: &PatchPath) -> Vec<PatchOperation> {
    let mut patches = Vec::new();
    let remote_variation = non_null(remote, "variation");
    let remote_rollout = non_null(remote, "rollout");

    if let Some(variation) = rule.variation {
        if remote_rollout.is_some() {
            patches.push(PatchOperation::remove(path.push("rollout")));
        }
        if !remote_variation.is_some_and(|v| v.as_u64() == Some(variation as u64)) {
            patches.push(PatchOperation::set(
                path.push("variation"),
                variation,
                remote.get("variation").is_some(),
            ));
        }
    } else if let Some(rollout) = &rule.rollout {
        if remote_variation.is_some() {
            patches.push(PatchOperation::remove(path.push("variation")));
        }
        let wanted = rollout.to_value();
        match remote_rollout {
            Some(current) if values_equal(&normalize_remote_rollout(current), &wanted) => {}
            Some(_) => patches.push(PatchOperation::replace(path.push("rollout"), wanted)),
            None => patches.push(PatchOperation::add(path.push("rollout"), wanted)),
        }
    }

    patches.extend(clause_patches(rule, remote, &path.push("clauses")));

    if let Some(description) = &rule.description {
        let current = remote.get("description");
        if current.and_then(Value::as_str) != Some(description.as_str()) {
            patches.push(PatchOperation::set(
                path.push("description"),
                description.clone(),
                current.is_some(),
            ));
        }
    }

    patches
}

/// Four per-field patches for each differing clause, plus adds/removes for
/// a changed clause count
fn clause_patches(rule: &RuleSpec, remote: &Value, path: &PatchPath) -> Vec<PatchOperation> {
    let wanted = rule.clause_values();
    let have = remote_clauses(remote);
    if values_equal(&Value::Array(wanted.clone()), &Value::Array(have.clone())) {
        return Vec::new();
    }

    let Some(raw) = remote.get("clauses").and_then(Value::as_array) else {
        return vec![PatchOperation::add(path, Value::Array(wanted))];
    };

    let mut patches = Vec::new();
    for (j, (want, current)) in wanted.iter().zip(&have).enumerate() {
        if values_equal(want, current) {
            continue;
        }
        for field in CLAUSE_FIELDS {
            let exists = raw.get(j).is_some_and(|c| c.get(field).is_some());
            patches.push(PatchOperation::set(
                path.index(j).push(field),
                want[field].clone(),
                exists,
            ));
        }
    }

    for (j, want) in wanted.iter().enumerate().skip(have.len()) {
        patches.push(PatchOperation::add(path.index(j), want.clone()));
    }
    if wanted.len() < have.len() {
        patches.extend(trim_tail(path, wanted.len(), have.len(), RemovalOrder::Descending));
    }

    patches
}
