//! Spec normalization
//!
//! Turns declared sub-records (variations, targets, rules, clauses, rollouts,
//! statements, prerequisites) into the canonical JSON shape of the remote
//! attribute model, and reduces fetched remote records to the same shape so the
//! two can be compared directly.
//!
//! Declared records use snake_case field names; the canonical shape uses the
//! wire's camelCase names (`bucketBy`, `notResources`, ...).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

/// Bucketing attribute used when a rollout does not name one
pub const DEFAULT_BUCKET_BY: &str = "key";

/// Per-item directive carried by targets and rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// Reconcile by position (rules) or treat as `replace` (targets)
    #[default]
    Present,
    /// Always append; not idempotent
    Add,
    Remove,
    Replace,
    Absent,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Present => "present",
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Replace => "replace",
            Self::Absent => "absent",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Declared shapes
// =============================================================================

/// One flag variation, addressed by position
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Individual targets served one variation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    pub variation: usize,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default = "replace_state")]
    pub state: ItemState,
}

fn replace_state() -> ItemState {
    ItemState::Replace
}

/// Clause operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClauseOp {
    In,
    EndsWith,
    StartsWith,
    Matches,
    Contains,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Before,
    After,
    SegmentMatch,
    SemVerEqual,
    SemVerLessThan,
    SemVerGreaterThan,
}

impl ClauseOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::EndsWith => "endsWith",
            Self::StartsWith => "startsWith",
            Self::Matches => "matches",
            Self::Contains => "contains",
            Self::LessThan => "lessThan",
            Self::LessThanOrEqual => "lessThanOrEqual",
            Self::GreaterThan => "greaterThan",
            Self::GreaterThanOrEqual => "greaterThanOrEqual",
            Self::Before => "before",
            Self::After => "after",
            Self::SegmentMatch => "segmentMatch",
            Self::SemVerEqual => "semVerEqual",
            Self::SemVerLessThan => "semVerLessThan",
            Self::SemVerGreaterThan => "semVerGreaterThan",
        }
    }
}

/// One rule clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClauseSpec {
    pub attribute: String,
    pub op: ClauseOp,
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub negate: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightedVariationSpec {
    pub variation: usize,
    pub weight: u64,
}

/// Percentage rollout across variations
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolloutSpec {
    #[serde(default)]
    pub bucket_by: Option<String>,
    #[serde(default)]
    pub weighted_variations: Vec<WeightedVariationSpec>,
}

/// A targeting rule. Serves either `variation` or `rollout`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    #[serde(default)]
    pub variation: Option<usize>,
    #[serde(default)]
    pub rollout: Option<RolloutSpec>,
    #[serde(default)]
    pub clauses: Vec<ClauseSpec>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub track_events: Option<bool>,
    #[serde(default, alias = "rule_state")]
    pub state: ItemState,
}

/// Variation or rollout served when nothing else matches
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FallthroughSpec {
    #[serde(default)]
    pub variation: Option<usize>,
    #[serde(default)]
    pub rollout: Option<RolloutSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrerequisiteSpec {
    pub key: String,
    pub variation: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

/// A policy statement (custom roles, webhook filters)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatementSpec {
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub not_resources: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub not_actions: Vec<String>,
    pub effect: Effect,
}

// =============================================================================
// Canonical shapes
// =============================================================================

impl VariationSpec {
    /// Full wire item, omitting unset sub-fields
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(value) = &self.value {
            map.insert("value".into(), value.clone());
        }
        if let Some(name) = &self.name {
            map.insert("name".into(), Value::String(name.clone()));
        }
        if let Some(description) = &self.description {
            map.insert("description".into(), Value::String(description.clone()));
        }
        Value::Object(map)
    }
}

impl TargetSpec {
    /// Values with duplicates dropped, first occurrence kept
    pub fn unique_values(&self) -> Vec<String> {
        let mut seen = Vec::with_capacity(self.values.len());
        for v in &self.values {
            if !seen.contains(v) {
                seen.push(v.clone());
            }
        }
        seen
    }
}

pub fn target_value(variation: usize, values: &[String]) -> Value {
    json!({ "variation": variation, "values": values })
}

impl ClauseSpec {
    pub fn to_value(&self) -> Value {
        json!({
            "attribute": self.attribute,
            "op": self.op.as_str(),
            "values": self.values,
            "negate": self.negate.unwrap_or(false),
        })
    }
}

impl RolloutSpec {
    pub fn to_value(&self) -> Value {
        let variations: Vec<Value> = self
            .weighted_variations
            .iter()
            .map(|wv| json!({ "variation": wv.variation, "weight": wv.weight }))
            .collect();
        json!({
            "bucketBy": self.bucket_by.as_deref().unwrap_or(DEFAULT_BUCKET_BY),
            "variations": variations,
        })
    }
}

impl RuleSpec {
    /// Full wire item used when appending a rule
    pub fn to_value(&self) -> Value {
        let mut map = self.served();
        map.insert("clauses".into(), Value::Array(self.clause_values()));
        if let Some(description) = &self.description {
            map.insert("description".into(), Value::String(description.clone()));
        }
        if let Some(track) = self.track_events {
            map.insert("trackEvents".into(), Value::Bool(track));
        }
        Value::Object(map)
    }

    /// Shape compared against [`normalize_remote_rule`]. Ignores `trackEvents`.
    pub fn comparable(&self) -> Value {
        let mut map = self.served();
        map.insert("clauses".into(), Value::Array(self.clause_values()));
        if let Some(description) = &self.description {
            map.insert("description".into(), Value::String(description.clone()));
        }
        Value::Object(map)
    }

    pub fn clause_values(&self) -> Vec<Value> {
        self.clauses.iter().map(ClauseSpec::to_value).collect()
    }

    fn served(&self) -> Map<String, Value> {
        served(self.variation, self.rollout.as_ref())
    }
}

impl FallthroughSpec {
    pub fn to_value(&self) -> Value {
        Value::Object(served(self.variation, self.rollout.as_ref()))
    }
}

fn served(variation: Option<usize>, rollout: Option<&RolloutSpec>) -> Map<String, Value> {
    let mut map = Map::new();
    if let Some(v) = variation {
        map.insert("variation".into(), json!(v));
    } else if let Some(r) = rollout {
        map.insert("rollout".into(), r.to_value());
    }
    map
}

impl PrerequisiteSpec {
    pub fn to_value(&self) -> Value {
        json!({ "key": self.key, "variation": self.variation })
    }
}

impl StatementSpec {
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (key, list) in [
            ("resources", &self.resources),
            ("notResources", &self.not_resources),
            ("actions", &self.actions),
            ("notActions", &self.not_actions),
        ] {
            if !list.is_empty() {
                map.insert(key.into(), json!(list));
            }
        }
        map.insert("effect".into(), json!(self.effect));
        Value::Object(map)
    }
}

// =============================================================================
// Remote reductions
// =============================================================================

/// Reduce a remote rollout: default `bucketBy`, keep only variation/weight pairs
pub fn normalize_remote_rollout(rollout: &Value) -> Value {
    let bucket_by = rollout
        .get("bucketBy")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_BUCKET_BY);
    let variations: Vec<Value> = rollout
        .get("variations")
        .or_else(|| rollout.get("weightedVariations"))
        .and_then(Value::as_array)
        .map(|vs| {
            vs.iter()
                .map(|v| json!({ "variation": v.get("variation"), "weight": v.get("weight") }))
                .collect()
        })
        .unwrap_or_default();
    json!({ "bucketBy": bucket_by, "variations": variations })
}

/// Reduce a remote clause: drop `id`, default `negate` to false
pub fn normalize_remote_clause(clause: &Value) -> Value {
    json!({
        "attribute": clause.get("attribute").cloned().unwrap_or(Value::Null),
        "op": clause.get("op").cloned().unwrap_or(Value::Null),
        "values": clause.get("values").cloned().unwrap_or_else(|| json!([])),
        "negate": clause.get("negate").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// Served variation/rollout of a remote rule or fallthrough
pub fn normalize_remote_served(remote: &Value) -> Map<String, Value> {
    let mut map = Map::new();
    match (non_null(remote, "variation"), non_null(remote, "rollout")) {
        (Some(v), _) => {
            map.insert("variation".into(), v.clone());
        }
        (None, Some(r)) => {
            map.insert("rollout".into(), normalize_remote_rollout(r));
        }
        (None, None) => {}
    }
    map
}

/// Reduce a remote rule to the comparable shape of [`RuleSpec::comparable`]
///
/// `description` is only kept when `with_description` is set, so rules that do
/// not declare one are not compared on it.
pub fn normalize_remote_rule(rule: &Value, with_description: bool) -> Value {
    let mut map = normalize_remote_served(rule);
    map.insert("clauses".into(), Value::Array(remote_clauses(rule)));
    if with_description {
        map.insert(
            "description".into(),
            rule.get("description").cloned().unwrap_or(Value::Null),
        );
    }
    Value::Object(map)
}

pub fn remote_clauses(rule: &Value) -> Vec<Value> {
    rule.get("clauses")
        .and_then(Value::as_array)
        .map(|cs| cs.iter().map(normalize_remote_clause).collect())
        .unwrap_or_default()
}

pub fn normalize_remote_statement(statement: &Value) -> Value {
    let mut map = Map::new();
    for key in ["resources", "notResources", "actions", "notActions"] {
        if let Some(list) = statement.get(key).and_then(Value::as_array)
            && !list.is_empty()
        {
            map.insert(key.into(), Value::Array(list.clone()));
        }
    }
    map.insert(
        "effect".into(),
        statement.get("effect").cloned().unwrap_or(Value::Null),
    );
    Value::Object(map)
}

/// Drop null sub-keys of an object; other values pass through
pub fn prune_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

pub(crate) fn non_null<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|v| !v.is_null())
}
