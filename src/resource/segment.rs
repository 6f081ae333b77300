//! User segment resource
//!
//! Segments are per environment. Membership lists compare as sets; rules are
//! replaced as a whole when they differ after normalization.

use anyhow::Result;
use declarative::diff::values_equal;
use declarative::normalize::{ClauseSpec, DEFAULT_BUCKET_BY, remote_clauses};
use declarative::{
    CreateOutcome, DeleteOutcome, DesiredState, DesiredStatus, FieldSpec, PatchOperation,
    PatchPath, PatchRequest, ReconcileOptions, Resource, diff,
};
use serde_json::{Map, Value, json};

use super::{SharedClient, created, deleted, fetched, tags_or_empty};
use crate::schema::{SegmentDecl, SegmentRuleDecl};

const FIELDS: &[FieldSpec] = &[
    FieldSpec::scalar("name"),
    FieldSpec::scalar("description"),
    FieldSpec::tag_set("tags"),
    FieldSpec::tag_set("included"),
    FieldSpec::tag_set("excluded"),
];

#[derive(Debug)]
pub struct Segment {
    project: String,
    decl: SegmentDecl,
    client: SharedClient,
}

impl Segment {
    pub fn new(project: &str, decl: &SegmentDecl, client: SharedClient) -> Self {
        Self {
            project: project.to_string(),
            decl: decl.clone(),
            client,
        }
    }

    fn desired(&self) -> DesiredState {
        let d = &self.decl;
        DesiredState::new()
            .with("name", d.name.clone())
            .with("description", d.description.clone())
            .with("tags", d.tags.clone())
            .with("included", d.included.clone())
            .with("excluded", d.excluded.clone())
    }

    fn create_body(&self) -> Value {
        let d = &self.decl;
        json!({
            "key": d.key,
            "name": d.name.as_deref().unwrap_or(&d.key),
            "description": d.description.as_deref().unwrap_or_default(),
            "tags": tags_or_empty(d.tags.as_ref()),
        })
    }
}

/// Wire shape of a declared segment rule
pub(crate) fn rule_value(rule: &SegmentRuleDecl) -> Value {
    let mut map = Map::new();
    map.insert(
        "clauses".into(),
        rule.clauses.iter().map(ClauseSpec::to_value).collect(),
    );
    if let Some(weight) = rule.weight {
        map.insert("weight".into(), weight.into());
        map.insert(
            "bucketBy".into(),
            rule.bucket_by.as_deref().unwrap_or(DEFAULT_BUCKET_BY).into(),
        );
    } else if let Some(bucket_by) = &rule.bucket_by {
        map.insert("bucketBy".into(), bucket_by.clone().into());
    }
    Value::Object(map)
}

/// Reduce a remote segment rule to the shape of [`rule_value`]
fn normalize_remote_rule(rule: &Value) -> Value {
    let mut map = Map::new();
    map.insert("clauses".into(), Value::Array(remote_clauses(rule)));
    let weight = rule.get("weight").filter(|w| !w.is_null());
    if let Some(weight) = weight {
        map.insert("weight".into(), weight.clone());
    }
    match rule.get("bucketBy").and_then(Value::as_str) {
        Some(bucket_by) => {
            map.insert("bucketBy".into(), bucket_by.into());
        }
        None if weight.is_some() => {
            map.insert("bucketBy".into(), DEFAULT_BUCKET_BY.into());
        }
        None => {}
    }
    Value::Object(map)
}

/// One whole-list patch when the declared rules differ from the remote ones
pub(crate) fn rules_patch(
    rules: &[SegmentRuleDecl],
    remote: Option<&Value>,
) -> Option<PatchOperation> {
    let wanted: Vec<Value> = rules.iter().map(rule_value).collect();
    let path = PatchPath::field("rules");
    match remote.and_then(Value::as_array) {
        Some(current) => {
            let have: Vec<Value> = current.iter().map(normalize_remote_rule).collect();
            if values_equal(&Value::Array(have), &Value::Array(wanted.clone())) {
                None
            } else {
                Some(PatchOperation::replace(path, wanted))
            }
        }
        None if wanted.is_empty() => None,
        None => Some(PatchOperation::add(path, wanted)),
    }
}

impl Resource for Segment {
    fn id(&self) -> String {
        format!(
            "segment.{}.{}.{}",
            self.project, self.decl.environment, self.decl.key
        )
    }

    fn description(&self) -> String {
        format!(
            "Segment {} in {}/{}",
            self.decl.key, self.project, self.decl.environment
        )
    }

    fn resource_type(&self) -> &'static str {
        "segment"
    }

    fn desired_status(&self) -> DesiredStatus {
        self.decl.state
    }

    fn fetch(&self) -> Result<Option<Value>> {
        fetched(
            self.client
                .get_segment(&self.project, &self.decl.environment, &self.decl.key),
        )
    }

    fn create(&self) -> Result<CreateOutcome> {
        created(self.client.create_segment(
            &self.project,
            &self.decl.environment,
            &self.create_body(),
        ))
    }

    fn plan_update(&self, remote: &Value, _opts: &ReconcileOptions) -> Result<Vec<PatchOperation>> {
        let mut patches = diff(&self.desired(), remote, FIELDS).patches;
        if let Some(rules) = &self.decl.rules {
            patches.extend(rules_patch(rules, remote.get("rules")));
        }
        Ok(patches)
    }

    fn submit_patch(&self, request: &PatchRequest) -> Result<Value> {
        Ok(self.client.patch_segment(
            &self.project,
            &self.decl.environment,
            &self.decl.key,
            request,
        )?)
    }

    fn delete(&self) -> Result<DeleteOutcome> {
        deleted(
            self.client
                .delete_segment(&self.project, &self.decl.environment, &self.decl.key),
        )
    }

    fn policy_input(&self) -> Value {
        let mut input = self.desired().to_value();
        input["key"] = self.decl.key.clone().into();
        input["projectKey"] = self.project.clone().into();
        input["environmentKey"] = self.decl.environment.clone().into();
        if let Some(rules) = &self.decl.rules {
            input["rules"] = rules.iter().map(rule_value).collect();
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::mock_client;
    use declarative::normalize::ClauseOp;
    use declarative::{ApplyContext, ApplyResult, reconcile};
    use flagapi::backend::MockBackend;

    fn beta_rule() -> SegmentRuleDecl {
        SegmentRuleDecl {
            clauses: vec![ClauseSpec {
                attribute: "email".into(),
                op: ClauseOp::EndsWith,
                values: vec![json!("@example.com")],
                negate: None,
            }],
            weight: None,
            bucket_by: None,
        }
    }

    fn decl() -> SegmentDecl {
        SegmentDecl {
            key: "beta".into(),
            environment: "production".into(),
            name: Some("Beta".into()),
            included: Some(vec!["alice".into(), "bob".into()]),
            rules: Some(vec![beta_rule()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_then_patch_membership() {
        let mock = MockBackend::new();
        let segment = Segment::new("web", &decl(), mock_client(&mock));

        let outcome = reconcile(&segment, &ApplyContext::new(false)).unwrap();
        assert_eq!(outcome.result, ApplyResult::Created);
        assert_eq!(
            mock.mutations(),
            vec![
                "POST /segments/web/production",
                "PATCH /segments/web/production/beta",
            ]
        );

        let stored = mock.entity("/segments/web/production/beta").unwrap();
        assert_eq!(stored["description"], "");
        assert_eq!(stored["included"], json!(["alice", "bob"]));
        assert_eq!(stored["rules"][0]["clauses"][0]["op"], "endsWith");
    }

    #[test]
    fn test_membership_compared_as_set() {
        let mock = MockBackend::new();
        mock.insert(
            "/segments/web/production/beta",
            json!({
                "key": "beta", "name": "Beta",
                "included": ["bob", "alice"],
                "rules": [{
                    "_id": "r1",
                    "clauses": [{"_id": "c1", "attribute": "email", "op": "endsWith", "values": ["@example.com"], "negate": false}]
                }]
            }),
        );
        let segment = Segment::new("web", &decl(), mock_client(&mock));

        let outcome = reconcile(&segment, &ApplyContext::new(false)).unwrap();
        assert_eq!(outcome.result, ApplyResult::NoChange);
    }

    #[test]
    fn test_changed_rules_replaced_whole() {
        let mut rule = beta_rule();
        rule.weight = Some(50_000);
        let patch = rules_patch(
            &[rule],
            Some(&json!([{"clauses": [{"attribute": "email", "op": "endsWith", "values": ["@example.com"]}]}])),
        )
        .unwrap();
        assert_eq!(patch.path, "/rules");
        assert_eq!(patch.op, declarative::PatchOp::Replace);
        assert_eq!(patch.value[0]["weight"], 50_000);
        assert_eq!(patch.value[0]["bucketBy"], "key");
    }

    #[test]
    fn test_empty_rules_on_missing_list_is_noop() {
        assert!(rules_patch(&[], None).is_none());
        assert!(rules_patch(&[], Some(&json!([]))).is_none());
    }
}
