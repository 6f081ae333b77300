//! Custom role resource

use anyhow::Result;
use declarative::normalize::StatementSpec;
use declarative::{
    CreateOutcome, DeleteOutcome, DesiredState, DesiredStatus, FieldSpec, PatchOperation,
    PatchPath, PatchRequest, ReconcileOptions, Resource, diff, reconcile_list,
};
use serde_json::{Value, json};

use super::{SharedClient, created, deleted, fetched};
use crate::schema::RoleDecl;

const FIELDS: &[FieldSpec] = &[FieldSpec::scalar("name"), FieldSpec::scalar("description")];

/// An account-wide custom role and its policy statements
#[derive(Debug)]
pub struct CustomRole {
    key: String,
    decl: RoleDecl,
    client: SharedClient,
}

impl CustomRole {
    pub fn new(key: &str, decl: &RoleDecl, client: SharedClient) -> Self {
        Self {
            key: key.to_string(),
            decl: decl.clone(),
            client,
        }
    }

    fn desired(&self) -> DesiredState {
        DesiredState::new()
            .with("name", self.decl.name.clone())
            .with("description", self.decl.description.clone())
    }

    fn statements(&self) -> Vec<Value> {
        self.decl
            .policy
            .iter()
            .flatten()
            .map(StatementSpec::to_value)
            .collect()
    }

    fn create_body(&self) -> Value {
        let mut body = json!({
            "key": self.key,
            "name": self.decl.name.as_deref().unwrap_or(&self.key),
            "policy": self.statements(),
        });
        if let Some(description) = &self.decl.description {
            body["description"] = description.clone().into();
        }
        body
    }
}

impl Resource for CustomRole {
    fn id(&self) -> String {
        format!("custom_role.{}", self.key)
    }

    fn description(&self) -> String {
        format!("Custom role {}", self.key)
    }

    fn resource_type(&self) -> &'static str {
        "custom_role"
    }

    fn desired_status(&self) -> DesiredStatus {
        self.decl.state
    }

    fn fetch(&self) -> Result<Option<Value>> {
        fetched(self.client.get_role(&self.key))
    }

    fn create(&self) -> Result<CreateOutcome> {
        created(self.client.create_role(&self.create_body()))
    }

    fn plan_update(&self, remote: &Value, opts: &ReconcileOptions) -> Result<Vec<PatchOperation>> {
        let mut patches = diff(&self.desired(), remote, FIELDS).patches;
        if let Some(policy) = &self.decl.policy {
            patches.extend(reconcile_list(
                policy,
                remote.get("policy"),
                &PatchPath::field("policy"),
                opts,
            )?);
        }
        Ok(patches)
    }

    fn submit_patch(&self, request: &PatchRequest) -> Result<Value> {
        Ok(self.client.patch_role(&self.key, request)?)
    }

    fn delete(&self) -> Result<DeleteOutcome> {
        deleted(self.client.delete_role(&self.key))
    }

    fn policy_input(&self) -> Value {
        let mut input = self.desired().to_value();
        input["key"] = self.key.clone().into();
        input["policy"] = Value::Array(self.statements());
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::mock_client;
    use declarative::normalize::Effect;
    use declarative::{ApplyContext, ApplyResult, PatchOp, reconcile};
    use flagapi::backend::MockBackend;

    fn statement(resource: &str, effect: Effect) -> StatementSpec {
        StatementSpec {
            resources: vec![resource.into()],
            not_resources: vec![],
            actions: vec!["*".into()],
            not_actions: vec![],
            effect,
        }
    }

    fn decl(policy: Vec<StatementSpec>) -> RoleDecl {
        RoleDecl {
            policy: Some(policy),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_defaults_name_to_key() {
        let mock = MockBackend::new();
        let role = CustomRole::new(
            "ops",
            &decl(vec![statement("proj/*", Effect::Allow)]),
            mock_client(&mock),
        );

        let outcome = reconcile(&role, &ApplyContext::new(false)).unwrap();
        assert_eq!(outcome.result, ApplyResult::Created);
        assert_eq!(mock.mutations(), vec!["POST /roles"]);

        let stored = mock.entity("/roles/ops").unwrap();
        assert_eq!(stored["name"], "ops");
        assert_eq!(
            stored["policy"],
            json!([{"resources": ["proj/*"], "actions": ["*"], "effect": "allow"}])
        );
    }

    #[test]
    fn test_policy_prefix_trims_tail() {
        let mock = MockBackend::new();
        mock.insert(
            "/roles/ops",
            json!({
                "key": "ops", "name": "ops",
                "policy": [
                    {"resources": ["proj/*"], "actions": ["*"], "effect": "allow", "notResources": []},
                    {"resources": ["proj/web"], "actions": ["*"], "effect": "deny"}
                ]
            }),
        );
        let role = CustomRole::new(
            "ops",
            &decl(vec![statement("proj/*", Effect::Allow)]),
            mock_client(&mock),
        );

        let outcome = reconcile(&role, &ApplyContext::new(false)).unwrap();
        assert_eq!(outcome.result, ApplyResult::Modified);
        assert_eq!(outcome.patches.len(), 1);
        assert_eq!(outcome.patches[0].op, PatchOp::Remove);
        assert_eq!(outcome.patches[0].path, "/policy/1");
    }

    #[test]
    fn test_changed_policy_replaced_whole() {
        let mock = MockBackend::new();
        mock.insert(
            "/roles/ops",
            json!({
                "key": "ops", "name": "ops",
                "policy": [{"resources": ["proj/*"], "actions": ["*"], "effect": "allow"}]
            }),
        );
        let role = CustomRole::new(
            "ops",
            &decl(vec![statement("proj/*", Effect::Deny)]),
            mock_client(&mock),
        );

        let remote = role.fetch().unwrap().unwrap();
        let patches = role.plan_update(&remote, &ReconcileOptions::default()).unwrap();
        assert_eq!(
            patches,
            vec![PatchOperation::replace(
                "/policy",
                json!([{"resources": ["proj/*"], "actions": ["*"], "effect": "deny"}])
            )]
        );
    }
}
