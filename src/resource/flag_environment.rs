//! A feature flag's targeting in one environment
//!
//! The configuration lives inside the flag (`environments.<env>`) and is
//! patched through the flag at `/environments/<env>/...`. It cannot be created
//! or deleted: it exists as soon as the flag does, and `absent` resets it
//! (targeting off, no targets, rules or prerequisites).

use anyhow::Result;
use declarative::{
    CreateOutcome, DeleteOutcome, DesiredState, DesiredStatus, Error, FieldSpec, PatchOperation,
    PatchPath, PatchRequest, ReconcileOptions, Resource, diff_at, patch, reconcile_fallthrough,
    reconcile_list, reconcile_toggle,
};
use flagapi::OptionalExt;
use serde_json::{Value, json};

use super::SharedClient;
use crate::schema::FlagEnvironmentDecl;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::scalar("offVariation"),
    FieldSpec::scalar("trackEvents"),
];

/// Lists emptied when targeting is reset
const RESET_LISTS: [&str; 3] = ["targets", "rules", "prerequisites"];

#[derive(Debug)]
pub struct FlagEnvironment {
    project: String,
    flag_key: String,
    env: String,
    decl: FlagEnvironmentDecl,
    /// The flag is declared in the same manifest and may not exist yet
    flag_declared: bool,
    /// Comment for reset batches, which bypass the controller's patch path
    comment: Option<String>,
    client: SharedClient,
}

impl FlagEnvironment {
    pub fn new(
        project: &str,
        flag_key: &str,
        env: &str,
        decl: &FlagEnvironmentDecl,
        client: SharedClient,
    ) -> Self {
        Self {
            project: project.to_string(),
            flag_key: flag_key.to_string(),
            env: env.to_string(),
            decl: decl.clone(),
            flag_declared: false,
            comment: None,
            client,
        }
    }

    /// Mark the flag as declared alongside, so a missing flag is not fatal
    pub fn with_flag_declared(mut self, declared: bool) -> Self {
        self.flag_declared = declared;
        self
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    fn base(&self) -> PatchPath {
        PatchPath::field("environments").push(&self.env)
    }

    fn missing_flag(&self) -> Error {
        Error::missing(format!(
            "Flag: {} in Project: {}",
            self.flag_key, self.project
        ))
    }

    /// This environment's configuration within a fetched flag
    fn config_of(&self, flag: &Value) -> Result<Value> {
        flag.get("environments")
            .and_then(|envs| envs.get(&self.env))
            .cloned()
            .ok_or_else(|| {
                Error::missing(format!(
                    "Environment: {} of Flag: {} in Project: {}",
                    self.env, self.flag_key, self.project
                ))
                .into()
            })
    }

    /// Patches that reset targeting, empty when already reset
    fn reset_patches(&self, remote: &Value) -> Vec<PatchOperation> {
        let base = self.base();
        let mut patches = Vec::new();
        if remote.get("on").and_then(Value::as_bool) == Some(true) {
            patches.push(PatchOperation::replace(base.push("on"), false));
        }
        for list in RESET_LISTS {
            if remote
                .get(list)
                .and_then(Value::as_array)
                .is_some_and(|items| !items.is_empty())
            {
                patches.push(PatchOperation::replace(base.push(list), json!([])));
            }
        }
        patches
    }
}

impl Resource for FlagEnvironment {
    fn id(&self) -> String {
        format!(
            "flag_environment.{}.{}.{}",
            self.project, self.flag_key, self.env
        )
    }

    fn description(&self) -> String {
        format!("Targeting of flag {} in {}", self.flag_key, self.env)
    }

    fn resource_type(&self) -> &'static str {
        "flag_environment"
    }

    fn desired_status(&self) -> DesiredStatus {
        self.decl.state
    }

    fn fetch(&self) -> Result<Option<Value>> {
        let flag = self
            .client
            .get_flag(&self.project, &self.flag_key, Some(&self.env))
            .optional()?;
        match flag {
            Some(flag) => self.config_of(&flag).map(Some),
            // Created earlier in the same run; planned as a create
            None if self.flag_declared => Ok(None),
            None => Err(self.missing_flag().into()),
        }
    }

    /// Configs appear with their flag; by now the flag must exist
    fn create(&self) -> Result<CreateOutcome> {
        match self
            .client
            .get_flag(&self.project, &self.flag_key, Some(&self.env))
            .optional()?
        {
            Some(flag) => {
                self.config_of(&flag)?;
                Ok(CreateOutcome::Conflict)
            }
            None => Err(self.missing_flag().into()),
        }
    }

    fn plan_update(&self, remote: &Value, opts: &ReconcileOptions) -> Result<Vec<PatchOperation>> {
        let base = self.base();
        let d = &self.decl;
        let mut patches = Vec::new();

        patches.extend(reconcile_toggle(
            d.state.toggle(),
            remote.get("on"),
            &base.push("on"),
        ));

        let desired = DesiredState::new()
            .with("offVariation", d.off_variation)
            .with("trackEvents", d.track_events);
        patches.extend(diff_at(&desired, remote, FIELDS, &base).patches);

        if let Some(targets) = &d.targets {
            patches.extend(reconcile_list(
                targets,
                remote.get("targets"),
                &base.push("targets"),
                opts,
            )?);
        }
        if let Some(rules) = &d.rules {
            patches.extend(reconcile_list(
                rules,
                remote.get("rules"),
                &base.push("rules"),
                opts,
            )?);
        }
        patches.extend(reconcile_fallthrough(
            d.fallthrough.as_ref(),
            remote.get("fallthrough"),
            &base.push("fallthrough"),
        ));
        if let Some(prerequisites) = &d.prerequisites {
            patches.extend(reconcile_list(
                prerequisites,
                remote.get("prerequisites"),
                &base.push("prerequisites"),
                opts,
            )?);
        }

        Ok(patches)
    }

    fn submit_patch(&self, request: &PatchRequest) -> Result<Value> {
        let flag = self
            .client
            .patch_flag(&self.project, &self.flag_key, request)?;
        self.config_of(&flag)
    }

    /// Reset targeting instead of deleting
    fn delete(&self) -> Result<DeleteOutcome> {
        let Some(remote) = self.fetch()? else {
            return Ok(DeleteOutcome::AlreadyAbsent);
        };
        let patches = self.reset_patches(&remote);
        if patches.is_empty() {
            return Ok(DeleteOutcome::AlreadyAbsent);
        }
        let request = patch::build(patches, self.comment.as_deref());
        self.client
            .patch_flag(&self.project, &self.flag_key, &request)?;
        Ok(DeleteOutcome::Deleted)
    }

    fn needs_removal(&self, remote: &Value) -> bool {
        !self.reset_patches(remote).is_empty()
    }

    fn policy_input(&self) -> Value {
        let mut input = serde_json::to_value(&self.decl).unwrap_or(Value::Null);
        if let Some(obj) = input.as_object_mut() {
            obj.insert("flagKey".into(), self.flag_key.clone().into());
            obj.insert("projectKey".into(), self.project.clone().into());
            obj.insert("environmentKey".into(), self.env.clone().into());
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::mock_client;
    use declarative::normalize::{
        ClauseOp, ClauseSpec, ItemState, RolloutSpec, RuleSpec, TargetSpec, WeightedVariationSpec,
    };
    use declarative::{ApplyContext, ApplyResult, PatchOp, reconcile};
    use flagapi::backend::MockBackend;

    fn seed(mock: &MockBackend, config: Value) {
        mock.insert(
            "/flags/web/search",
            json!({
                "key": "search",
                "variations": [{"value": true}, {"value": false}],
                "environments": {"production": config}
            }),
        );
    }

    fn resource(mock: &MockBackend, decl: FlagEnvironmentDecl) -> FlagEnvironment {
        FlagEnvironment::new("web", "search", "production", &decl, mock_client(mock))
    }

    #[test]
    fn test_enable_and_add_target_value() {
        let mock = MockBackend::new();
        seed(
            &mock,
            json!({"on": false, "targets": [{"variation": 1, "values": ["a"]}]}),
        );
        let env = resource(
            &mock,
            FlagEnvironmentDecl {
                state: DesiredStatus::Enabled,
                targets: Some(vec![TargetSpec {
                    variation: 1,
                    values: vec!["a".into(), "b".into()],
                    state: ItemState::Add,
                }]),
                ..Default::default()
            },
        );

        let outcome = reconcile(&env, &ApplyContext::new(false)).unwrap();
        assert_eq!(outcome.result, ApplyResult::Modified);
        assert_eq!(
            outcome.patches,
            vec![
                PatchOperation::replace("/environments/production/on", true),
                PatchOperation::add("/environments/production/targets/0/values/1", "b"),
            ]
        );
        assert_eq!(mock.mutations(), vec!["PATCH /flags/web/search"]);

        let stored = mock.entity("/flags/web/search").unwrap();
        assert_eq!(
            stored["environments"]["production"]["targets"][0]["values"],
            json!(["a", "b"])
        );

        // Second run is a no-op
        let again = reconcile(&env, &ApplyContext::new(false)).unwrap();
        assert_eq!(again.result, ApplyResult::NoChange);
    }

    #[test]
    fn test_missing_flag_is_fatal() {
        let mock = MockBackend::new();
        let env = resource(&mock, FlagEnvironmentDecl::default());
        let err = env.fetch().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Flag: search in Project: web does not exist"
        );
    }

    #[test]
    fn test_flag_created_in_same_run() {
        let mock = MockBackend::new();
        let env = resource(
            &mock,
            FlagEnvironmentDecl {
                state: DesiredStatus::Enabled,
                ..Default::default()
            },
        )
        .with_flag_declared(true);
        assert_eq!(env.fetch().unwrap(), None);

        seed(&mock, json!({"on": false}));
        let outcome = reconcile(&env, &ApplyContext::new(false)).unwrap();
        assert_eq!(outcome.result, ApplyResult::Modified);
    }

    #[test]
    fn test_rule_variation_to_rollout() {
        let mock = MockBackend::new();
        seed(
            &mock,
            json!({
                "on": true,
                "rules": [{
                    "_id": "r1",
                    "variation": 1,
                    "clauses": [{"_id": "c1", "attribute": "country", "op": "in", "values": ["NZ"], "negate": false}]
                }]
            }),
        );
        let env = resource(
            &mock,
            FlagEnvironmentDecl {
                rules: Some(vec![RuleSpec {
                    rollout: Some(RolloutSpec {
                        bucket_by: None,
                        weighted_variations: vec![
                            WeightedVariationSpec { variation: 0, weight: 60_000 },
                            WeightedVariationSpec { variation: 1, weight: 40_000 },
                        ],
                    }),
                    clauses: vec![ClauseSpec {
                        attribute: "country".into(),
                        op: ClauseOp::In,
                        values: vec![json!("NZ")],
                        negate: None,
                    }],
                    ..Default::default()
                }]),
                ..Default::default()
            },
        );

        let remote = env.fetch().unwrap().unwrap();
        let patches = env.plan_update(&remote, &ReconcileOptions::default()).unwrap();
        let ops: Vec<_> = patches.iter().map(|p| (p.op, p.path.as_str())).collect();
        assert_eq!(
            ops,
            vec![
                (PatchOp::Remove, "/environments/production/rules/0/variation"),
                (PatchOp::Add, "/environments/production/rules/0/rollout"),
            ]
        );

        let outcome = reconcile(&env, &ApplyContext::new(false)).unwrap();
        assert_eq!(outcome.result, ApplyResult::Modified);
        let again = env.plan_update(&env.fetch().unwrap().unwrap(), &ReconcileOptions::default());
        assert!(again.unwrap().is_empty());
    }

    #[test]
    fn test_absent_resets_targeting() {
        let mock = MockBackend::new();
        seed(
            &mock,
            json!({
                "on": true,
                "targets": [{"variation": 0, "values": ["a"]}],
                "rules": [],
                "prerequisites": [{"key": "login", "variation": 0}]
            }),
        );
        let env = resource(
            &mock,
            FlagEnvironmentDecl {
                state: DesiredStatus::Absent,
                ..Default::default()
            },
        )
        .with_comment(Some("cleanup".into()));

        let outcome = reconcile(&env, &ApplyContext::new(false)).unwrap();
        assert_eq!(outcome.result, ApplyResult::Removed);

        let config = &mock.entity("/flags/web/search").unwrap()["environments"]["production"];
        assert_eq!(config["on"], false);
        assert_eq!(config["targets"], json!([]));
        assert_eq!(config["prerequisites"], json!([]));

        let again = reconcile(&env, &ApplyContext::new(false)).unwrap();
        assert_eq!(again.result, ApplyResult::NoChange);
    }

    #[test]
    fn test_unmanaged_fields_untouched() {
        let mock = MockBackend::new();
        seed(
            &mock,
            json!({"on": true, "offVariation": 1, "trackEvents": true, "targets": [{"variation": 0, "values": ["x"]}]}),
        );
        let env = resource(
            &mock,
            FlagEnvironmentDecl {
                off_variation: Some(1),
                ..Default::default()
            },
        );
        let remote = env.fetch().unwrap().unwrap();
        assert!(env.plan_update(&remote, &ReconcileOptions::default()).unwrap().is_empty());
    }
}
