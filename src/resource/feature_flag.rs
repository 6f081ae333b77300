//! Feature flag resource
//!
//! Variations are set at creation from the flag kind and afterwards only
//! changed through positional patches. Per-environment targeting is a
//! separate resource ([`super::FlagEnvironment`]).

use anyhow::Result;
use declarative::normalize::VariationSpec;
use declarative::{
    CreateOutcome, DeleteOutcome, DesiredState, DesiredStatus, FieldSpec, PatchOperation,
    PatchPath, PatchRequest, ReconcileOptions, Resource, diff, reconcile_list,
};
use serde_json::{Value, json};

use super::{SharedClient, created, deleted, fetched, tags_or_empty};
use crate::schema::{FlagDecl, FlagKind};

const FIELDS: &[FieldSpec] = &[
    FieldSpec::scalar("name"),
    FieldSpec::scalar("description"),
    FieldSpec::scalar("temporary"),
    FieldSpec::tag_set("tags"),
    FieldSpec::scalar("includeInSnippet"),
    FieldSpec::scalar("maintainerId"),
    FieldSpec::list("variations"),
];

#[derive(Debug)]
pub struct FeatureFlag {
    project: String,
    key: String,
    decl: FlagDecl,
    client: SharedClient,
}

impl FeatureFlag {
    pub fn new(project: &str, key: &str, decl: &FlagDecl, client: SharedClient) -> Self {
        let mut decl = decl.clone();
        // Targeting is reconciled by FlagEnvironment
        decl.environments.clear();
        Self {
            project: project.to_string(),
            key: key.to_string(),
            decl,
            client,
        }
    }

    fn desired(&self) -> DesiredState {
        let d = &self.decl;
        DesiredState::new()
            .with("name", d.name.clone())
            .with("description", d.description.clone())
            .with("temporary", d.temporary)
            .with("tags", d.tags.clone())
            .with("includeInSnippet", d.include_in_snippet)
            .with("maintainerId", d.maintainer_id.clone())
    }

    /// Variations sent at creation
    fn creation_variations(&self) -> Vec<Value> {
        match (&self.decl.variations, self.decl.kind) {
            (Some(variations), _) => variations.iter().map(VariationSpec::to_value).collect(),
            (None, FlagKind::Bool) => vec![json!({"value": true}), json!({"value": false})],
            (None, _) => Vec::new(),
        }
    }

    fn create_body(&self) -> Value {
        let d = &self.decl;
        let mut body = json!({
            "key": self.key,
            "name": d.name.as_deref().unwrap_or(&self.key),
            "variations": self.creation_variations(),
            "temporary": d.temporary.unwrap_or(true),
            "tags": tags_or_empty(d.tags.as_ref()),
        });
        if let Some(description) = &d.description {
            body["description"] = description.clone().into();
        }
        if let Some(include) = d.include_in_snippet {
            body["includeInSnippet"] = include.into();
        }
        if let Some(maintainer) = &d.maintainer_id {
            body["maintainerId"] = maintainer.clone().into();
        }
        body
    }
}

impl Resource for FeatureFlag {
    fn id(&self) -> String {
        format!("feature_flag.{}.{}", self.project, self.key)
    }

    fn description(&self) -> String {
        format!("Flag {} in project {}", self.key, self.project)
    }

    fn resource_type(&self) -> &'static str {
        "feature_flag"
    }

    fn desired_status(&self) -> DesiredStatus {
        self.decl.state
    }

    fn fetch(&self) -> Result<Option<Value>> {
        fetched(self.client.get_flag(&self.project, &self.key, None))
    }

    fn create(&self) -> Result<CreateOutcome> {
        created(self.client.create_flag(&self.project, &self.create_body()))
    }

    fn plan_update(&self, remote: &Value, opts: &ReconcileOptions) -> Result<Vec<PatchOperation>> {
        let mut patches = diff(&self.desired(), remote, FIELDS).patches;
        if let Some(variations) = &self.decl.variations {
            patches.extend(reconcile_list(
                variations,
                remote.get("variations"),
                &PatchPath::field("variations"),
                opts,
            )?);
        }
        Ok(patches)
    }

    fn submit_patch(&self, request: &PatchRequest) -> Result<Value> {
        Ok(self.client.patch_flag(&self.project, &self.key, request)?)
    }

    fn delete(&self) -> Result<DeleteOutcome> {
        deleted(self.client.delete_flag(&self.project, &self.key))
    }

    fn policy_input(&self) -> Value {
        let mut input = self.desired().to_value();
        input["key"] = self.key.clone().into();
        input["projectKey"] = self.project.clone().into();
        input["kind"] = self.decl.kind.as_str().into();
        input["variations"] = Value::Array(self.creation_variations());
        input
    }
}
