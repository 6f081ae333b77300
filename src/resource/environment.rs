//! Environment resource

use anyhow::Result;
use declarative::{
    CreateOutcome, DeleteOutcome, DesiredState, DesiredStatus, FieldSpec, PatchOperation,
    PatchRequest, ReconcileOptions, Resource, diff,
};
use serde_json::Value;

use super::project::environment_create_body;
use super::{SharedClient, created, deleted, fetched};
use crate::schema::EnvironmentDecl;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::scalar("name"),
    FieldSpec::scalar("color"),
    FieldSpec::scalar("defaultTtl"),
    FieldSpec::scalar("secureMode"),
    FieldSpec::scalar("defaultTrackEvents"),
    FieldSpec::tag_set("tags"),
    FieldSpec::scalar("confirmChanges"),
    FieldSpec::scalar("requireComments"),
];

/// An environment within a project
#[derive(Debug)]
pub struct Environment {
    project: String,
    key: String,
    decl: EnvironmentDecl,
    client: SharedClient,
}

impl Environment {
    pub fn new(project: &str, key: &str, decl: &EnvironmentDecl, client: SharedClient) -> Self {
        Self {
            project: project.to_string(),
            key: key.to_string(),
            decl: decl.clone(),
            client,
        }
    }

    fn desired(&self) -> DesiredState {
        let d = &self.decl;
        DesiredState::new()
            .with("name", d.name.clone())
            .with("color", d.color.clone())
            .with("defaultTtl", d.default_ttl)
            .with("secureMode", d.secure_mode)
            .with("defaultTrackEvents", d.default_track_events)
            .with("tags", d.tags.clone())
            .with("confirmChanges", d.confirm_changes)
            .with("requireComments", d.require_comments)
    }
}

impl Resource for Environment {
    fn id(&self) -> String {
        format!("environment.{}.{}", self.project, self.key)
    }

    fn description(&self) -> String {
        format!("Environment {} in project {}", self.key, self.project)
    }

    fn resource_type(&self) -> &'static str {
        "environment"
    }

    fn desired_status(&self) -> DesiredStatus {
        self.decl.state
    }

    fn fetch(&self) -> Result<Option<Value>> {
        fetched(self.client.get_environment(&self.project, &self.key))
    }

    fn create(&self) -> Result<CreateOutcome> {
        let body = environment_create_body(&self.key, &self.decl);
        created(self.client.create_environment(&self.project, &body))
    }

    fn plan_update(&self, remote: &Value, _opts: &ReconcileOptions) -> Result<Vec<PatchOperation>> {
        Ok(diff(&self.desired(), remote, FIELDS).patches)
    }

    fn submit_patch(&self, request: &PatchRequest) -> Result<Value> {
        Ok(self
            .client
            .patch_environment(&self.project, &self.key, request)?)
    }

    fn delete(&self) -> Result<DeleteOutcome> {
        deleted(self.client.delete_environment(&self.project, &self.key))
    }

    fn policy_input(&self) -> Value {
        let mut input = self.desired().to_value();
        input["key"] = self.key.clone().into();
        input["projectKey"] = self.project.clone().into();
        input
    }
}
