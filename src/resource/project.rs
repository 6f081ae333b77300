//! Project resource

use anyhow::Result;
use declarative::{
    CreateOutcome, DeleteOutcome, DesiredState, DesiredStatus, FieldSpec, PatchOperation,
    PatchRequest, ReconcileOptions, Resource, diff,
};
use serde_json::{Map, Value, json};

use super::{SharedClient, created, deleted, fetched, tags_or_empty};
use crate::schema::{EnvironmentDecl, ProjectDecl};

const FIELDS: &[FieldSpec] = &[
    FieldSpec::scalar("name"),
    FieldSpec::tag_set("tags"),
    FieldSpec::scalar("includeInSnippetByDefault"),
];

/// A project, created together with its declared environments
#[derive(Debug)]
pub struct Project {
    key: String,
    decl: ProjectDecl,
    client: SharedClient,
}

impl Project {
    pub fn new(key: &str, decl: &ProjectDecl, client: SharedClient) -> Self {
        Self {
            key: key.to_string(),
            decl: decl.clone(),
            client,
        }
    }

    fn desired(&self) -> DesiredState {
        DesiredState::new()
            .with("name", self.decl.name.clone())
            .with("tags", self.decl.tags.clone())
            .with(
                "includeInSnippetByDefault",
                self.decl.include_in_snippet_by_default,
            )
    }

    fn create_body(&self) -> Value {
        let environments: Vec<Value> = self
            .decl
            .environments
            .iter()
            .filter(|(_, env)| env.state.is_present())
            .map(|(key, env)| environment_create_body(key, env))
            .collect();

        let mut body = json!({
            "key": self.key,
            "name": self.decl.name.as_deref().unwrap_or(&self.key),
            "tags": tags_or_empty(self.decl.tags.as_ref()),
        });
        if !environments.is_empty() {
            body["environments"] = Value::Array(environments);
        }
        if let Some(include) = self.decl.include_in_snippet_by_default {
            body["includeInSnippetByDefault"] = include.into();
        }
        body
    }
}

/// Creation-time fields of an environment; the rest is patched afterwards
pub(crate) fn environment_create_body(key: &str, env: &EnvironmentDecl) -> Value {
    let mut body = Map::new();
    body.insert("key".into(), key.into());
    body.insert(
        "name".into(),
        env.name.clone().unwrap_or_else(|| key.to_string()).into(),
    );
    if let Some(color) = &env.color {
        body.insert("color".into(), color.clone().into());
    }
    if let Some(ttl) = env.default_ttl {
        body.insert("defaultTtl".into(), ttl.into());
    }
    Value::Object(body)
}

impl Resource for Project {
    fn id(&self) -> String {
        format!("project.{}", self.key)
    }

    fn description(&self) -> String {
        format!("Project {}", self.key)
    }

    fn resource_type(&self) -> &'static str {
        "project"
    }

    fn desired_status(&self) -> DesiredStatus {
        self.decl.state
    }

    fn fetch(&self) -> Result<Option<Value>> {
        fetched(self.client.get_project(&self.key))
    }

    fn create(&self) -> Result<CreateOutcome> {
        created(self.client.create_project(&self.create_body()))
    }

    fn plan_update(&self, remote: &Value, _opts: &ReconcileOptions) -> Result<Vec<PatchOperation>> {
        Ok(diff(&self.desired(), remote, FIELDS).patches)
    }

    fn submit_patch(&self, request: &PatchRequest) -> Result<Value> {
        Ok(self.client.patch_project(&self.key, request)?)
    }

    fn delete(&self) -> Result<DeleteOutcome> {
        deleted(self.client.delete_project(&self.key))
    }

    fn policy_input(&self) -> Value {
        let mut input = self.desired().to_value();
        input["key"] = self.key.clone().into();
        input
    }
}
