//! Webhook resource
//!
//! Webhooks have server-assigned ids. A declaration naming an `id` is fetched
//! by it; otherwise the webhook is matched by url among the listed ones. The
//! resolved id is remembered for the patch and delete calls of the same run.

use anyhow::{Context, Result};
use declarative::normalize::StatementSpec;
use declarative::{
    CreateOutcome, DeleteOutcome, DesiredState, DesiredStatus, FieldSpec, PatchOperation,
    PatchPath, PatchRequest, ReconcileOptions, Resource, diff, reconcile_list, reconcile_toggle,
};
use flagapi::OptionalExt;
use serde_json::{Value, json};
use std::cell::RefCell;

use super::{SharedClient, created, deleted, tags_or_empty};
use crate::schema::WebhookDecl;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::scalar("name"),
    FieldSpec::scalar("url"),
    FieldSpec::scalar("sign"),
    FieldSpec::tag_set("tags"),
];

#[derive(Debug)]
pub struct Webhook {
    decl: WebhookDecl,
    resolved_id: RefCell<Option<String>>,
    client: SharedClient,
}

impl Webhook {
    pub fn new(decl: &WebhookDecl, client: SharedClient) -> Self {
        Self {
            decl: decl.clone(),
            resolved_id: RefCell::new(decl.id.clone()),
            client,
        }
    }

    fn desired(&self) -> DesiredState {
        let d = &self.decl;
        DesiredState::new()
            .with("name", d.name.clone())
            .with("url", d.url.clone())
            .with("sign", d.sign)
            .with("tags", d.tags.clone())
    }

    fn remember(&self, entity: &Value) {
        if let Some(id) = entity.get("_id").and_then(Value::as_str) {
            if self.decl.id.as_deref().is_some_and(|declared| declared != id) {
                log::warn!(
                    "webhook {} was created as {}; declare that id to keep tracking it",
                    self.decl.url,
                    id
                );
            }
            *self.resolved_id.borrow_mut() = Some(id.to_string());
        }
    }

    fn id_for_call(&self) -> Result<String> {
        self.resolved_id
            .borrow()
            .clone()
            .with_context(|| format!("Webhook {} has no resolved id", self.decl.url))
    }

    fn find_by_url(&self) -> Result<Option<Value>> {
        let hooks = self.client.list_webhooks()?;
        Ok(hooks
            .into_iter()
            .find(|hook| hook.get("url").and_then(Value::as_str) == Some(self.decl.url.as_str())))
    }

    fn create_body(&self) -> Value {
        let d = &self.decl;
        let mut body = json!({
            "url": d.url,
            "sign": d.sign,
            "on": d.state != DesiredStatus::Disabled,
            "name": d.name.as_deref().unwrap_or(&d.url),
            "tags": tags_or_empty(d.tags.as_ref()),
        });
        if let Some(statements) = &d.statements {
            body["statements"] = statements.iter().map(StatementSpec::to_value).collect();
        }
        if let Some(secret) = &d.secret {
            body["secret"] = secret.clone().into();
        }
        body
    }
}

impl Resource for Webhook {
    fn id(&self) -> String {
        format!("webhook.{}", self.decl.identity())
    }

    fn description(&self) -> String {
        format!("Webhook {}", self.decl.url)
    }

    fn resource_type(&self) -> &'static str {
        "webhook"
    }

    fn desired_status(&self) -> DesiredStatus {
        self.decl.state
    }

    fn fetch(&self) -> Result<Option<Value>> {
        let known = self.resolved_id.borrow().clone();
        let remote = match known {
            Some(id) => self.client.get_webhook(&id).optional()?,
            None => self.find_by_url()?,
        };
        if let Some(hook) = &remote {
            self.remember(hook);
        }
        Ok(remote)
    }

    fn create(&self) -> Result<CreateOutcome> {
        let outcome = created(self.client.create_webhook(&self.create_body()))?;
        if let CreateOutcome::Created(entity) = &outcome {
            self.remember(entity);
        }
        Ok(outcome)
    }

    fn plan_update(&self, remote: &Value, opts: &ReconcileOptions) -> Result<Vec<PatchOperation>> {
        let mut patches = diff(&self.desired(), remote, FIELDS).patches;
        patches.extend(reconcile_toggle(
            self.decl.state.toggle(),
            remote.get("on"),
            &PatchPath::field("on"),
        ));
        if let Some(statements) = &self.decl.statements {
            patches.extend(reconcile_list(
                statements,
                remote.get("statements"),
                &PatchPath::field("statements"),
                opts,
            )?);
        }
        Ok(patches)
    }

    fn submit_patch(&self, request: &PatchRequest) -> Result<Value> {
        Ok(self.client.patch_webhook(&self.id_for_call()?, request)?)
    }

    fn delete(&self) -> Result<DeleteOutcome> {
        if self.fetch()?.is_none() {
            return Ok(DeleteOutcome::AlreadyAbsent);
        }
        deleted(self.client.delete_webhook(&self.id_for_call()?))
    }

    fn policy_input(&self) -> Value {
        let mut input = self.desired().to_value();
        input["on"] = (self.decl.state != DesiredStatus::Disabled).into();
        if let Some(statements) = &self.decl.statements {
            input["statements"] = statements.iter().map(StatementSpec::to_value).collect();
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::mock_client;
    use declarative::{ApplyContext, ApplyResult, reconcile};
    use flagapi::backend::MockBackend;

    const URL: &str = "https://hooks.example.com/flags";

    fn decl() -> WebhookDecl {
        WebhookDecl {
            url: URL.into(),
            sign: true,
            secret: Some("s3cret".into()),
            tags: Some(vec!["audit".into()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_by_url_then_no_change() {
        let mock = MockBackend::new();
        let hook = Webhook::new(&decl(), mock_client(&mock));

        let outcome = reconcile(&hook, &ApplyContext::new(false)).unwrap();
        assert_eq!(outcome.result, ApplyResult::Created);
        let stored = outcome.entity.unwrap();
        assert_eq!(stored["name"], URL);
        assert_eq!(stored["on"], true);
        assert_eq!(stored["secret"], "s3cret");

        // A fresh resource finds it through the listing
        let again = Webhook::new(&decl(), mock_client(&mock));
        let outcome = reconcile(&again, &ApplyContext::new(false)).unwrap();
        assert_eq!(outcome.result, ApplyResult::NoChange);
        assert_eq!(mock.calls().last().unwrap(), "GET /webhooks");
    }

    #[test]
    fn test_disable_by_id() {
        let mock = MockBackend::new();
        mock.insert(
            "/webhooks/abc123",
            json!({"_id": "abc123", "url": URL, "name": URL, "sign": true, "tags": ["audit"], "on": true}),
        );
        let d = WebhookDecl {
            id: Some("abc123".into()),
            state: DesiredStatus::Disabled,
            ..decl()
        };
        let hook = Webhook::new(&d, mock_client(&mock));

        let outcome = reconcile(&hook, &ApplyContext::new(false)).unwrap();
        assert_eq!(outcome.result, ApplyResult::Modified);
        assert_eq!(outcome.patches, vec![PatchOperation::replace("/on", false)]);
        assert_eq!(mock.mutations(), vec!["PATCH /webhooks/abc123"]);
    }

    #[test]
    fn test_absent_unknown_webhook_is_no_change() {
        let mock = MockBackend::new();
        let d = WebhookDecl {
            state: DesiredStatus::Absent,
            ..decl()
        };
        let hook = Webhook::new(&d, mock_client(&mock));

        let outcome = reconcile(&hook, &ApplyContext::new(false)).unwrap();
        assert_eq!(outcome.result, ApplyResult::NoChange);
        assert!(mock.mutations().is_empty());
    }

    #[test]
    fn test_absent_deletes_matched_webhook() {
        let mock = MockBackend::new();
        mock.insert("/webhooks/abc123", json!({"_id": "abc123", "url": URL}));
        let d = WebhookDecl {
            state: DesiredStatus::Absent,
            ..decl()
        };
        let hook = Webhook::new(&d, mock_client(&mock));

        let outcome = reconcile(&hook, &ApplyContext::new(false)).unwrap();
        assert_eq!(outcome.result, ApplyResult::Removed);
        assert!(mock.entity("/webhooks/abc123").is_none());
    }
}
