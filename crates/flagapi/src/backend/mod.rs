//! Backend traits and implementations for talking to the API.
//!
//! [`Backend`] is a thin JSON transport: a path in, a JSON document out.
//! [`http::HttpBackend`] talks to the real service; [`MockBackend`] keeps
//! entities in memory and applies patches locally.
//!
//! # Testing
//!
//! ```
//! use flagapi::backend::{Backend, MockBackend};
//! use serde_json::json;
//!
//! let mock = MockBackend::new();
//! mock.insert("/roles/admin", json!({"key": "admin", "name": "Admin"}));
//!
//! let role = mock.get("/roles/admin").unwrap();
//! assert_eq!(role["name"], "Admin");
//! ```

pub mod http;

use crate::endpoint::strip_query;
use crate::error::{Error, Result};
use declarative::patch::{PatchOperation, apply_patch};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// HTTP method of a backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Patch => write!(f, "PATCH"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Backend trait for API calls.
///
/// Paths are relative to the API base URL and may carry a query string.
/// Non-2xx responses come back as classified [`Error`]s.
pub trait Backend: Send + Sync {
    /// Fetch a document.
    fn get(&self, path: &str) -> Result<Value>;

    /// Create an entity in the collection at `path`.
    fn post(&self, path: &str, body: &Value) -> Result<Value>;

    /// Submit a patch request to the entity at `path`.
    fn patch(&self, path: &str, body: &Value) -> Result<Value>;

    /// Delete the entity at `path`.
    fn delete(&self, path: &str) -> Result<()>;
}

/// In-memory backend for testing without network access.
///
/// Entities live in a map keyed by path. Creating stores the body under
/// `<collection>/<key>`, patching applies the operations in order and bumps
/// `_version`, and scripted failures can be queued with [`fail_next`].
///
/// [`fail_next`]: MockBackend::fail_next
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    entities: BTreeMap<String, Value>,
    failures: VecDeque<(Option<Method>, Error)>,
    calls: Vec<String>,
    next_id: u64,
}

impl MockBackend {
    /// Create a new empty mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an entity as-is.
    pub fn insert(&self, path: impl Into<String>, entity: Value) {
        self.state().entities.insert(path.into(), entity);
    }

    /// Current copy of an entity.
    pub fn entity(&self, path: &str) -> Option<Value> {
        self.state().entities.get(path).cloned()
    }

    /// Make the next call fail.
    pub fn fail_next(&self, error: Error) {
        self.state().failures.push_back((None, error));
    }

    /// Make the next call with `method` fail.
    pub fn fail_next_on(&self, method: Method, error: Error) {
        self.state().failures.push_back((Some(method), error));
    }

    /// Every call made so far, as `"METHOD /path"`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Calls other than GET.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("GET "))
            .collect()
    }

    /// Record a call and pop a matching scripted failure.
    fn begin(&self, method: Method, path: &str) -> Result<std::sync::MutexGuard<'_, MockState>> {
        let mut state = self.state();
        state.calls.push(format!("{method} {path}"));
        let matches = state
            .failures
            .front()
            .is_some_and(|(m, _)| m.is_none_or(|m| m == method));
        if matches && let Some((_, error)) = state.failures.pop_front() {
            return Err(error);
        }
        Ok(state)
    }
}

impl MockState {
    fn children(&self, path: &str) -> Vec<Value> {
        let prefix = format!("{path}/");
        self.entities
            .iter()
            .filter(|(k, _)| k.strip_prefix(&prefix).is_some_and(|rest| !rest.contains('/')))
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn generate_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:024x}", self.next_id)
    }

    /// Default per-environment configuration of a newly created flag
    fn seed_flag_environments(&self, project: &str, flag: &mut Value) {
        let variations = flag
            .get("variations")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        let mut environments = Map::new();
        for env in self.children(&crate::endpoint::environments(project)) {
            if let Some(key) = env.get("key").and_then(Value::as_str) {
                environments.insert(
                    key.to_string(),
                    json!({
                        "on": false,
                        "archived": false,
                        "offVariation": variations.saturating_sub(1),
                        "fallthrough": {"variation": 0},
                        "targets": [],
                        "rules": [],
                        "prerequisites": [],
                        "trackEvents": false,
                        "_version": 1,
                    }),
                );
            }
        }
        flag["environments"] = Value::Object(environments);
    }
}

/// Collection paths answer GET with `{"items": [...]}`.
fn is_collection(path: &str) -> bool {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    matches!(
        segments.as_slice(),
        ["projects" | "roles" | "webhooks"]
            | ["flags", _]
            | ["segments", _, _]
            | ["projects", _, "environments"]
    )
}

fn bump_version(entity: &mut Value) {
    let next = entity.get("_version").and_then(Value::as_u64).unwrap_or(0) + 1;
    if let Some(obj) = entity.as_object_mut() {
        obj.insert("_version".into(), next.into());
    }
}

fn patch_operations(body: &Value) -> Result<Vec<PatchOperation>> {
    let ops = body.get("patch").unwrap_or(body);
    serde_json::from_value(ops.clone()).map_err(|e| Error::Api {
        status: 400,
        message: format!("invalid patch: {e}"),
    })
}

impl Backend for MockBackend {
    fn get(&self, path: &str) -> Result<Value> {
        let state = self.begin(Method::Get, path)?;
        let path = strip_query(path);

        if let Some(entity) = state.entities.get(path) {
            return Ok(entity.clone());
        }
        if is_collection(path) {
            return Ok(json!({"items": state.children(path)}));
        }
        Err(Error::NotFound {
            path: path.to_string(),
        })
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let mut state = self.begin(Method::Post, path)?;
        let path = strip_query(path);

        if let Some(flag_path) = path.strip_suffix("/copy") {
            return copy_flag(&mut state, flag_path, body);
        }

        let mut entity = body.clone();
        let key = match body.get("key").and_then(Value::as_str) {
            Some(key) => key.to_string(),
            None => {
                let id = state.generate_id();
                entity["_id"] = Value::String(id.clone());
                id
            }
        };
        let entity_path = format!("{path}/{key}");
        if state.entities.contains_key(&entity_path) {
            return Err(Error::Conflict {
                message: format!("key_exists: {key}"),
            });
        }

        entity["_version"] = json!(1);
        if let Some(project) = path.strip_prefix("/flags/") {
            state.seed_flag_environments(project, &mut entity);
        }
        if path == "/projects"
            && let Some(envs) = body.get("environments").and_then(Value::as_array)
        {
            for env in envs {
                if let Some(env_key) = env.get("key").and_then(Value::as_str) {
                    let mut env = env.clone();
                    env["_version"] = json!(1);
                    state
                        .entities
                        .insert(crate::endpoint::environment(&key, env_key), env);
                }
            }
        }

        state.entities.insert(entity_path, entity.clone());
        Ok(entity)
    }

    fn patch(&self, path: &str, body: &Value) -> Result<Value> {
        let mut state = self.begin(Method::Patch, path)?;
        let path = strip_query(path);
        let ops = patch_operations(body)?;

        let entity = state.entities.get_mut(path).ok_or_else(|| Error::NotFound {
            path: path.to_string(),
        })?;

        // Apply to a copy so a failing batch leaves the entity untouched
        let mut updated = entity.clone();
        apply_patch(&mut updated, &ops).map_err(|e| Error::Api {
            status: 400,
            message: e.to_string(),
        })?;
        bump_version(&mut updated);
        *entity = updated.clone();
        Ok(updated)
    }

    fn delete(&self, path: &str) -> Result<()> {
        let mut state = self.begin(Method::Delete, path)?;
        let path = strip_query(path);

        if state.entities.remove(path).is_none() {
            return Err(Error::NotFound {
                path: path.to_string(),
            });
        }
        let prefix = format!("{path}/");
        state.entities.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }
}

fn copy_flag(state: &mut MockState, flag_path: &str, body: &Value) -> Result<Value> {
    let source = body["source"]["key"].as_str().unwrap_or_default().to_string();
    let target = body["target"]["key"].as_str().unwrap_or_default().to_string();

    let flag = state
        .entities
        .get_mut(flag_path)
        .ok_or_else(|| Error::NotFound {
            path: flag_path.to_string(),
        })?;
    let config = flag["environments"]
        .get(&source)
        .cloned()
        .ok_or_else(|| Error::Api {
            status: 400,
            message: format!("unknown source environment: {source}"),
        })?;
    flag["environments"][&target] = config;
    bump_version(flag);
    Ok(flag.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::patch::build;

    #[test]
    fn test_post_then_get() {
        let mock = MockBackend::new();
        mock.post("/roles", &json!({"key": "ops", "name": "Ops"})).unwrap();
        let role = mock.get("/roles/ops").unwrap();
        assert_eq!(role["name"], "Ops");
        assert_eq!(role["_version"], 1);
    }

    #[test]
    fn test_post_conflict() {
        let mock = MockBackend::new();
        mock.post("/roles", &json!({"key": "ops"})).unwrap();
        let err = mock.post("/roles", &json!({"key": "ops"})).unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn test_post_without_key_generates_id() {
        let mock = MockBackend::new();
        let hook = mock.post("/webhooks", &json!({"url": "https://example.com"})).unwrap();
        let id = hook["_id"].as_str().unwrap();
        assert!(mock.entity(&format!("/webhooks/{id}")).is_some());
    }

    #[test]
    fn test_patch_applies_in_order_and_bumps_version() {
        let mock = MockBackend::new();
        mock.insert("/roles/ops", json!({"key": "ops", "tags": ["a"], "_version": 3}));
        let req = build(
            vec![
                PatchOperation::add("/tags/1", "b"),
                PatchOperation::replace("/name", "Ops"),
            ],
            None,
        );
        let err = mock
            .patch("/roles/ops", &serde_json::to_value(&req).unwrap())
            .unwrap_err();
        // replace on a missing field is rejected, nothing is applied
        assert!(matches!(err, Error::Api { status: 400, .. }));
        assert_eq!(mock.entity("/roles/ops").unwrap()["tags"], json!(["a"]));

        let req = build(
            vec![PatchOperation::add("/tags/1", "b"), PatchOperation::add("/name", "Ops")],
            None,
        );
        let updated = mock
            .patch("/roles/ops", &serde_json::to_value(&req).unwrap())
            .unwrap();
        assert_eq!(updated["tags"], json!(["a", "b"]));
        assert_eq!(updated["_version"], 4);
    }

    #[test]
    fn test_collection_listing() {
        let mock = MockBackend::new();
        assert_eq!(mock.get("/segments/web/prod").unwrap(), json!({"items": []}));
        mock.insert("/segments/web/prod/beta", json!({"key": "beta"}));
        mock.insert("/segments/web/prod/beta/extra", json!({"key": "nested"}));
        assert_eq!(
            mock.get("/segments/web/prod").unwrap(),
            json!({"items": [{"key": "beta"}]})
        );
        assert!(matches!(mock.get("/segments/web/prod/alpha"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_project_post_seeds_environments_and_flags() {
        let mock = MockBackend::new();
        mock.post(
            "/projects",
            &json!({"key": "web", "name": "Web", "environments": [{"key": "prod", "name": "Production", "color": "ff0000"}]}),
        )
        .unwrap();
        assert!(mock.entity("/projects/web/environments/prod").is_some());

        let flag = mock
            .post("/flags/web", &json!({"key": "search", "variations": [{"value": true}, {"value": false}]}))
            .unwrap();
        assert_eq!(flag["environments"]["prod"]["on"], false);
        assert_eq!(flag["environments"]["prod"]["offVariation"], 1);
    }

    #[test]
    fn test_copy_flag() {
        let mock = MockBackend::new();
        mock.insert(
            "/flags/web/search",
            json!({"key": "search", "environments": {"dev": {"on": true}, "prod": {"on": false}}}),
        );
        let flag = mock
            .post(
                "/flags/web/search/copy",
                &json!({"source": {"key": "dev"}, "target": {"key": "prod"}}),
            )
            .unwrap();
        assert_eq!(flag["environments"]["prod"]["on"], true);
    }

    #[test]
    fn test_delete_and_scripted_failure() {
        let mock = MockBackend::new();
        mock.insert("/projects/web", json!({"key": "web"}));
        mock.insert("/projects/web/environments/prod", json!({"key": "prod"}));

        mock.fail_next_on(Method::Delete, Error::Other("boom".into()));
        assert!(mock.get("/projects/web").is_ok());
        assert!(mock.delete("/projects/web").is_err());

        mock.delete("/projects/web").unwrap();
        assert!(mock.entity("/projects/web/environments/prod").is_none());
        assert!(matches!(mock.delete("/projects/web"), Err(Error::NotFound { .. })));
        assert_eq!(mock.mutations().len(), 3);
    }

    #[test]
    fn test_query_string_ignored() {
        let mock = MockBackend::new();
        mock.insert("/flags/web/search", json!({"key": "search"}));
        assert!(mock.get("/flags/web/search?env=prod").is_ok());
        assert_eq!(mock.calls(), vec!["GET /flags/web/search?env=prod"]);
    }
}
