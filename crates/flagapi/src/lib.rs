//! # flagapi
//!
//! Blocking client for a feature-flag management REST API (projects,
//! environments, feature flags, user segments, custom roles, webhooks).
//!
//! Every call goes through the rate-limit retry: a 429 answer sleeps until
//! the `X-RateLimit-Reset` time and retries once.
//!
//! ## Example
//!
//! ```no_run
//! use flagapi::{ApiConfig, Client, OptionalExt};
//!
//! let client = Client::new(ApiConfig::new("api-123"));
//!
//! match client.get_flag("web", "search", None).optional().unwrap() {
//!     Some(flag) => println!("{} has {} variations", flag["key"], flag["variations"].as_array().map_or(0, Vec::len)),
//!     None => println!("no such flag"),
//! }
//! ```
//!
//! ## Testing
//!
//! [`backend::MockBackend`] keeps entities in memory and applies patches
//! locally, so reconciliation can be exercised end to end without a network.

pub mod backend;
pub mod endpoint;
pub mod error;
pub mod retry;
pub mod types;

pub use error::{Error, ErrorCategory, OptionalExt, Result};
pub use types::{ApiConfig, CopyAction, CopyFlagRequest, DEFAULT_BASE_URL, DEFAULT_SDK_BASE_URL};

use backend::{Backend, http::HttpBackend};
use declarative::patch::PatchRequest;
use retry::{Clock, LogCallback, SystemClock};
use serde_json::Value;
use std::fmt;

/// High-level client for the remote API.
///
/// The client wraps a backend and a clock, and routes every call through
/// [`retry::with_rate_limit_retry`].
pub struct Client {
    backend: Box<dyn Backend>,
    clock: Box<dyn Clock>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client talking to the real API.
    pub fn new(config: ApiConfig) -> Self {
        Self::with_backend(Box::new(HttpBackend::new(config)))
    }

    /// Create a client with a custom backend (useful for testing).
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            clock: Box::new(SystemClock),
        }
    }

    /// Replace the clock used for rate-limit waits.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn call<T>(&self, mut operation: impl FnMut(&dyn Backend) -> Result<T>) -> Result<T> {
        retry::with_rate_limit_retry(self.clock.as_ref(), Some(&LogCallback), || {
            operation(self.backend.as_ref())
        })
    }

    fn get(&self, path: &str) -> Result<Value> {
        self.call(|b| b.get(path))
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.call(|b| b.post(path, body))
    }

    fn patch(&self, path: &str, request: &PatchRequest) -> Result<Value> {
        let body = serde_json::to_value(request)?;
        self.call(|b| b.patch(path, &body))
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.call(|b| b.delete(path))
    }

    fn list(&self, path: &str) -> Result<Vec<Value>> {
        let page = self.get(path)?;
        match page.get("items") {
            Some(Value::Array(items)) => Ok(items.clone()),
            _ => Err(Error::InvalidResponse(format!("{path}: missing items"))),
        }
    }

    // =========================================================================
    // Projects
    // =========================================================================

    pub fn get_project(&self, project: &str) -> Result<Value> {
        self.get(&endpoint::project(project))
    }

    pub fn create_project(&self, body: &Value) -> Result<Value> {
        self.post(&endpoint::projects(), body)
    }

    pub fn patch_project(&self, project: &str, request: &PatchRequest) -> Result<Value> {
        self.patch(&endpoint::project(project), request)
    }

    pub fn delete_project(&self, project: &str) -> Result<()> {
        self.delete(&endpoint::project(project))
    }

    // =========================================================================
    // Environments
    // =========================================================================

    pub fn get_environment(&self, project: &str, env: &str) -> Result<Value> {
        self.get(&endpoint::environment(project, env))
    }

    pub fn list_environments(&self, project: &str) -> Result<Vec<Value>> {
        self.list(&endpoint::environments(project))
    }

    pub fn create_environment(&self, project: &str, body: &Value) -> Result<Value> {
        self.post(&endpoint::environments(project), body)
    }

    pub fn patch_environment(&self, project: &str, env: &str, request: &PatchRequest) -> Result<Value> {
        self.patch(&endpoint::environment(project, env), request)
    }

    pub fn delete_environment(&self, project: &str, env: &str) -> Result<()> {
        self.delete(&endpoint::environment(project, env))
    }

    // =========================================================================
    // Feature flags
    // =========================================================================

    /// Fetch a flag, optionally limited to one environment's configuration.
    pub fn get_flag(&self, project: &str, flag: &str, env: Option<&str>) -> Result<Value> {
        let path = match env {
            Some(env) => endpoint::flag_in_env(project, flag, env),
            None => endpoint::flag(project, flag),
        };
        self.get(&path)
    }

    pub fn list_flags(&self, project: &str) -> Result<Vec<Value>> {
        self.list(&endpoint::flags(project))
    }

    pub fn create_flag(&self, project: &str, body: &Value) -> Result<Value> {
        self.post(&endpoint::flags(project), body)
    }

    /// Patch a flag; environment configuration lives under `/environments/<env>/...`.
    pub fn patch_flag(&self, project: &str, flag: &str, request: &PatchRequest) -> Result<Value> {
        self.patch(&endpoint::flag(project, flag), request)
    }

    pub fn delete_flag(&self, project: &str, flag: &str) -> Result<()> {
        self.delete(&endpoint::flag(project, flag))
    }

    /// Copy one environment's flag configuration onto another.
    pub fn copy_flag(&self, project: &str, flag: &str, request: &CopyFlagRequest) -> Result<Value> {
        let body = serde_json::to_value(request)?;
        self.post(&endpoint::flag_copy(project, flag), &body)
    }

    // =========================================================================
    // User segments
    // =========================================================================

    pub fn get_segment(&self, project: &str, env: &str, segment: &str) -> Result<Value> {
        self.get(&endpoint::segment(project, env, segment))
    }

    pub fn list_segments(&self, project: &str, env: &str) -> Result<Vec<Value>> {
        self.list(&endpoint::segments(project, env))
    }

    pub fn create_segment(&self, project: &str, env: &str, body: &Value) -> Result<Value> {
        self.post(&endpoint::segments(project, env), body)
    }

    pub fn patch_segment(&self, project: &str, env: &str, segment: &str, request: &PatchRequest) -> Result<Value> {
        self.patch(&endpoint::segment(project, env, segment), request)
    }

    pub fn delete_segment(&self, project: &str, env: &str, segment: &str) -> Result<()> {
        self.delete(&endpoint::segment(project, env, segment))
    }

    // =========================================================================
    // Custom roles
    // =========================================================================

    pub fn get_role(&self, role: &str) -> Result<Value> {
        self.get(&endpoint::role(role))
    }

    pub fn create_role(&self, body: &Value) -> Result<Value> {
        self.post(&endpoint::roles(), body)
    }

    pub fn patch_role(&self, role: &str, request: &PatchRequest) -> Result<Value> {
        self.patch(&endpoint::role(role), request)
    }

    pub fn delete_role(&self, role: &str) -> Result<()> {
        self.delete(&endpoint::role(role))
    }

    // =========================================================================
    // Webhooks
    // =========================================================================

    pub fn get_webhook(&self, id: &str) -> Result<Value> {
        self.get(&endpoint::webhook(id))
    }

    pub fn list_webhooks(&self) -> Result<Vec<Value>> {
        self.list(&endpoint::webhooks())
    }

    pub fn create_webhook(&self, body: &Value) -> Result<Value> {
        self.post(&endpoint::webhooks(), body)
    }

    pub fn patch_webhook(&self, id: &str, request: &PatchRequest) -> Result<Value> {
        self.patch(&endpoint::webhook(id), request)
    }

    pub fn delete_webhook(&self, id: &str) -> Result<()> {
        self.delete(&endpoint::webhook(id))
    }

    // =========================================================================
    // SDK data
    // =========================================================================

    /// Flag and segment data of one environment, as SDKs receive it.
    ///
    /// Needs a client built from [`ApiConfig::sdk`].
    pub fn get_sdk_flag_data(&self) -> Result<Value> {
        self.get(&endpoint::sdk_flag_data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::{Method, MockBackend};
    use declarative::patch::{PatchOperation, build};
    use retry::tests::FakeClock;
    use serde_json::json;
    use std::time::Duration;

    fn client(mock: &MockBackend) -> Client {
        Client::with_backend(Box::new(mock.clone())).with_clock(Box::new(FakeClock::at(1_000)))
    }

    #[test]
    fn test_get_flag_in_env_uses_query() {
        let mock = MockBackend::new();
        mock.insert("/flags/web/search", json!({"key": "search"}));
        client(&mock).get_flag("web", "search", Some("prod")).unwrap();
        assert_eq!(mock.calls(), vec!["GET /flags/web/search?env=prod"]);
    }

    #[test]
    fn test_rate_limited_call_is_retried_once() {
        let mock = MockBackend::new();
        mock.insert("/roles/ops", json!({"key": "ops", "name": "Ops"}));
        mock.fail_next(Error::RateLimited {
            reset_millis: Some(3_000),
        });

        let role = client(&mock).get_role("ops").unwrap();
        assert_eq!(role["name"], "Ops");
        assert_eq!(mock.calls().len(), 2);
    }

    #[test]
    fn test_rate_limit_sleep_uses_clock() {
        let mock = MockBackend::new();
        mock.insert("/roles/ops", json!({"key": "ops"}));
        mock.fail_next(Error::RateLimited {
            reset_millis: Some(1_000 + 2_000),
        });
        let clock = FakeClock::at(1_000);
        let result = retry::with_rate_limit_retry(&clock, None, || mock.get("/roles/ops"));
        assert!(result.is_ok());
        assert_eq!(*clock.slept.borrow(), vec![Duration::from_secs(3)]);
    }

    #[test]
    fn test_patch_sends_comment_and_operations() {
        let mock = MockBackend::new();
        mock.insert("/projects/web", json!({"key": "web", "name": "Old"}));
        let request = build(vec![PatchOperation::replace("/name", "New")], Some("rename"));
        let project = client(&mock).patch_project("web", &request).unwrap();
        assert_eq!(project["name"], "New");
        assert_eq!(mock.mutations(), vec!["PATCH /projects/web"]);
    }

    #[test]
    fn test_not_found_is_optional() {
        let mock = MockBackend::new();
        assert_eq!(client(&mock).get_segment("web", "prod", "beta").optional().unwrap(), None);
    }

    #[test]
    fn test_second_rate_limit_fails() {
        let mock = MockBackend::new();
        mock.fail_next_on(Method::Delete, Error::RateLimited { reset_millis: None });
        mock.fail_next_on(Method::Delete, Error::RateLimited { reset_millis: None });
        let err = client(&mock).delete_webhook("abc").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::RateLimit);
    }

    #[test]
    fn test_sdk_flag_data() {
        let mock = MockBackend::new();
        mock.insert("/sdk/latest-all", json!({"flags": {}, "segments": {}}));
        let data = client(&mock).get_sdk_flag_data().unwrap();
        assert!(data["flags"].is_object());
        assert_eq!(ApiConfig::sdk("sdk-1").base_url, DEFAULT_SDK_BASE_URL);
    }

    #[test]
    fn test_list_segments() {
        let mock = MockBackend::new();
        mock.insert("/segments/web/prod/beta", json!({"key": "beta"}));
        let segments = client(&mock).list_segments("web", "prod").unwrap();
        assert_eq!(segments, vec![json!({"key": "beta"})]);
    }
}
