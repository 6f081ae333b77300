//! HTTP backend.
//!
//! Blocking JSON calls with `ureq`. Status codes are not turned into
//! transport errors; every non-2xx response is classified by
//! [`Error::from_status`] so the caller sees 404, 409 and 429 distinctly.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::ApiConfig;
use serde_json::Value;
use ureq::http::Response;

/// Header carrying the rate-limit reset time in epoch milliseconds.
pub const RATE_LIMIT_RESET_HEADER: &str = "X-RateLimit-Reset";

const USER_AGENT: &str = concat!("flagops/", env!("CARGO_PKG_VERSION"));

/// Backend talking to the real REST API.
///
/// # Example
///
/// ```no_run
/// use flagapi::backend::Backend;
/// use flagapi::backend::http::HttpBackend;
/// use flagapi::ApiConfig;
///
/// let backend = HttpBackend::new(ApiConfig::new("api-123"));
/// let project = backend.get("/projects/default").unwrap();
/// println!("{}", project["name"]);
/// ```
pub struct HttpBackend {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    config: ApiConfig,
}

impl HttpBackend {
    pub fn new(config: ApiConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent, config }
    }

    /// Get the current API base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Classify the response and decode its body.
    fn finish(path: &str, response: std::result::Result<Response<ureq::Body>, ureq::Error>) -> Result<Value> {
        let mut response = response?;
        let status = response.status().as_u16();
        let reset_millis = response
            .headers()
            .get(RATE_LIMIT_RESET_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok());
        let body = response.body_mut().read_to_string()?;

        if !(200..300).contains(&status) {
            log::debug!("{path} answered {status}");
            return Err(Error::from_status(status, path, &body, reset_millis));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

impl Backend for HttpBackend {
    fn get(&self, path: &str) -> Result<Value> {
        log::debug!("GET {path}");
        let response = self
            .agent
            .get(&self.url(path))
            .header("Authorization", self.config.token.as_str())
            .header("User-Agent", USER_AGENT)
            .call();
        Self::finish(path, response)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value> {
        log::debug!("POST {path}");
        let response = self
            .agent
            .post(&self.url(path))
            .header("Authorization", self.config.token.as_str())
            .header("User-Agent", USER_AGENT)
            .send_json(body);
        Self::finish(path, response)
    }

    fn patch(&self, path: &str, body: &Value) -> Result<Value> {
        log::debug!("PATCH {path}");
        let response = self
            .agent
            .patch(&self.url(path))
            .header("Authorization", self.config.token.as_str())
            .header("User-Agent", USER_AGENT)
            .send_json(body);
        Self::finish(path, response)
    }

    fn delete(&self, path: &str) -> Result<()> {
        log::debug!("DELETE {path}");
        let response = self
            .agent
            .delete(&self.url(path))
            .header("Authorization", self.config.token.as_str())
            .header("User-Agent", USER_AGENT)
            .call();
        Self::finish(path, response).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_and_path() {
        let backend = HttpBackend::new(ApiConfig::new("t").with_base_url("http://localhost:8080/api/v2/"));
        assert_eq!(backend.url("/projects/web"), "http://localhost:8080/api/v2/projects/web");
        assert_eq!(backend.base_url(), "http://localhost:8080/api/v2/");
    }

    #[test]
    fn test_unreachable_host_is_network_error() {
        let backend = HttpBackend::new(ApiConfig::new("t").with_base_url("http://127.0.0.1:1"));
        let err = backend.get("/projects").unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Network);
    }
}
