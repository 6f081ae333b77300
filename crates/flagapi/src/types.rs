//! Request bodies and connection settings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://app.launchdarkly.com/api/v2";

/// Base URL of the endpoint serving an environment's full flag data to SDKs.
pub const DEFAULT_SDK_BASE_URL: &str = "https://app.launchdarkly.com";

/// Connection settings for [`crate::HttpBackend`].
#[derive(Clone)]
pub struct ApiConfig {
    pub base_url: String,
    /// Access token sent verbatim in the `Authorization` header
    pub token: String,
}

impl ApiConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
        }
    }

    /// Settings for the SDK data endpoint, authenticated with an SDK key
    pub fn sdk(sdk_key: impl Into<String>) -> Self {
        Self::new(sdk_key).with_base_url(DEFAULT_SDK_BASE_URL)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Parts of a flag's environment configuration a copy may carry over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CopyAction {
    UpdateOn,
    UpdatePrerequisites,
    UpdateTargets,
    UpdateRules,
    UpdateFallthrough,
    UpdateOffVariation,
}

impl CopyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpdateOn => "updateOn",
            Self::UpdatePrerequisites => "updatePrerequisites",
            Self::UpdateTargets => "updateTargets",
            Self::UpdateRules => "updateRules",
            Self::UpdateFallthrough => "updateFallthrough",
            Self::UpdateOffVariation => "updateOffVariation",
        }
    }
}

impl fmt::Display for CopyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRef {
    pub key: String,
}

/// Body of the flag copy endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyFlagRequest {
    pub source: EnvironmentRef,
    pub target: EnvironmentRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included_actions: Option<Vec<CopyAction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_actions: Option<Vec<CopyAction>>,
}

impl CopyFlagRequest {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: EnvironmentRef { key: source.into() },
            target: EnvironmentRef { key: target.into() },
            comment: None,
            included_actions: None,
            excluded_actions: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_copy_request_shape() {
        let mut req = CopyFlagRequest::new("staging", "prod");
        req.included_actions = Some(vec![CopyAction::UpdateOn, CopyAction::UpdateRules]);
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "source": {"key": "staging"},
                "target": {"key": "prod"},
                "includedActions": ["updateOn", "updateRules"]
            })
        );
    }

    #[test]
    fn test_config_debug_hides_token() {
        let cfg = ApiConfig::new("api-secret");
        assert!(!format!("{cfg:?}").contains("api-secret"));
    }
}
