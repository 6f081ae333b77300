//! Manifest schema
//!
//! One TOML document declares every managed resource. Nested tables follow
//! the remote hierarchy: projects own environments, flags and segments; flags
//! own their per-environment targeting.
//!
//! Unset optional fields are left unmanaged.

use anyhow::{Context, Result};
use declarative::normalize::{
    ClauseSpec, FallthroughSpec, PrerequisiteSpec, RuleSpec, StatementSpec, TargetSpec,
    VariationSpec,
};
use declarative::{DesiredStatus, ReconcileOptions};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

/// Environment variable holding the API access token
pub const DEFAULT_TOKEN_ENV: &str = "LAUNCHDARKLY_ACCESS_TOKEN";

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("key pattern compiles"));

// ============================================================================
// Main Manifest Schema
// ============================================================================

/// The flagops manifest
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Manifest {
    /// API connection settings
    #[serde(default)]
    pub api: ApiSettings,

    /// Patch shaping options
    #[serde(default)]
    pub reconcile: ReconcileOptions,

    /// Policy-as-code check run before mutations
    #[serde(default)]
    pub policy: PolicySettings,

    /// Projects keyed by project key
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectDecl>,

    /// Custom roles keyed by role key
    #[serde(default)]
    pub roles: BTreeMap<String, RoleDecl>,

    /// Webhooks (account-wide, identified by id or url)
    #[serde(default)]
    pub webhooks: Vec<WebhookDecl>,
}

impl Manifest {
    /// Validate keys and declared values before anything reaches the API
    pub fn validate(&self) -> Result<()> {
        for (key, project) in &self.projects {
            validate_key("project", key)?;
            project
                .validate()
                .with_context(|| format!("Invalid project '{}'", key))?;
        }

        for (key, role) in &self.roles {
            validate_key("custom role", key)?;
            role.validate()
                .with_context(|| format!("Invalid custom role '{}'", key))?;
        }

        let mut seen = HashSet::new();
        for webhook in &self.webhooks {
            webhook
                .validate()
                .with_context(|| format!("Invalid webhook '{}'", webhook.url))?;
            if !seen.insert(webhook.identity()) {
                anyhow::bail!("Webhook '{}' is declared twice", webhook.url);
            }
        }

        Ok(())
    }

    /// Number of declared resources, flag environments included
    pub fn resource_count(&self) -> usize {
        let nested: usize = self
            .projects
            .values()
            .map(|p| {
                1 + p.environments.len()
                    + p.segments.len()
                    + p.flags.values().map(|f| 1 + f.environments.len()).sum::<usize>()
            })
            .sum();
        nested + self.roles.len() + self.webhooks.len()
    }
}

/// Check a resource key against the accepted character set
pub fn validate_key(what: &str, key: &str) -> Result<()> {
    if !KEY_PATTERN.is_match(key) {
        anyhow::bail!(
            "Invalid {} key '{}': use letters, digits, '.', '_' or '-'",
            what,
            key
        );
    }
    Ok(())
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiSettings {
    /// API base URL (defaults to the public endpoint)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable the access token is read from
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Comment attached to every patch batch
    #[serde(default)]
    pub comment: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            token_env: default_token_env(),
            comment: None,
        }
    }
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

/// Conftest-style policy check
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PolicySettings {
    #[serde(default)]
    pub enabled: bool,

    /// Directory holding the rego policies
    #[serde(default = "default_policy_dir")]
    pub dir: String,

    #[serde(default = "default_policy_namespace")]
    pub namespace: String,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_policy_dir(),
            namespace: default_policy_namespace(),
        }
    }
}

fn default_policy_dir() -> String {
    "policy".to_string()
}

fn default_policy_namespace() -> String {
    "launchdarkly".to_string()
}

// ============================================================================
// Projects and environments
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProjectDecl {
    #[serde(default)]
    pub state: DesiredStatus,

    /// Display name (defaults to the key at creation)
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub tags: Option<Vec<String>>,

    #[serde(default)]
    pub include_in_snippet_by_default: Option<bool>,

    /// Environments keyed by environment key
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentDecl>,

    /// Feature flags keyed by flag key
    #[serde(default)]
    pub flags: BTreeMap<String, FlagDecl>,

    /// User segments (per environment)
    #[serde(default)]
    pub segments: Vec<SegmentDecl>,
}

impl ProjectDecl {
    pub fn validate(&self) -> Result<()> {
        for (key, env) in &self.environments {
            validate_key("environment", key)?;
            env.validate()
                .with_context(|| format!("Invalid environment '{}'", key))?;
        }

        for (key, flag) in &self.flags {
            validate_key("flag", key)?;
            flag.validate()
                .with_context(|| format!("Invalid flag '{}'", key))?;
        }

        let mut seen = HashSet::new();
        for segment in &self.segments {
            validate_key("segment", &segment.key)?;
            validate_key("environment", &segment.environment)?;
            if !seen.insert((&segment.environment, &segment.key)) {
                anyhow::bail!(
                    "Segment '{}' is declared twice in environment '{}'",
                    segment.key,
                    segment.environment
                );
            }
        }

        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct EnvironmentDecl {
    #[serde(default)]
    pub state: DesiredStatus,

    #[serde(default)]
    pub name: Option<String>,

    /// Hex color without the leading '#'
    #[serde(default)]
    pub color: Option<String>,

    /// Client-side SDK cache TTL in minutes
    #[serde(default)]
    pub default_ttl: Option<u32>,

    #[serde(default)]
    pub secure_mode: Option<bool>,

    #[serde(default)]
    pub default_track_events: Option<bool>,

    #[serde(default)]
    pub tags: Option<Vec<String>>,

    #[serde(default)]
    pub confirm_changes: Option<bool>,

    #[serde(default)]
    pub require_comments: Option<bool>,
}

impl EnvironmentDecl {
    pub fn validate(&self) -> Result<()> {
        if let Some(color) = &self.color
            && (color.len() != 6 || !color.chars().all(|c| c.is_ascii_hexdigit()))
        {
            anyhow::bail!("Color '{}' is not a 6-digit hex value", color);
        }
        Ok(())
    }
}

// ============================================================================
// Feature flags
// ============================================================================

/// Value type of a flag's variations
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FlagKind {
    #[default]
    Bool,
    Str,
    Number,
    Json,
}

impl FlagKind {
    /// Whether a variation value fits this kind
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Bool => value.is_boolean(),
            Self::Str => value.is_string(),
            Self::Number => value.is_number(),
            Self::Json => value.is_object() || value.is_array(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Str => "str",
            Self::Number => "number",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct FlagDecl {
    #[serde(default)]
    pub state: DesiredStatus,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub kind: FlagKind,

    #[serde(default)]
    pub description: Option<String>,

    /// Temporary flags are expected to be removed (true at creation when unset)
    #[serde(default)]
    pub temporary: Option<bool>,

    #[serde(default)]
    pub tags: Option<Vec<String>>,

    #[serde(default)]
    pub variations: Option<Vec<VariationSpec>>,

    /// Expose the flag to client-side SDKs
    #[serde(default)]
    pub include_in_snippet: Option<bool>,

    #[serde(default)]
    pub maintainer_id: Option<String>,

    /// Targeting per environment, keyed by environment key
    #[serde(default)]
    pub environments: BTreeMap<String, FlagEnvironmentDecl>,
}

impl FlagDecl {
    pub fn validate(&self) -> Result<()> {
        if let Some(variations) = &self.variations {
            for (i, variation) in variations.iter().enumerate() {
                if let Some(value) = &variation.value
                    && !self.kind.accepts(value)
                {
                    anyhow::bail!(
                        "Variation {} value {} is not a {} value",
                        i,
                        value,
                        self.kind.as_str()
                    );
                }
            }
        } else if self.kind != FlagKind::Bool && self.state.is_present() {
            anyhow::bail!("Flags of kind '{}' need variations", self.kind.as_str());
        }

        let variation_count = self.variations.as_ref().map_or(2, Vec::len);
        for (key, env) in &self.environments {
            validate_key("environment", key)?;
            env.validate(variation_count)
                .with_context(|| format!("Invalid targeting for environment '{}'", key))?;
        }

        Ok(())
    }
}

/// A flag's targeting in one environment
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct FlagEnvironmentDecl {
    /// `enabled`/`disabled` drive the toggle; `absent` resets targeting
    #[serde(default)]
    pub state: DesiredStatus,

    #[serde(default)]
    pub off_variation: Option<usize>,

    #[serde(default)]
    pub track_events: Option<bool>,

    #[serde(default)]
    pub targets: Option<Vec<TargetSpec>>,

    #[serde(default)]
    pub rules: Option<Vec<RuleSpec>>,

    #[serde(default)]
    pub fallthrough: Option<FallthroughSpec>,

    #[serde(default)]
    pub prerequisites: Option<Vec<PrerequisiteSpec>>,
}

impl FlagEnvironmentDecl {
    pub fn validate(&self, variation_count: usize) -> Result<()> {
        let check = |what: &str, index: usize| {
            if index >= variation_count {
                anyhow::bail!(
                    "{} refers to variation {} but the flag has {}",
                    what,
                    index,
                    variation_count
                );
            }
            Ok(())
        };

        if let Some(off) = self.off_variation {
            check("off_variation", off)?;
        }
        for target in self.targets.iter().flatten() {
            check("Target", target.variation)?;
        }
        for rule in self.rules.iter().flatten() {
            if rule.variation.is_some() && rule.rollout.is_some() {
                anyhow::bail!("A rule serves either a variation or a rollout, not both");
            }
            if let Some(v) = rule.variation {
                check("Rule", v)?;
            }
        }
        if let Some(fallthrough) = &self.fallthrough {
            if fallthrough.variation.is_some() && fallthrough.rollout.is_some() {
                anyhow::bail!("Fallthrough serves either a variation or a rollout, not both");
            }
            if let Some(v) = fallthrough.variation {
                check("Fallthrough", v)?;
            }
        }
        for prerequisite in self.prerequisites.iter().flatten() {
            validate_key("prerequisite flag", &prerequisite.key)?;
        }
        Ok(())
    }
}

// ============================================================================
// User segments
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SegmentDecl {
    pub key: String,

    /// Environment the segment lives in
    pub environment: String,

    #[serde(default)]
    pub state: DesiredStatus,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tags: Option<Vec<String>>,

    /// User keys always in the segment
    #[serde(default)]
    pub included: Option<Vec<String>>,

    /// User keys never in the segment
    #[serde(default)]
    pub excluded: Option<Vec<String>>,

    #[serde(default)]
    pub rules: Option<Vec<SegmentRuleDecl>>,
}

/// Segment membership rule
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SegmentRuleDecl {
    #[serde(default)]
    pub clauses: Vec<ClauseSpec>,

    /// Percentage of matching users, in thousandths of a percent
    #[serde(default)]
    pub weight: Option<u64>,

    #[serde(default)]
    pub bucket_by: Option<String>,
}

// ============================================================================
// Custom roles and webhooks
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RoleDecl {
    #[serde(default)]
    pub state: DesiredStatus,

    /// Display name (defaults to the key at creation)
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default, alias = "statements")]
    pub policy: Option<Vec<StatementSpec>>,
}

impl RoleDecl {
    pub fn validate(&self) -> Result<()> {
        if self.state.is_present() && self.policy.as_ref().is_none_or(Vec::is_empty) {
            anyhow::bail!("Custom roles need at least one policy statement");
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct WebhookDecl {
    /// Remote id; when unset the webhook is matched by url
    #[serde(default)]
    pub id: Option<String>,

    pub url: String,

    /// `enabled`/`disabled` switch delivery on and off
    #[serde(default)]
    pub state: DesiredStatus,

    /// Display name (defaults to the url at creation)
    #[serde(default)]
    pub name: Option<String>,

    /// Sign payloads with `secret`
    #[serde(default)]
    pub sign: bool,

    /// Signing secret, only sent at creation
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default)]
    pub tags: Option<Vec<String>>,

    #[serde(default)]
    pub statements: Option<Vec<StatementSpec>>,
}

impl WebhookDecl {
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            anyhow::bail!("Webhook url cannot be empty");
        }
        if !(self.url.starts_with("https://") || self.url.starts_with("http://")) {
            anyhow::bail!("Webhook url '{}' must be http(s)", self.url);
        }
        if let Some(id) = &self.id {
            validate_key("webhook", id)?;
        }
        if self.sign && self.secret.is_none() && self.state.is_present() && self.id.is_none() {
            log::warn!("webhook {} is signed but has no secret; the server will generate one", self.url);
        }
        Ok(())
    }

    /// Id when declared, url otherwise
    pub fn identity(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.url)
    }
}

// ============================================================================
// Tests
// ============================================================================
