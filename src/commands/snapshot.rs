//! Project snapshots
//!
//! A snapshot holds a project with its environments, every flag with all of
//! its environment configurations, and the segments of each environment.
//! Restoring replays it into a new project key through the same client
//! primitives `apply` uses.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use declarative::patch;
use declarative::{PatchOperation, PatchPath};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{api_client, without_ids};
use crate::Context;
use crate::cli::{RestoreArgs, SnapshotArgs};
use crate::progress;
use crate::resource::SharedClient;
use crate::ui;

/// Environment settings set after creation when switched on
const ENV_SWITCHES: [&str; 4] = [
    "secureMode",
    "defaultTrackEvents",
    "requireComments",
    "confirmChanges",
];

/// Flag environment fields replaced on restore, in this order
const FLAG_ENV_FIELDS: [&str; 6] = [
    "on",
    "targets",
    "offVariation",
    "trackEvents",
    "prerequisites",
    "fallthrough",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Project entity with an `environments` array
    pub project: Value,
    #[serde(default)]
    pub feature_flags: Vec<Value>,
    /// Segments keyed by environment
    #[serde(default)]
    pub segments: BTreeMap<String, Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn project_key(&self) -> Option<&str> {
        self.project.get("key").and_then(Value::as_str)
    }

    fn environments(&self) -> &[Value] {
        self.project
            .get("environments")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Keep only flags carrying at least one of `tags`; no tags keeps all
    pub fn retain_tagged(&mut self, tags: &[String]) {
        if tags.is_empty() {
            return;
        }
        self.feature_flags.retain(|flag| {
            flag.get("tags")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .any(|tag| tags.iter().any(|t| t == tag))
        });
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read snapshot: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid snapshot {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Could not write snapshot: {}", path.display()))
    }
}

/// How much of a snapshot a restore replays
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Project name (default: the snapshot's)
    pub name: Option<String>,
    /// Environments, their segments and flag targeting; flags alone otherwise
    pub environments: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            name: None,
            environments: true,
        }
    }
}

/// Counts of what a restore created
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub environments: usize,
    pub segments: usize,
    pub flags: usize,
}

// ============================================================================
// Commands
// ============================================================================

pub fn snapshot(ctx: &Context, args: &SnapshotArgs) -> Result<()> {
    let client = api_client(ctx)?;

    let pb = progress::spinner(&format!("Fetching project {}...", args.project));
    let snapshot = match take_snapshot(&client, &args.project) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            progress::finish_error(&pb, "Snapshot failed");
            return Err(e);
        }
    };
    progress::finish_success(&pb, "Project fetched");

    let path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.project, Utc::now()));
    snapshot.save(&path)?;

    if !ctx.quiet {
        ui::kv("Environments", &snapshot.environments().len().to_string());
        ui::kv("Flags", &snapshot.feature_flags.len().to_string());
        ui::kv(
            "Segments",
            &snapshot.segments.values().map(Vec::len).sum::<usize>().to_string(),
        );
    }
    ui::success(&format!("Snapshot written to {}", path.display()));
    Ok(())
}

pub fn restore(ctx: &Context, args: &RestoreArgs) -> Result<()> {
    let snapshot = Snapshot::load(&args.file)?;
    let project = args
        .project
        .as_deref()
        .or_else(|| snapshot.project_key())
        .context("Snapshot has no project key; pass --project")?
        .to_string();
    crate::schema::validate_key("project", &project)?;

    let client = api_client(ctx)?;
    if !ctx.quiet {
        ui::dim(&format!("Restoring from {}", args.file.display()));
    }
    let pb = progress::spinner(&format!("Restoring into project {project}..."));
    let report = match restore_snapshot(&client, &snapshot, &project, &RestoreOptions::default()) {
        Ok(report) => report,
        Err(e) => {
            progress::finish_error(&pb, "Restore failed");
            return Err(e);
        }
    };
    progress::finish_success(&pb, &format!("Project {project} restored"));

    if !ctx.quiet {
        report.print();
    }
    Ok(())
}

impl RestoreReport {
    pub fn print(&self) {
        ui::kv("Environments", &self.environments.to_string());
        ui::kv("Flags", &self.flags.to_string());
        ui::kv("Segments", &self.segments.to_string());
    }
}

fn default_output(project: &str, now: DateTime<Utc>) -> PathBuf {
    PathBuf::from(format!("{project}-{}.json", now.format("%Y%m%d-%H%M%S")))
}

// ============================================================================
// Snapshot
// ============================================================================

pub fn take_snapshot(client: &SharedClient, project: &str) -> Result<Snapshot> {
    let mut entity = client
        .get_project(project)
        .with_context(|| format!("Could not fetch project {project}"))?;
    let environments = client.list_environments(project)?;
    entity["environments"] = Value::Array(environments.clone());

    let mut feature_flags = Vec::new();
    for summary in client.list_flags(project)? {
        let Some(key) = summary.get("key").and_then(Value::as_str) else {
            continue;
        };
        log::debug!("snapshot: flag {}", key);
        feature_flags.push(client.get_flag(project, key, None)?);
    }

    let mut segments = BTreeMap::new();
    for env in &environments {
        let Some(env_key) = env.get("key").and_then(Value::as_str) else {
            continue;
        };
        segments.insert(env_key.to_string(), client.list_segments(project, env_key)?);
    }

    Ok(Snapshot {
        project: entity,
        feature_flags,
        segments,
        created_at: Some(Utc::now()),
    })
}

// ============================================================================
// Restore
// ============================================================================

pub fn restore_snapshot(
    client: &SharedClient,
    snapshot: &Snapshot,
    project: &str,
    opts: &RestoreOptions,
) -> Result<RestoreReport> {
    let mut report = RestoreReport::default();

    client
        .create_project(&project_body(snapshot, project, opts))
        .with_context(|| format!("Could not create project {project}"))?;

    if opts.environments {
        for env in snapshot.environments() {
            let Some(env_key) = env.get("key").and_then(Value::as_str) else {
                continue;
            };
            report.environments += 1;
            let patches = environment_patches(env);
            if !patches.is_empty() {
                client
                    .patch_environment(project, env_key, &patch::build(patches, None))
                    .with_context(|| format!("Could not patch environment {env_key}"))?;
            }
        }

        for (env_key, segments) in &snapshot.segments {
            for segment in segments {
                restore_segment(client, project, env_key, segment)?;
                report.segments += 1;
            }
        }
    }

    // Create every flag before touching targeting, so prerequisites resolve
    for flag in &snapshot.feature_flags {
        client
            .create_flag(project, &flag_body(flag))
            .with_context(|| format!("Could not create flag {}", key_of(flag)))?;
        report.flags += 1;
    }
    let targeted: &[Value] = if opts.environments { &snapshot.feature_flags } else { &[] };
    for flag in targeted {
        let patches = flag_environment_patches(flag);
        if !patches.is_empty() {
            client
                .patch_flag(project, key_of(flag), &patch::build(patches, None))
                .with_context(|| format!("Could not restore targeting of flag {}", key_of(flag)))?;
        }
    }

    Ok(report)
}

fn key_of(entity: &Value) -> &str {
    entity.get("key").and_then(Value::as_str).unwrap_or_default()
}

fn project_body(snapshot: &Snapshot, project: &str, opts: &RestoreOptions) -> Value {
    let source = &snapshot.project;
    let name = opts
        .name
        .as_deref()
        .or_else(|| source.get("name").and_then(Value::as_str))
        .unwrap_or(project);
    let mut body = json!({
        "key": project,
        "name": name,
        "tags": source.get("tags").cloned().unwrap_or_else(|| json!([])),
    });
    if opts.environments {
        let environments: Vec<Value> = snapshot
            .environments()
            .iter()
            .map(|env| {
                let mut body = pick(env, &["key", "name", "color", "defaultTtl"]);
                body.entry("name").or_insert_with(|| key_of(env).into());
                Value::Object(body)
            })
            .collect();
        body["environments"] = Value::Array(environments);
    }
    body
}

fn environment_patches(env: &Value) -> Vec<PatchOperation> {
    let mut patches = Vec::new();
    if let Some(tags) = env.get("tags").filter(|t| is_non_empty(t)) {
        patches.push(PatchOperation::add("/tags", tags.clone()));
    }
    for field in ENV_SWITCHES {
        if env.get(field) == Some(&Value::Bool(true)) {
            patches.push(PatchOperation::add(PatchPath::field(field).as_str(), true));
        }
    }
    patches
}

fn restore_segment(client: &SharedClient, project: &str, env: &str, segment: &Value) -> Result<()> {
    let key = key_of(segment);
    let mut body = pick(segment, &["key", "name"]);
    body.entry("name").or_insert_with(|| key.into());
    for field in ["description", "tags"] {
        if let Some(value) = segment.get(field).filter(|v| is_non_empty(v)) {
            body.insert(field.into(), value.clone());
        }
    }
    client
        .create_segment(project, env, &Value::Object(body))
        .with_context(|| format!("Could not create segment {key} in {env}"))?;

    let mut patches = Vec::new();
    for field in ["included", "excluded", "rules"] {
        if let Some(value) = segment.get(field).filter(|v| is_non_empty(v)) {
            patches.push(PatchOperation::add(
                PatchPath::field(field).as_str(),
                without_ids(value),
            ));
        }
    }
    if !patches.is_empty() {
        client
            .patch_segment(project, env, key, &patch::build(patches, None))
            .with_context(|| format!("Could not patch segment {key} in {env}"))?;
    }
    Ok(())
}

fn flag_body(flag: &Value) -> Value {
    let mut body = pick(
        flag,
        &[
            "key",
            "name",
            "description",
            "temporary",
            "tags",
            "includeInSnippet",
            "clientSideAvailability",
        ],
    );
    if let Some(variations) = flag.get("variations") {
        body.insert("variations".into(), without_ids(variations));
    }
    if let Some(defaults) = flag.get("defaults").filter(|d| d.is_object()) {
        body.insert("defaults".into(), defaults.clone());
    }
    Value::Object(body)
}

fn flag_environment_patches(flag: &Value) -> Vec<PatchOperation> {
    let Some(environments) = flag.get("environments").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut patches = Vec::new();
    for (env_key, config) in environments {
        let base = PatchPath::field("environments").push(env_key);
        for field in FLAG_ENV_FIELDS {
            if let Some(value) = config.get(field).filter(|v| !v.is_null()) {
                patches.push(PatchOperation::replace(
                    base.push(field).as_str(),
                    without_ids(value),
                ));
            }
        }

        let rules = config.get("rules").and_then(Value::as_array);
        for rule in rules.into_iter().flatten() {
            let mut restored = pick(rule, &["clauses", "variation", "rollout"]);
            restored.retain(|_, v| !v.is_null());
            patches.push(PatchOperation::add(
                base.push("rules").push("-").as_str(),
                without_ids(&Value::Object(restored)),
            ));
        }
    }
    patches
}

/// Copy the named, present, non-null fields of an object
fn pick(entity: &Value, fields: &[&str]) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|field| {
            let value = entity.get(*field).filter(|v| !v.is_null())?;
            Some(((*field).to_string(), value.clone()))
        })
        .collect()
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::mock_client;
    use chrono::TimeZone;
    use flagapi::backend::MockBackend;
    use tempfile::TempDir;

    fn source() -> MockBackend {
        let mock = MockBackend::new();
        mock.insert(
            "/projects/web",
            json!({"key": "web", "name": "Web", "tags": ["team"], "_version": 3}),
        );
        mock.insert(
            "/projects/web/environments/production",
            json!({"key": "production", "name": "Production", "color": "ff0000",
                   "defaultTtl": 0, "secureMode": true, "requireComments": false, "tags": []}),
        );
        mock.insert(
            "/projects/web/environments/staging",
            json!({"key": "staging", "name": "Staging", "color": "00ff00", "defaultTtl": 5}),
        );
        mock.insert(
            "/flags/web/search",
            json!({
                "key": "search", "name": "Search", "temporary": false, "tags": [],
                "variations": [{"_id": "v0", "value": true}, {"_id": "v1", "value": false}],
                "environments": {
                    "production": {
                        "on": true, "offVariation": 1, "trackEvents": false,
                        "targets": [{"values": ["alice"], "variation": 0}],
                        "rules": [{"_id": "r0", "variation": 0, "rollout": null,
                                   "clauses": [{"_id": "c0", "attribute": "country", "op": "in",
                                                "values": ["br"], "negate": false}]}],
                        "prerequisites": [], "fallthrough": {"variation": 1}
                    }
                }
            }),
        );
        mock.insert(
            "/segments/web/staging/beta",
            json!({"key": "beta", "name": "Beta", "description": "", "tags": [],
                   "included": ["bob"], "excluded": [], "rules": []}),
        );
        mock
    }

    #[test]
    fn test_take_snapshot() {
        let mock = source();
        let snapshot = take_snapshot(&mock_client(&mock), "web").unwrap();

        assert_eq!(snapshot.project_key(), Some("web"));
        assert_eq!(snapshot.environments().len(), 2);
        assert_eq!(snapshot.feature_flags.len(), 1);
        assert_eq!(snapshot.feature_flags[0]["environments"]["production"]["on"], true);
        assert_eq!(snapshot.segments["staging"].len(), 1);
        assert!(snapshot.segments["production"].is_empty());
        assert!(mock.mutations().is_empty());
    }

    #[test]
    fn test_restore_into_new_project() {
        let snapshot = take_snapshot(&mock_client(&source()), "web").unwrap();
        let target = MockBackend::new();

        let report =
            restore_snapshot(&mock_client(&target), &snapshot, "web-copy", &RestoreOptions::default()).unwrap();
        assert_eq!(
            report,
            RestoreReport {
                environments: 2,
                segments: 1,
                flags: 1
            }
        );

        let project = target.entity("/projects/web-copy").unwrap();
        assert_eq!(project["name"], "Web");
        assert_eq!(project["tags"], json!(["team"]));

        let production = target.entity("/projects/web-copy/environments/production").unwrap();
        assert_eq!(production["secureMode"], true);
        assert!(production.get("requireComments").is_none());

        let segment = target.entity("/segments/web-copy/staging/beta").unwrap();
        assert_eq!(segment["included"], json!(["bob"]));

        let flag = target.entity("/flags/web-copy/search").unwrap();
        assert_eq!(flag["variations"], json!([{"value": true}, {"value": false}]));
        let env = &flag["environments"]["production"];
        assert_eq!(env["on"], true);
        assert_eq!(env["targets"], json!([{"values": ["alice"], "variation": 0}]));
        assert_eq!(
            env["rules"],
            json!([{"variation": 0, "clauses": [
                {"attribute": "country", "op": "in", "values": ["br"], "negate": false}
            ]}])
        );
    }

    #[test]
    fn test_restore_existing_project_fails() {
        let snapshot = take_snapshot(&mock_client(&source()), "web").unwrap();
        let target = source();
        let err = restore_snapshot(&mock_client(&target), &snapshot, "web", &RestoreOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("Could not create project web"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("web.json");
        let snapshot = take_snapshot(&mock_client(&source()), "web").unwrap();
        snapshot.save(&path).unwrap();

        let loaded = Snapshot::load(&path).unwrap();
        assert_eq!(loaded.project_key(), Some("web"));
        assert_eq!(loaded.feature_flags, snapshot.feature_flags);
        assert!(loaded.created_at.is_some());
    }

    #[test]
    fn test_default_output_name() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(default_output("web", now), PathBuf::from("web-20260314-092653.json"));
    }

    #[test]
    fn test_environment_patches_only_switches_on() {
        let env = json!({"key": "qa", "tags": ["ci"], "secureMode": false, "confirmChanges": true});
        let patches = environment_patches(&env);
        let paths: Vec<&str> = patches.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["/tags", "/confirmChanges"]);
    }

    #[test]
    fn test_restore_without_environments() {
        let snapshot = take_snapshot(&mock_client(&source()), "web").unwrap();
        let target = MockBackend::new();
        let opts = RestoreOptions {
            name: Some("Web (copy)".into()),
            environments: false,
        };

        let report = restore_snapshot(&mock_client(&target), &snapshot, "web-copy", &opts).unwrap();
        assert_eq!(
            report,
            RestoreReport {
                environments: 0,
                segments: 0,
                flags: 1
            }
        );
        assert_eq!(target.entity("/projects/web-copy").unwrap()["name"], "Web (copy)");
        assert!(target.entity("/projects/web-copy/environments/production").is_none());
        assert_eq!(target.mutations(), vec!["POST /projects", "POST /flags/web-copy"]);
    }

    #[test]
    fn test_retain_tagged() {
        let mut snapshot = take_snapshot(&mock_client(&source()), "web").unwrap();
        snapshot.feature_flags.push(json!({"key": "checkout", "tags": ["payments", "web"]}));

        snapshot.retain_tagged(&[]);
        assert_eq!(snapshot.feature_flags.len(), 2);

        snapshot.retain_tagged(&["payments".to_string(), "mobile".to_string()]);
        let keys: Vec<&str> = snapshot.feature_flags.iter().map(key_of).collect();
        assert_eq!(keys, vec!["checkout"]);
    }
}
