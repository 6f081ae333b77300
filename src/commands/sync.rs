//! Copy configuration between environments
//!
//! Flags go through the server's copy endpoint. Segments have no such
//! endpoint: they are created in each target environment, or patched to
//! match when they already exist there.

use anyhow::Result;
use colored::Colorize;
use declarative::patch;
use declarative::{PatchOperation, PatchPath};
use flagapi::{CopyAction, CopyFlagRequest};
use serde_json::{Value, json};
use std::collections::BTreeSet;

use super::{api_client, without_ids};
use crate::Context;
use crate::cli::{FlagSyncArgs, SegmentPart, SegmentSyncArgs};
use crate::resource::SharedClient;
use crate::ui;

/// What syncing one target environment did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    /// Existing entity patched with this many operations
    Updated(usize),
    Unchanged,
}

impl SyncOutcome {
    fn label(&self) -> String {
        match self {
            Self::Created => "created".green().to_string(),
            Self::Updated(n) => format!("{} ({n} patch operation(s))", "updated".yellow()),
            Self::Unchanged => "up to date".dimmed().to_string(),
        }
    }
}

// ============================================================================
// Flags
// ============================================================================

pub fn flag(ctx: &Context, args: &FlagSyncArgs) -> Result<()> {
    let client = api_client(ctx)?;
    if !ctx.quiet {
        ui::header(&format!("Sync flag {}/{}", args.project, args.flag));
    }

    for request in copy_requests(args) {
        let target = request.target.key.clone();
        client.copy_flag(&args.project, &args.flag, &request)?;
        ui::success(&format!("{} → {}", args.from, target));
    }
    Ok(())
}

/// One copy request per target environment
fn copy_requests(args: &FlagSyncArgs) -> Vec<CopyFlagRequest> {
    let actions = |parts: &[crate::cli::FlagPart]| -> Option<Vec<CopyAction>> {
        (!parts.is_empty()).then(|| parts.iter().copied().map(CopyAction::from).collect())
    };
    args.to
        .iter()
        .filter(|target| **target != args.from)
        .map(|target| {
            let mut request = CopyFlagRequest::new(&args.from, target);
            request.comment = args.comment.clone();
            request.included_actions = actions(&args.include);
            request.excluded_actions = actions(&args.exclude);
            request
        })
        .collect()
}

// ============================================================================
// Segments
// ============================================================================

pub fn segment(ctx: &Context, args: &SegmentSyncArgs) -> Result<()> {
    let client = api_client(ctx)?;
    if !ctx.quiet {
        ui::header(&format!("Sync segment {}/{}", args.project, args.segment));
    }

    for (env, outcome) in sync_segment(&client, args)? {
        println!("  {} {:<24} {}", "✓".green(), env, outcome.label());
    }
    Ok(())
}

fn copies(args: &SegmentSyncArgs, part: SegmentPart) -> bool {
    (args.include.is_empty() || args.include.contains(&part)) && !args.exclude.contains(&part)
}

pub fn sync_segment(client: &SharedClient, args: &SegmentSyncArgs) -> Result<Vec<(String, SyncOutcome)>> {
    let source = client
        .get_segment(&args.project, &args.from, &args.segment)
        .map_err(|e| match e {
            flagapi::Error::NotFound { .. } => declarative::Error::missing(format!(
                "Segment {} in {}/{}",
                args.segment, args.project, args.from
            ))
            .into(),
            other => anyhow::Error::from(other),
        })?;

    let mut outcomes = Vec::new();
    for env in args.to.iter().filter(|env| **env != args.from) {
        let (remote, mut patches, created) =
            match client.create_segment(&args.project, env, &segment_body(&source)) {
                Ok(entity) => (entity, Vec::new(), true),
                Err(flagapi::Error::Conflict { .. }) => {
                    log::debug!("segment {} exists in {}; updating", args.segment, env);
                    let remote = client.get_segment(&args.project, env, &args.segment)?;
                    let patches = metadata_patches(&source, &remote);
                    (remote, patches, false)
                }
                Err(e) => return Err(e.into()),
            };

        if copies(args, SegmentPart::Targets) {
            for field in ["included", "excluded"] {
                if string_set(source.get(field)) != string_set(remote.get(field)) {
                    patches.push(set(&remote, field, source.get(field).cloned().unwrap_or_else(|| json!([]))));
                }
            }
        }
        if copies(args, SegmentPart::Rules) {
            let rules = without_ids(source.get("rules").unwrap_or(&json!([])));
            let current = without_ids(remote.get("rules").unwrap_or(&json!([])));
            if rules != current {
                patches.push(set(&remote, "rules", rules));
            }
        }

        let count = patches.len();
        if count > 0 {
            client.patch_segment(&args.project, env, &args.segment, &patch::build(patches, None))?;
        }
        let outcome = match (created, count) {
            (true, _) => SyncOutcome::Created,
            (false, 0) => SyncOutcome::Unchanged,
            (false, n) => SyncOutcome::Updated(n),
        };
        outcomes.push((env.clone(), outcome));
    }
    Ok(outcomes)
}

fn segment_body(source: &Value) -> Value {
    let mut body = json!({
        "key": source["key"],
        "name": source.get("name").filter(|n| !n.is_null()).unwrap_or(&source["key"]),
    });
    for field in ["description", "tags"] {
        if let Some(value) = source.get(field).filter(|v| !v.is_null()) {
            body[field] = value.clone();
        }
    }
    body
}

/// Name, description and tags of an existing segment
fn metadata_patches(source: &Value, remote: &Value) -> Vec<PatchOperation> {
    let mut patches = Vec::new();
    for field in ["name", "description"] {
        if let Some(value) = source.get(field).filter(|v| !v.is_null())
            && remote.get(field) != Some(value)
        {
            patches.push(set(remote, field, value.clone()));
        }
    }
    if let Some(tags) = source.get("tags").filter(|v| !v.is_null())
        && string_set(Some(tags)) != string_set(remote.get("tags"))
    {
        patches.push(set(remote, "tags", tags.clone()));
    }
    patches
}

fn set(remote: &Value, field: &str, value: Value) -> PatchOperation {
    PatchOperation::set(
        PatchPath::field(field).as_str(),
        value,
        remote.get(field).is_some(),
    )
}

fn string_set(value: Option<&Value>) -> BTreeSet<String> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}
