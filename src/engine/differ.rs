//! Plan preview and display

use colored::Colorize;
use declarative::{
    ExecutionPlan, PatchOp, PlannedAction, ReconcileOptions, Resource, apply_patch, preview,
};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};

use crate::ui;

/// Keys dropped from entities before they are shown side by side
const NOISE: [&str; 5] = ["_links", "_version", "_id", "_creationDate", "_maintainer"];

/// What reconciling one resource would do, with the remote entity it saw
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    pub id: String,
    pub resource_type: &'static str,
    pub description: String,
    pub action: PlannedAction,
    pub remote: Option<Value>,
}

impl ResourceDiff {
    pub fn from_resource(resource: &dyn Resource, opts: &ReconcileOptions) -> anyhow::Result<Self> {
        let (action, remote) = preview(resource, opts)?;
        Ok(Self {
            id: resource.id(),
            resource_type: resource.resource_type(),
            description: resource.description(),
            action,
            remote,
        })
    }

    /// Remote entity with the planned patches applied
    pub fn patched(&self) -> Option<Value> {
        let PlannedAction::Update(patches) = &self.action else {
            return None;
        };
        let mut doc = self.remote.clone()?;
        apply_patch(&mut doc, patches).ok()?;
        Some(doc)
    }

    /// Changed lines between the remote entity and its patched form
    pub fn value_lines(&self) -> Vec<(ChangeTag, String)> {
        let (Some(before), Some(after)) = (self.remote.as_ref(), self.patched()) else {
            return Vec::new();
        };
        let before = ui::pretty(&strip_noise(before));
        let after = ui::pretty(&strip_noise(&after));
        TextDiff::from_lines(&before, &after)
            .iter_all_changes()
            .filter(|change| change.tag() != ChangeTag::Equal)
            .map(|change| (change.tag(), change.to_string_lossy().trim_end().to_string()))
            .collect()
    }
}

fn strip_noise(value: &Value) -> Value {
    let mut value = value.clone();
    if let Some(obj) = value.as_object_mut() {
        for key in NOISE {
            obj.remove(key);
        }
    }
    value
}

/// Preview every resource of the plan; failures are reported per resource
pub fn compute_diffs(
    plan: &ExecutionPlan,
    opts: &ReconcileOptions,
) -> (Vec<ResourceDiff>, Vec<(String, anyhow::Error)>) {
    let mut diffs = Vec::new();
    let mut errors = Vec::new();
    for resource in plan.iter() {
        match ResourceDiff::from_resource(resource, opts) {
            Ok(diff) => diffs.push(diff),
            Err(e) => errors.push((resource.id(), e)),
        }
    }
    (diffs, errors)
}

/// Display the planned changes
///
/// With `values`, updates also show the entity lines they change.
pub fn display_diff(diffs: &[ResourceDiff], values: bool) {
    let changes: Vec<&ResourceDiff> = diffs.iter().filter(|d| d.action.is_change()).collect();
    if changes.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    let mut current_type = "";
    for diff in &changes {
        if diff.resource_type != current_type {
            current_type = diff.resource_type;
            ui::section(type_title(current_type));
        }

        let detail = match &diff.action {
            PlannedAction::Create => "(will create)".to_string(),
            PlannedAction::Delete if diff.resource_type == "flag_environment" => {
                "(will reset targeting)".to_string()
            }
            PlannedAction::Delete => "(will remove)".to_string(),
            PlannedAction::Update(patches) => format!("({} patch operation(s))", patches.len()),
            PlannedAction::NoChange => String::new(),
        };
        println!(
            "  {} {:<40} {}",
            ui::action_symbol(&diff.action),
            diff.id,
            detail.dimmed()
        );

        if let PlannedAction::Update(patches) = &diff.action {
            for patch in patches {
                let line = match patch.op {
                    PatchOp::Remove => format!("{} {}", patch.op, patch.path),
                    _ => format!("{} {} = {}", patch.op, patch.path, ui::compact(&patch.value, 60)),
                };
                println!("      {}", line.dimmed());
            }
            if values {
                for (tag, line) in diff.value_lines() {
                    match tag {
                        ChangeTag::Delete => println!("      {}", format!("- {line}").red()),
                        ChangeTag::Insert => println!("      {}", format!("+ {line}").green()),
                        ChangeTag::Equal => {}
                    }
                }
            }
        }
    }

    let count = |f: fn(&PlannedAction) -> bool| changes.iter().filter(|d| f(&d.action)).count();
    println!();
    println!(
        "  Plan: {} to create, {} to update, {} to remove",
        count(|a| matches!(a, PlannedAction::Create)).to_string().green(),
        count(|a| matches!(a, PlannedAction::Update(_))).to_string().yellow(),
        count(|a| matches!(a, PlannedAction::Delete)).to_string().red()
    );
}

fn type_title(resource_type: &str) -> &str {
    match resource_type {
        "project" => "Projects",
        "environment" => "Environments",
        "segment" => "Segments",
        "feature_flag" => "Feature flags",
        "flag_environment" => "Flag targeting",
        "custom_role" => "Custom roles",
        "webhook" => "Webhooks",
        other => other,
    }
}
