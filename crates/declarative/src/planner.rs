//! Execution planner - collects declared resources in apply order

use crate::resource::{BoxedResource, Resource};

/// Resources in the order they are reconciled
///
/// Parents come before children: projects, environments, flags, flag
/// environments, segments. Callers push them in that order.
#[derive(Debug, Default)]
pub struct ExecutionPlan {
    pub resources: Vec<BoxedResource>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource
    pub fn add(&mut self, resource: BoxedResource) {
        self.resources.push(resource);
    }

    /// Filter plan to only include resources matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&dyn Resource) -> bool,
    {
        Self {
            resources: self
                .resources
                .into_iter()
                .filter(|r| predicate(r.as_ref()))
                .collect(),
        }
    }

    /// Filter plan to only include resources matching a target pattern
    ///
    /// Target format: "type" or "type.key"
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (resource_type, key) = parse_target(t);
                self.filter(|r| matches_filter(r, resource_type.as_deref(), key.as_deref()))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Resource> {
        self.resources.iter().map(AsRef::as_ref)
    }
}

/// Parse a target string like "type.key" into (type, key)
///
/// Keys may themselves contain dots, so only the first one splits.
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        None => (Some(target.to_string()), None),
        Some((kind, key)) if !kind.is_empty() && !key.is_empty() => {
            (Some(kind.to_string()), Some(key.to_string()))
        }
        Some(_) => (None, Some(target.to_string())),
    }
}

/// Check if a resource matches the filter criteria
fn matches_filter(resource: &dyn Resource, resource_type: Option<&str>, key: Option<&str>) -> bool {
    if let Some(rt) = resource_type {
        // Allow common aliases
        let wanted = match rt {
            "flags" | "flag" => "feature_flag",
            "segments" => "segment",
            "envs" | "environments" | "env" => "environment",
            "roles" | "role" => "custom_role",
            "webhooks" => "webhook",
            "projects" => "project",
            other => other,
        };
        if resource.resource_type() != wanted {
            return false;
        }
    }

    if let Some(k) = key
        && !resource.id().contains(k)
    {
        return false;
    }

    true
}
