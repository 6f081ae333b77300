//! Execution planner - turns a manifest into resources in apply order

use declarative::{ExecutionPlan, Resource};

use crate::resource::{
    CustomRole, Environment, FeatureFlag, FlagEnvironment, Project, Segment, SharedClient,
    Webhook,
};
use crate::schema::{Manifest, ProjectDecl};

/// Build the plan for every declared resource
///
/// Per project: the project, its environments, segments, flags and then the
/// flags' per-environment targeting. Roles and webhooks follow. Children of
/// a project or flag declared `absent` are left out; removing the parent
/// removes them.
pub fn build_plan(manifest: &Manifest, client: &SharedClient, comment: Option<&str>) -> ExecutionPlan {
    let mut plan = ExecutionPlan::new();

    for (key, project) in &manifest.projects {
        plan.add(Box::new(Project::new(key, project, client.clone())));
        if project.state.is_absent() {
            log::debug!("project {key} is absent; skipping its children");
            continue;
        }
        add_project_children(&mut plan, key, project, client, comment);
    }

    for (key, role) in &manifest.roles {
        plan.add(Box::new(CustomRole::new(key, role, client.clone())));
    }

    for webhook in &manifest.webhooks {
        plan.add(Box::new(Webhook::new(webhook, client.clone())));
    }

    plan
}

fn add_project_children(
    plan: &mut ExecutionPlan,
    project_key: &str,
    project: &ProjectDecl,
    client: &SharedClient,
    comment: Option<&str>,
) {
    for (env_key, env) in &project.environments {
        plan.add(Box::new(Environment::new(project_key, env_key, env, client.clone())));
    }

    for segment in &project.segments {
        plan.add(Box::new(Segment::new(project_key, segment, client.clone())));
    }

    for (flag_key, flag) in &project.flags {
        plan.add(Box::new(FeatureFlag::new(project_key, flag_key, flag, client.clone())));
    }

    for (flag_key, flag) in &project.flags {
        if flag.state.is_absent() {
            continue;
        }
        for (env_key, targeting) in &flag.environments {
            let resource = FlagEnvironment::new(project_key, flag_key, env_key, targeting, client.clone())
                .with_flag_declared(true)
                .with_comment(comment.map(str::to_string));
            plan.add(Box::new(resource));
        }
    }
}

/// Ids of every planned resource, in order
pub fn resource_ids(plan: &ExecutionPlan) -> Vec<String> {
    plan.iter().map(Resource::id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::mock_client;
    use flagapi::backend::MockBackend;

    const MANIFEST: &str = r#"
[projects.web]
name = "Web"

[projects.web.environments.production]
[projects.web.environments.staging]

[[projects.web.segments]]
key = "beta"
environment = "staging"

[projects.web.flags.search]
[projects.web.flags.search.environments.production]
state = "enabled"

[projects.web.flags.legacy]
state = "absent"
[projects.web.flags.legacy.environments.production]
state = "enabled"

[projects.old]
state = "absent"
[projects.old.environments.production]

[roles.ops]
policy = [{ resources = ["proj/*"], actions = ["*"], effect = "allow" }]

[[webhooks]]
url = "https://hooks.example.com/flags"
"#;

    #[test]
    fn test_plan_order() {
        let manifest: Manifest = toml::from_str(MANIFEST).unwrap();
        let client = mock_client(&MockBackend::new());
        let plan = build_plan(&manifest, &client, None);

        assert_eq!(
            resource_ids(&plan),
            vec![
                "project.old",
                "project.web",
                "environment.web.production",
                "environment.web.staging",
                "segment.web.staging.beta",
                "feature_flag.web.legacy",
                "feature_flag.web.search",
                "flag_environment.web.search.production",
                "custom_role.ops",
                "webhook.https://hooks.example.com/flags",
            ]
        );
    }

    #[test]
    fn test_target_filter() {
        let manifest: Manifest = toml::from_str(MANIFEST).unwrap();
        let client = mock_client(&MockBackend::new());
        let plan = build_plan(&manifest, &client, None).filter_by_target(Some("feature_flag"));
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|r| r.resource_type() == "feature_flag"));
    }
}
