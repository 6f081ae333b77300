//! Declarative commands
//!
//! - `plan` - Preview what apply would change
//! - `apply` - Make the remote state match the manifest
//! - `validate` - Check the manifest and its policies offline

use anyhow::Result;
use colored::Colorize;
use declarative::{ApplyContext, ExecuteSummary, ExecutionPlan, PolicyCheck};
use flagapi::{ApiConfig, Client};
use std::path::Path;
use std::rc::Rc;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::config::{self, LoadedManifest};
use crate::engine::{self, RunOptions, differ, planner};
use crate::policy::Conftest;
use crate::progress;
use crate::resource::SharedClient;
use crate::ui;

/// Preview changes for the declared resources
pub fn plan(ctx: &Context, target: Option<&str>, values: bool) -> Result<()> {
    let loaded = config::load_manifest(ctx.manifest.as_deref())?;
    let client = config::client(&loaded.manifest.api)?;
    plan_manifest(ctx, &loaded, &client, target, values || ctx.verbose > 1)
}

fn plan_manifest(
    ctx: &Context,
    loaded: &LoadedManifest,
    client: &SharedClient,
    target: Option<&str>,
    values: bool,
) -> Result<()> {
    let manifest = &loaded.manifest;
    let plan = engine::build_plan(manifest, client, manifest.api.comment.as_deref())
        .filter_by_target(target);
    if plan.is_empty() {
        ui::warn("No resources match");
        return Ok(());
    }

    if !ctx.quiet {
        ui::header("Plan");
        ui::kv("Manifest", &loaded.path.display().to_string());
    }

    let pb = progress::spinner(&format!("Fetching {} resource(s)...", plan.len()));
    let (diffs, errors) = differ::compute_diffs(&plan, &manifest.reconcile);
    if errors.is_empty() {
        progress::finish_success(&pb, "Remote state fetched");
    } else {
        progress::finish_error(&pb, &format!("{} resource(s) could not be fetched", errors.len()));
    }

    differ::display_diff(&diffs, values);

    if !errors.is_empty() {
        println!();
        for (id, err) in &errors {
            ui::error(&format!("{id}: {err:#}"));
        }
        anyhow::bail!("{} resource(s) could not be planned", errors.len());
    }
    Ok(())
}

/// Apply the manifest
pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let loaded = config::load_manifest(ctx.manifest.as_deref())?;
    let client = config::client(&loaded.manifest.api)?;

    if !ctx.quiet {
        ui::header(if args.dry_run { "Apply (dry run)" } else { "Apply" });
        ui::kv("Manifest", &loaded.path.display().to_string());
    }

    let summary = apply_manifest(&loaded, &client, args)?;
    if !summary.is_success() {
        anyhow::bail!("{} resource(s) failed", summary.failed);
    }
    Ok(())
}

fn apply_manifest(
    loaded: &LoadedManifest,
    client: &SharedClient,
    args: &ApplyArgs,
) -> Result<ExecuteSummary> {
    let manifest = &loaded.manifest;
    let comment = args.comment.clone().or_else(|| manifest.api.comment.clone());
    let plan = engine::build_plan(manifest, client, comment.as_deref())
        .filter_by_target(args.target.as_deref());
    if plan.is_empty() {
        ui::warn("No resources match");
        return Ok(ExecuteSummary::default());
    }

    log::debug!("Planned: {}", planner::resource_ids(&plan).join(", "));

    let conftest = Conftest::from_settings(&manifest.policy, manifest_dir(&loaded.path));
    let mut apply_ctx = ApplyContext::new(args.dry_run)
        .with_comment(comment)
        .with_options(manifest.reconcile);
    if let Some(check) = &conftest {
        apply_ctx = apply_ctx.with_policy(check);
    }

    let opts = RunOptions {
        yes: args.yes,
        fail_fast: args.fail_fast,
    };
    engine::run(&plan, &apply_ctx, &opts)
}

/// Validate the manifest and run policies over it
///
/// Nothing is fetched: resources are built over a client that is never
/// called.
pub fn validate(ctx: &Context, target: Option<&str>) -> Result<()> {
    let loaded = config::load_manifest(ctx.manifest.as_deref())?;
    let manifest = &loaded.manifest;
    ui::success(&format!(
        "{} is valid ({} resource(s))",
        loaded.path.display(),
        manifest.resource_count()
    ));

    let Some(conftest) = Conftest::from_settings(&manifest.policy, manifest_dir(&loaded.path))
    else {
        ui::info("Policy checks disabled ([policy] enabled = false)");
        return Ok(());
    };

    match conftest.version() {
        Ok(version) => ui::kv("Policy engine", version.lines().next().unwrap_or_default()),
        Err(e) => log::debug!("conftest --version failed: {e:#}"),
    }

    let offline: SharedClient = Rc::new(Client::new(ApiConfig::new(String::new())));
    let plan = engine::build_plan(manifest, &offline, None).filter_by_target(target);

    let pb = progress::spinner(&format!("Checking {} resource(s)...", plan.len()));
    let failures = check_policies(&plan, &conftest)?;
    pb.finish_and_clear();

    if failures.is_empty() {
        ui::success(&format!("{} resource(s) pass all policies", plan.len()));
        return Ok(());
    }

    for (id, messages) in &failures {
        println!("  {} {}", "✗".red(), id.bold());
        for msg in messages {
            println!("      {}", msg.dimmed());
        }
    }
    anyhow::bail!("{} resource(s) failed policy checks", failures.len())
}

/// Failure messages per resource id; empty when every resource passes
fn check_policies(plan: &ExecutionPlan, check: &dyn PolicyCheck) -> Result<Vec<(String, Vec<String>)>> {
    let mut failures = Vec::new();
    for resource in plan.iter() {
        let outcome = check.check(resource.resource_type(), &resource.policy_input())?;
        if !outcome.passed() {
            log::info!("{} failed {} policy rule(s)", resource.id(), outcome.failures.len());
            failures.push((resource.id(), outcome.failures));
        }
    }
    Ok(failures)
}

fn manifest_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::mock_client;
    use declarative::PolicyOutcome;
    use flagapi::backend::MockBackend;
    use serde_json::{Value, json};
    use std::path::PathBuf;

    const MANIFEST: &str = r#"
[projects.web]
name = "Web"

[projects.web.environments.production]
name = "Production"
color = "ff0000"

[projects.web.flags.search]
tags = ["search"]

[projects.web.flags.checkout]
"#;

    fn loaded(content: &str) -> LoadedManifest {
        LoadedManifest {
            path: PathBuf::from("/srv/flags/flagops.toml"),
            manifest: toml::from_str(content).unwrap(),
        }
    }

    fn apply_args() -> ApplyArgs {
        ApplyArgs {
            target: None,
            dry_run: false,
            yes: true,
            comment: None,
            fail_fast: false,
        }
    }

    /// Rejects flags without tags
    struct TaggedFlags;

    impl PolicyCheck for TaggedFlags {
        fn check(&self, resource_type: &str, input: &Value) -> anyhow::Result<PolicyOutcome> {
            if resource_type == "feature_flag" && input.get("tags").is_none_or(Value::is_null) {
                return Ok(PolicyOutcome {
                    failures: vec!["flags need tags".into()],
                });
            }
            Ok(PolicyOutcome::pass())
        }
    }

    #[test]
    fn test_apply_creates_everything() {
        let mock = MockBackend::new();
        let client = mock_client(&mock);

        let summary = apply_manifest(&loaded(MANIFEST), &client, &apply_args()).unwrap();
        assert!(summary.is_success());
        assert!(mock.entity("/flags/web/search").is_some());
        assert!(mock.entity("/flags/web/checkout").is_some());
        assert_eq!(mock.entity("/projects/web").unwrap()["name"], "Web");
    }

    #[test]
    fn test_apply_target_filter() {
        let mock = MockBackend::new();
        mock.insert("/projects/web", json!({"key": "web", "name": "Web", "tags": []}));
        let client = mock_client(&mock);
        let args = ApplyArgs {
            target: Some("flags.search".into()),
            ..apply_args()
        };

        let summary = apply_manifest(&loaded(MANIFEST), &client, &args).unwrap();
        assert_eq!(summary.created, 1);
        let mutations = mock.mutations();
        assert_eq!(mutations[0], "POST /flags/web");
        assert!(mutations.iter().all(|call| call.contains("/flags/web")));
    }

    #[test]
    fn test_apply_dry_run_mutates_nothing() {
        let mock = MockBackend::new();
        let client = mock_client(&mock);
        let args = ApplyArgs {
            dry_run: true,
            ..apply_args()
        };

        apply_manifest(&loaded(MANIFEST), &client, &args).unwrap();
        assert!(mock.mutations().is_empty());
    }

    #[test]
    fn test_check_policies_reports_failures() {
        let client = mock_client(&MockBackend::new());
        let manifest = loaded(MANIFEST).manifest;
        let plan = engine::build_plan(&manifest, &client, None);

        let failures = check_policies(&plan, &TaggedFlags).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "feature_flag.web.checkout");
        assert_eq!(failures[0].1, vec!["flags need tags"]);
    }

    #[test]
    fn test_manifest_dir() {
        assert_eq!(manifest_dir(Path::new("flagops.toml")), Path::new("."));
        assert_eq!(
            manifest_dir(Path::new("/srv/flags/flagops.toml")),
            Path::new("/srv/flags")
        );
    }
}
