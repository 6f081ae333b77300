//! Copy a whole project, optionally into another account
//!
//! The source is read the way `snapshot` reads it and replayed the way
//! `restore` replays a file, without touching the disk in between.

use anyhow::Result;
use std::rc::Rc;

use super::api_client;
use super::snapshot::{RestoreOptions, RestoreReport, restore_snapshot, take_snapshot};
use crate::Context;
use crate::cli::ProjectCopyArgs;
use crate::config;
use crate::progress;
use crate::resource::SharedClient;
use crate::ui;

pub fn project(ctx: &Context, args: &ProjectCopyArgs) -> Result<()> {
    crate::schema::validate_key("project", &args.dest)?;
    let settings = config::api_settings(ctx.manifest.as_deref())?;
    let source = api_client(ctx)?;

    let dest = if std::env::var_os(&args.dest_token_env).is_some() {
        let dest_settings = crate::schema::ApiSettings {
            token_env: args.dest_token_env.clone(),
            base_url: args.dest_url.clone().or(settings.base_url),
            comment: settings.comment,
        };
        config::client(&dest_settings)?
    } else {
        if args.source == args.dest {
            anyhow::bail!(
                "Copying {} onto itself; set {} to copy into another account",
                args.source,
                args.dest_token_env
            );
        }
        log::info!("{} is not set; copying within the same account", args.dest_token_env);
        Rc::clone(&source)
    };

    if !ctx.quiet {
        ui::header(&format!("Copy project {} → {}", args.source, args.dest));
        if !args.tags.is_empty() {
            ui::kv("Flag tags", &args.tags.join(", "));
        }
    }

    let pb = progress::spinner(&format!("Copying project {}...", args.source));
    let report = match copy_project(&source, &dest, args) {
        Ok(report) => report,
        Err(e) => {
            progress::finish_error(&pb, "Copy failed");
            return Err(e);
        }
    };
    progress::finish_success(&pb, &format!("Project {} created", args.dest));

    if !ctx.quiet {
        report.print();
    }
    Ok(())
}

pub fn copy_project(source: &SharedClient, dest: &SharedClient, args: &ProjectCopyArgs) -> Result<RestoreReport> {
    let mut snapshot = take_snapshot(source, &args.source)?;
    let total = snapshot.feature_flags.len();
    snapshot.retain_tagged(&args.tags);
    log::debug!(
        "copying {} of {} flag(s) from {}",
        snapshot.feature_flags.len(),
        total,
        args.source
    );

    let opts = RestoreOptions {
        name: args.name.clone(),
        environments: !args.no_environments,
    };
    restore_snapshot(dest, &snapshot, &args.dest, &opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_DEST_TOKEN_ENV;
    use crate::resource::tests::mock_client;
    use flagapi::backend::MockBackend;
    use serde_json::json;

    fn source() -> MockBackend {
        let mock = MockBackend::new();
        mock.insert("/projects/web", json!({"key": "web", "name": "Web", "tags": []}));
        mock.insert(
            "/projects/web/environments/production",
            json!({"key": "production", "name": "Production", "color": "ff0000", "defaultTtl": 0}),
        );
        mock.insert(
            "/flags/web/search",
            json!({"key": "search", "tags": ["web"], "variations": [{"value": true}, {"value": false}],
                   "environments": {"production": {"on": true, "offVariation": 1}}}),
        );
        mock.insert(
            "/flags/web/billing",
            json!({"key": "billing", "tags": ["payments"], "variations": [{"value": true}, {"value": false}],
                   "environments": {"production": {"on": false}}}),
        );
        mock.insert(
            "/segments/web/production/beta",
            json!({"key": "beta", "name": "Beta", "included": ["alice"]}),
        );
        mock
    }

    fn args(tags: &[&str], no_environments: bool) -> ProjectCopyArgs {
        ProjectCopyArgs {
            source: "web".into(),
            dest: "web-eu".into(),
            name: None,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            no_environments,
            dest_token_env: DEFAULT_DEST_TOKEN_ENV.into(),
            dest_url: None,
        }
    }

    #[test]
    fn test_copy_into_other_account() {
        let src = source();
        let dest = MockBackend::new();

        let report = copy_project(&mock_client(&src), &mock_client(&dest), &args(&[], false)).unwrap();
        assert_eq!(report.flags, 2);
        assert_eq!(report.segments, 1);
        assert!(src.mutations().is_empty());

        let flag = dest.entity("/flags/web-eu/search").unwrap();
        assert_eq!(flag["environments"]["production"]["on"], true);
        assert_eq!(
            dest.entity("/segments/web-eu/production/beta").unwrap()["included"],
            json!(["alice"])
        );
    }

    #[test]
    fn test_copy_filters_flags_by_tag() {
        let dest = MockBackend::new();
        let report = copy_project(&mock_client(&source()), &mock_client(&dest), &args(&["payments"], false)).unwrap();
        assert_eq!(report.flags, 1);
        assert!(dest.entity("/flags/web-eu/billing").is_some());
        assert!(dest.entity("/flags/web-eu/search").is_none());
    }

    #[test]
    fn test_copy_without_environments() {
        let dest = MockBackend::new();
        let report = copy_project(&mock_client(&source()), &mock_client(&dest), &args(&[], true)).unwrap();
        assert_eq!(report.environments, 0);
        assert_eq!(report.segments, 0);
        assert!(dest.entity("/projects/web-eu/environments/production").is_none());
        assert!(dest.mutations().iter().all(|call| call.starts_with("POST ")));
    }

    #[test]
    fn test_copy_within_same_account() {
        let mock = source();
        let client = mock_client(&mock);
        copy_project(&client, &client, &args(&[], false)).unwrap();
        assert!(mock.entity("/projects/web").is_some());
        assert!(mock.entity("/projects/web-eu").is_some());
    }
}
