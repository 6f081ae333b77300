//! Execution engine - plans every resource, confirms, then reconciles in order

use crate::context::{ApplyContext, ConfirmCallback, ProgressCallback};
use crate::controller::{self, PlannedAction};
use crate::planner::ExecutionPlan;
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary};
use anyhow::Result;

/// Execute a plan with the given context and callbacks
///
/// # Arguments
/// * `plan` - Resources in apply order
/// * `ctx` - Dry-run flag, comment, policy and guard hooks
/// * `opts` - Execution options
/// * `progress` - Progress callback, also told about each planned action
/// * `confirm` - Confirmation callback, skipped on a dry run
///
/// # Returns
/// Summary of execution results
pub fn execute<P, C>(
    plan: &ExecutionPlan,
    ctx: &ApplyContext,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteSummary>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let mut summary = ExecuteSummary::default();

    // Plan everything first so the operator sees the whole picture
    let mut pending = Vec::new();
    for resource in plan.iter() {
        let id = resource.id();
        match controller::plan(resource, &ctx.options) {
            Ok(PlannedAction::NoChange) => {
                progress.on_planned(&id, &PlannedAction::NoChange);
                summary.add_result(&ApplyResult::NoChange);
            }
            Ok(action) => {
                progress.on_planned(&id, &action);
                pending.push(resource);
            }
            Err(e) => {
                log::error!("planning {id} failed: {e:#}");
                progress.on_resource_complete(&id, &failed(&e));
                summary.add_result(&failed(&e));
                if opts.fail_fast {
                    return Ok(summary);
                }
            }
        }
    }

    if pending.is_empty() {
        return Ok(summary);
    }

    if !ctx.dry_run && !confirm.confirm(&format!("Apply {} change(s)?", pending.len()))? {
        summary.skipped += pending.len();
        return Ok(summary);
    }

    progress.on_batch_start(pending.len());
    let total = pending.len();
    for (done, resource) in pending.into_iter().enumerate() {
        let id = resource.id();
        progress.on_resource_start(&id, &resource.description());
        let result = match controller::reconcile(resource, ctx) {
            Ok(outcome) => outcome.result,
            Err(e) => {
                log::error!("{id}: {e:#}");
                failed(&e)
            }
        };
        progress.on_resource_complete(&id, &result);
        summary.add_result(&result);

        if opts.fail_fast && !result.is_success() {
            summary.skipped += total - done - 1;
            break;
        }
    }
    progress.on_batch_complete();

    Ok(summary)
}

fn failed(e: &anyhow::Error) -> ApplyResult {
    ApplyResult::Failed {
        error: format!("{e:#}"),
    }
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple(plan: &ExecutionPlan, ctx: &ApplyContext) -> Result<ExecuteSummary> {
    use crate::context::{AutoConfirm, NoProgress};

    execute(plan, ctx, &ExecuteOptions::default(), &mut NoProgress, &mut AutoConfirm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoDecline, NoProgress};
    use crate::controller::tests::MemoryResource;
    use crate::normalize::{ItemState, TargetSpec};
    use serde_json::json;

    fn plan_of(resources: Vec<MemoryResource>) -> ExecutionPlan {
        let mut plan = ExecutionPlan::new();
        for r in resources {
            plan.add(Box::new(r));
        }
        plan
    }

    fn named(key: &str, name: &str, remote: Option<serde_json::Value>) -> MemoryResource {
        let mut r = MemoryResource::new(key, remote);
        r.name = Some(name.into());
        r
    }

    fn broken(key: &str) -> MemoryResource {
        let mut r = MemoryResource::new(key, Some(json!({"targets": []})));
        r.targets = vec![TargetSpec {
            variation: 0,
            values: vec!["ghost".into()],
            state: ItemState::Remove,
        }];
        r
    }

    #[derive(Default)]
    struct Recorder {
        planned: Vec<(String, &'static str)>,
        completed: Vec<String>,
    }

    impl ProgressCallback for Recorder {
        fn on_planned(&mut self, id: &str, action: &PlannedAction) {
            self.planned.push((id.to_string(), action.label()));
        }
        fn on_batch_start(&mut self, _count: usize) {}
        fn on_resource_start(&mut self, _id: &str, _description: &str) {}
        fn on_resource_complete(&mut self, id: &str, _result: &ApplyResult) {
            self.completed.push(id.to_string());
        }
        fn on_batch_complete(&mut self) {}
    }

    #[test]
    fn test_execute_empty_plan() {
        let summary = execute_simple(&ExecutionPlan::new(), &ApplyContext::new(false)).unwrap();
        assert_eq!(summary.total(), 0);
    }

    #[test]
    fn test_execute_mixed() {
        let plan = plan_of(vec![
            named("same", "x", Some(json!({"name": "x"}))),
            named("new", "y", None),
            named("edit", "z", Some(json!({"name": "old"}))),
        ]);
        let mut recorder = Recorder::default();
        let summary = execute(
            &plan,
            &ApplyContext::new(false),
            &ExecuteOptions::default(),
            &mut recorder,
            &mut crate::context::AutoConfirm,
        )
        .unwrap();

        assert_eq!(summary.no_change, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.modified, 1);
        assert_eq!(
            recorder.planned,
            vec![
                ("memory.same".to_string(), "unchanged"),
                ("memory.new".to_string(), "create"),
                ("memory.edit".to_string(), "update"),
            ]
        );
        assert_eq!(recorder.completed, vec!["memory.new", "memory.edit"]);
    }

    #[test]
    fn test_execute_declined() {
        let plan = plan_of(vec![named("new", "y", None)]);
        let summary = execute(
            &plan,
            &ApplyContext::new(false),
            &ExecuteOptions::default(),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.created, 0);
    }

    #[test]
    fn test_execute_dry_run_skips_confirmation() {
        let plan = plan_of(vec![named("new", "y", None)]);
        let summary = execute(
            &plan,
            &ApplyContext::new(true),
            &ExecuteOptions::default(),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();
        assert_eq!(summary.skipped, 1);
        assert!(summary.is_success());
    }

    #[test]
    fn test_execute_fail_fast_stops_planning() {
        let plan = plan_of(vec![broken("bad"), named("new", "y", None)]);
        let opts = ExecuteOptions { fail_fast: true };
        let summary = execute(
            &plan,
            &ApplyContext::new(false),
            &opts,
            &mut NoProgress,
            &mut crate::context::AutoConfirm,
        )
        .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 1);
    }

    #[test]
    fn test_execute_failure_does_not_stop_others() {
        let plan = plan_of(vec![broken("bad"), named("new", "y", None)]);
        let summary = execute_simple(&plan, &ApplyContext::new(false)).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.created, 1);
    }
}
