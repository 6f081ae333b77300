//! Execution engine - terminal callbacks around `declarative::execute`

use anyhow::Result;
use colored::Colorize;
use declarative::{
    ApplyContext, ApplyResult, AutoConfirm, ConfirmCallback, ExecuteOptions, ExecuteSummary,
    ExecutionPlan, PlannedAction, ProgressCallback,
};
use indicatif::ProgressBar;

use crate::progress;
use crate::ui;

/// Options for one apply run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Skip the confirmation prompt
    pub yes: bool,
    /// Stop at the first failed resource
    pub fail_fast: bool,
}

/// Progress bar over the resources being applied
///
/// Planned actions are listed as they are computed; failures are printed
/// above the bar so they survive it being cleared.
#[derive(Default)]
pub struct TerminalProgress {
    bar: Option<ProgressBar>,
    failures: Vec<(String, String)>,
}

impl TerminalProgress {
    pub fn failures(&self) -> &[(String, String)] {
        &self.failures
    }

    fn println(&self, line: String) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => println!("{line}"),
        }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_planned(&mut self, id: &str, action: &PlannedAction) {
        if action.is_change() {
            self.println(format!("  {} {} {}", ui::action_symbol(action), id, action.label().dimmed()));
        }
    }

    fn on_batch_start(&mut self, count: usize) {
        self.bar = Some(progress::bar(count as u64, "Applying"));
    }

    fn on_resource_start(&mut self, id: &str, _description: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(id.to_string());
        }
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        if let ApplyResult::Failed { error } = result {
            self.println(format!("  {} {}: {}", ui::result_symbol(result), id, error));
            self.failures.push((id.to_string(), error.clone()));
        }
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn on_batch_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Confirmation through an interactive prompt
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;
        Ok(confirmed)
    }
}

/// Plan, confirm and apply, printing a summary at the end
pub fn run(plan: &ExecutionPlan, ctx: &ApplyContext, opts: &RunOptions) -> Result<ExecuteSummary> {
    let exec_opts = ExecuteOptions {
        fail_fast: opts.fail_fast,
    };
    let mut progress = TerminalProgress::default();

    let summary = if opts.yes {
        declarative::execute(plan, ctx, &exec_opts, &mut progress, &mut AutoConfirm)?
    } else {
        declarative::execute(plan, ctx, &exec_opts, &mut progress, &mut PromptConfirm)?
    };

    print_summary(&summary, ctx.dry_run);
    Ok(summary)
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary, dry_run: bool) {
    println!();
    if dry_run {
        println!("  {} Dry run - no changes made", "ℹ".blue());
    } else if summary.total_changes() == 0 && summary.is_success() && summary.skipped == 0 {
        println!("  {} Everything up to date", "✓".green().bold());
        return;
    } else if summary.is_success() {
        println!("  {} Configuration applied successfully!", "✓".green().bold());
    } else {
        println!("  {} Configuration applied with errors", "⚠".yellow().bold());
    }

    for line in summary_lines(summary) {
        println!("    • {line}");
    }
}

fn summary_lines(summary: &ExecuteSummary) -> Vec<String> {
    [
        (summary.created, "created"),
        (summary.modified, "modified"),
        (summary.removed, "removed"),
        (summary.skipped, "skipped"),
        (summary.failed, "failed"),
    ]
    .into_iter()
    .filter(|(n, _)| *n > 0)
    .map(|(n, what)| format!("{n} resource(s) {what}"))
    .collect()
}
